// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SACD virtual filesystem for Project Cadenza.
//!
//! An SACD disc image holds DSD audio in 4704-byte-per-channel frames, optionally compressed
//! as DST, plus hierarchical metadata. [`SacdVfs`] presents one such image as a small tree of
//! DSF files:
//!
//! ```text
//! /<Album>/Stereo/NN. <Title>.dsf
//!         /Multi-channel/NN. <Title>.dsf
//! ```
//!
//! The DSF files are synthesized on the fly — header, block-interleaved audio (decoding DST
//! frames where required, optionally ahead-of-time on a worker pool), and a trailing editable
//! ID3v2 tag that persists to an XML sidecar next to the image.

mod context;
mod file;
mod id3;
mod pipeline;
mod sidecar;

pub mod sim;

pub use context::{SacdVfs, VfsEntry, VfsEntryType};
pub use file::{VfsFile, VfsFileInfo};
pub use id3::TagRenderer;
