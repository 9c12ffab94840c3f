// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project Cadenza
//!
//! Cadenza is a pure Rust toolkit for reading, transforming, and re-serializing DSD audio
//! stored on SACD disc images.
//!
//! An SACD image holds DSD audio in 4704-byte-per-channel frames, optionally losslessly
//! compressed as DST, plus hierarchical metadata. Cadenza presents such an image as a tree of
//! ordinary Sony DSF files, synthesized on the fly:
//!
//! ```text
//! /<image base name>/<Album>/Stereo/01. First Movement.dsf
//!                           /Multi-channel/01. First Movement.dsf
//! ```
//!
//! # Layers
//!
//! * [`overlay`] — an overlay filesystem that shadows a host directory, hides `.iso` image
//!   files, and expands every valid SACD into a virtual folder while passing everything else
//!   through. Intended as the backend of a FUSE/WinFsp front-end.
//! * [`vfs`] — the per-image virtual filesystem: synthesized DSF headers, block-interleaved
//!   audio with DST decoding (single-threaded or ahead-of-time on a worker pool), seekable at
//!   arbitrary byte offsets, and an editable ID3 tail persisted to an XML sidecar.
//! * [`format_dsf`] — DSF layout arithmetic, header synthesis, and the DSD-to-DSF block
//!   transform.
//! * [`core`] — shared primitives: the error type, reference-counted buffers and buffer
//!   pools, the thread pool with serially-ordered process queues, and the interface traits
//!   for the external SACD reader and DST codec.
//!
//! # External components
//!
//! Cadenza deliberately does not ship a low-level SACD reader or a DST codec. Supply them by
//! implementing [`core::sacd::SacdOpener`] / [`core::sacd::SacdReader`] and
//! [`core::dst::DstDecoderFactory`] / [`core::dst::DstDecoder`]. A deterministic simulated
//! source ([`vfs::sim`]) is included for tests and experimentation.

pub use cadenza_core as core;
pub use cadenza_format_dsf as format_dsf;
pub use cadenza_overlay as overlay;
pub use cadenza_vfs as vfs;
