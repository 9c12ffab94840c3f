// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The overlay filesystem for Project Cadenza.
//!
//! An [`Overlay`] shadows a host directory: ordinary files and directories pass through
//! unchanged, while every valid SACD image is hidden and replaced by a virtual folder of the
//! same base name whose contents are synthesized DSF files (see `cadenza-vfs`). Images mount
//! lazily on first use and unmount again after an idle timeout; tag edits flow back into the
//! per-image XML sidecars.

mod config;
mod context;
mod file;
mod mount;
mod paths;

pub use config::{IsoExtensions, OverlayConfig};
pub use context::{Overlay, OverlayEntry, OverlayEntryType, OverlaySource};
pub use file::OverlayFile;
