// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Overlay configuration.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Which image filename extensions the overlay recognizes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IsoExtensions: u32 {
        const LOWER = 0x01;
        const UPPER = 0x02;
    }
}

/// Options for [`crate::Overlay`].
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// The host directory the overlay shadows. Must exist and be a directory.
    pub source_dir: PathBuf,
    /// Which `.iso` extensions are recognized as candidate images.
    pub iso_extensions: IsoExtensions,
    /// Worker threads for DST decoding: `0` selects the default (4), a positive value the
    /// exact count, and a negative value disables multi-threaded decoding entirely.
    pub thread_pool_size: i32,
    /// Soft cap on simultaneously registered images; `0` means unlimited.
    pub max_open_isos: u32,
    /// Idle seconds after which an unused image is unmounted; non-positive disables cleanup.
    pub cache_timeout_seconds: i64,
    /// Show the stereo area of each disc.
    pub stereo_visible: bool,
    /// Show the multichannel area of each disc.
    pub multichannel_visible: bool,
}

impl Default for OverlayConfig {
    fn default() -> OverlayConfig {
        OverlayConfig {
            source_dir: PathBuf::new(),
            iso_extensions: IsoExtensions::LOWER | IsoExtensions::UPPER,
            thread_pool_size: 0,
            max_open_isos: 64,
            cache_timeout_seconds: 300,
            stereo_visible: true,
            multichannel_visible: true,
        }
    }
}

impl OverlayConfig {
    /// A configuration with defaults for everything but the source directory.
    pub fn new(source_dir: impl Into<PathBuf>) -> OverlayConfig {
        OverlayConfig { source_dir: source_dir.into(), ..OverlayConfig::default() }
    }
}
