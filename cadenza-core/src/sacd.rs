// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sacd` module defines the interface to the low-level SACD reader.
//!
//! The reader itself is an external component. Cadenza consumes it through the [`SacdReader`]
//! trait: open a disc image, select an area, enumerate tracks, and read raw frames one at a
//! time. A reader instance is single-threaded; every open virtual file owns its own instance so
//! concurrent reads of different files never contend at the reader level.

use std::path::Path;

use crate::errors::Result;

/// Bytes per channel in one raw DSD frame (588 × 64 one-bit samples).
pub const FRAME_SIZE_64: usize = 4704;

/// SACD frame rate in frames per second.
pub const FRAMES_PER_SEC: u32 = 75;

/// One-bit samples per channel in one frame.
pub const SAMPLES_PER_FRAME: usize = 588 * 64;

/// Maximum number of channels in an area.
pub const MAX_CHANNELS: usize = 6;

/// Upper bound on the size of one frame, raw or DST-compressed.
pub const MAX_FRAME_SIZE: usize = FRAME_SIZE_64 * MAX_CHANNELS;

/// The DSD sampling frequency of an SACD (64 × 44100 Hz).
pub const SAMPLING_FREQUENCY: u32 = 2_822_400;

/// An SACD disc has up to two areas, each with its own track table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    /// The two-channel area.
    Stereo,
    /// The multichannel area (up to six channels).
    Multichannel,
}

impl Area {
    /// Index of the area in two-element per-area tables.
    pub fn index(&self) -> usize {
        match self {
            Area::Stereo => 0,
            Area::Multichannel => 1,
        }
    }

    /// The other area of the disc.
    pub fn other(&self) -> Area {
        match self {
            Area::Stereo => Area::Multichannel,
            Area::Multichannel => Area::Stereo,
        }
    }
}

/// How the audio frames of an area are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Raw (uncompressed) DSD frames.
    Dsd,
    /// DST-compressed frames.
    Dst,
}

/// Interface to one open disc image.
///
/// Area-scoped queries (`track_count`, `channel_count`, ...) refer to the most recently
/// selected area.
pub trait SacdReader: Send {
    /// Get the album title, if the disc provides one.
    fn album_title(&self) -> Option<String>;

    /// Get the disc title, if the disc provides one.
    fn disc_title(&self) -> Option<String>;

    /// Get the areas present on the disc.
    fn available_areas(&self) -> Vec<Area>;

    /// Select the area subsequent queries and reads refer to.
    fn select_area(&mut self, area: Area) -> Result<()>;

    /// Get the number of tracks in the selected area.
    fn track_count(&self) -> u8;

    /// Get the channel count of the selected area.
    fn channel_count(&self) -> u16;

    /// Get the sample rate of the selected area.
    fn sample_rate(&self) -> u32;

    /// Get the frame storage format of the selected area.
    fn frame_format(&self) -> FrameFormat;

    /// Get the title of a track (1-based) in the selected area.
    fn track_title(&self, track: u8) -> Option<String>;

    /// Get the absolute frame number at which a track (1-based) starts.
    fn track_index_start(&self, track: u8) -> Result<u32>;

    /// Get the length of a track (1-based) in frames.
    fn track_frame_length(&self, track: u8) -> Result<u32>;

    /// Read one raw frame into `buf`, returning its size in bytes: `4704 × channels` for DSD,
    /// or the compressed size for DST. `buf` must hold at least [`MAX_FRAME_SIZE`] bytes.
    fn read_frame(&mut self, frame_no: u32, buf: &mut [u8]) -> Result<usize>;
}

/// Factory for [`SacdReader`] instances.
///
/// `probe` is used by the overlay to decide whether a host file is a valid SACD image without
/// keeping a reader around.
pub trait SacdOpener: Send + Sync {
    /// Check whether `path` is a valid SACD image.
    fn probe(&self, path: &Path) -> bool;

    /// Open a disc image, yielding a fresh reader.
    fn open(&self, path: &Path) -> Result<Box<dyn SacdReader>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_frame_constants() {
        assert_eq!(FRAME_SIZE_64, SAMPLES_PER_FRAME / 8);
        assert_eq!(MAX_FRAME_SIZE, 28224);
        assert_eq!(SAMPLING_FREQUENCY, 44100 * 64);
    }

    #[test]
    fn verify_area_indexing() {
        assert_eq!(Area::Stereo.index(), 0);
        assert_eq!(Area::Multichannel.index(), 1);
        assert_eq!(Area::Stereo.other(), Area::Multichannel);
        assert_eq!(Area::Multichannel.other(), Area::Stereo);
    }
}
