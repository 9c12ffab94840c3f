// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DSF layout arithmetic and header synthesis.
//!
//! Based on the DSF specification v1.01. All multi-byte fields are little-endian.

use cadenza_core::sacd::FRAME_SIZE_64;

use crate::{
    BLOCK_SIZE, DATA_CHUNK_HEADER_SIZE, DSD_CHUNK_SIZE, FMT_CHUNK_SIZE, FRAME_BLOCK_ALIGN,
    HEADER_SIZE,
};

/// DSF magic number "DSD ".
const DSF_MAGIC: [u8; 4] = *b"DSD ";

/// Format chunk ID "fmt ".
const DSF_FMT_MAGIC: [u8; 4] = *b"fmt ";

/// Data chunk ID "data".
const DSF_DATA_MAGIC: [u8; 4] = *b"data";

/// The layout of one synthetic DSF file.
///
/// Derived quantities (audio size, metadata offset, total size) follow from the channel count
/// and the number of source frames alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsfLayout {
    /// Number of audio channels (1 to 6).
    pub channels: u16,
    /// DSD sample rate in Hz.
    pub sample_rate: u32,
    /// Number of source frames.
    pub frame_count: u32,
    /// Size of the trailing ID3v2 tag in bytes; may be zero.
    pub metadata_size: u64,
}

impl DsfLayout {
    /// Size of the audio region: the per-channel data padded up to a whole number of blocks,
    /// times the channel count.
    pub fn audio_data_size(&self) -> u64 {
        let bytes_per_channel = u64::from(self.frame_count) * FRAME_SIZE_64 as u64;
        let blocks = (bytes_per_channel + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64;
        blocks * BLOCK_SIZE as u64 * u64::from(self.channels)
    }

    /// Offset of the metadata region. Populated in the header even when the tag is empty, so a
    /// later tag write has a known destination.
    pub fn metadata_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.audio_data_size()
    }

    /// Total size of the synthetic file.
    pub fn total_size(&self) -> u64 {
        self.metadata_offset() + self.metadata_size
    }

    /// One-bit samples per channel.
    pub fn sample_count(&self) -> u64 {
        u64::from(self.frame_count) * FRAME_SIZE_64 as u64 * 8
    }

    /// Size of one block group: one block for every channel.
    pub fn block_group_size(&self) -> u64 {
        BLOCK_SIZE as u64 * u64::from(self.channels)
    }

    /// Audio-region bytes produced by one alignment group of [`FRAME_BLOCK_ALIGN`] frames.
    ///
    /// At every alignment-group boundary the transformer's accumulation buffers are empty, so
    /// seeks may restart decoding there.
    pub fn output_per_alignment_group(&self) -> u64 {
        u64::from(FRAME_BLOCK_ALIGN) * FRAME_SIZE_64 as u64 / BLOCK_SIZE as u64
            * self.block_group_size()
    }

    /// The fmt chunk channel-type code for this channel count.
    fn channel_type(&self) -> u32 {
        match self.channels {
            1 => 1,
            2 => 2,
            3 => 3,
            4 => 4,
            5 => 6,
            6 => 7,
            _ => 2,
        }
    }
}

/// Render the 92-byte DSF prologue: DSD chunk, fmt chunk, and data chunk header.
pub fn render_header(layout: &DsfLayout) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    let mut pos = 0;

    let mut put = |bytes: &[u8]| {
        header[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos += bytes.len();
    };

    // DSD chunk (28 bytes).
    put(&DSF_MAGIC);
    put(&DSD_CHUNK_SIZE.to_le_bytes());
    put(&layout.total_size().to_le_bytes());
    put(&layout.metadata_offset().to_le_bytes());

    // fmt chunk (52 bytes).
    put(&DSF_FMT_MAGIC);
    put(&FMT_CHUNK_SIZE.to_le_bytes());
    // Format version 1, format ID 0 (DSD raw).
    put(&1u32.to_le_bytes());
    put(&0u32.to_le_bytes());
    put(&layout.channel_type().to_le_bytes());
    put(&u32::from(layout.channels).to_le_bytes());
    put(&layout.sample_rate.to_le_bytes());
    // Bits per sample: 1 for DSD.
    put(&1u32.to_le_bytes());
    put(&layout.sample_count().to_le_bytes());
    put(&(BLOCK_SIZE as u32).to_le_bytes());
    // Reserved.
    put(&0u32.to_le_bytes());

    // data chunk header (12 bytes).
    put(&DSF_DATA_MAGIC);
    put(&(DATA_CHUNK_HEADER_SIZE + layout.audio_data_size()).to_le_bytes());

    debug_assert_eq!(pos, HEADER_SIZE);
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u64_at(bytes: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn verify_one_second_stereo_layout() {
        // One second of stereo: 75 frames, no tag.
        let layout =
            DsfLayout { channels: 2, sample_rate: 2_822_400, frame_count: 75, metadata_size: 0 };

        assert_eq!(layout.audio_data_size(), 87 * 4096 * 2);
        assert_eq!(layout.audio_data_size(), 712_704);
        assert_eq!(layout.metadata_offset(), 712_796);
        assert_eq!(layout.total_size(), 712_796);
    }

    #[test]
    fn verify_two_second_multichannel_layout() {
        // Two seconds of 5.1: 150 frames, no tag.
        let layout =
            DsfLayout { channels: 6, sample_rate: 2_822_400, frame_count: 150, metadata_size: 0 };

        assert_eq!(layout.audio_data_size(), 173 * 4096 * 6);
        assert_eq!(layout.audio_data_size(), 4_251_648);
        assert_eq!(layout.metadata_offset(), 4_251_740);
        assert_eq!(layout.total_size(), 4_251_740);
    }

    #[test]
    fn verify_metadata_extends_total_size() {
        let layout =
            DsfLayout { channels: 2, sample_rate: 2_822_400, frame_count: 75, metadata_size: 128 };

        assert_eq!(layout.metadata_offset(), 712_796);
        assert_eq!(layout.total_size(), 712_924);
    }

    #[test]
    fn verify_header_bytes() {
        let layout =
            DsfLayout { channels: 2, sample_rate: 2_822_400, frame_count: 75, metadata_size: 0 };
        let header = render_header(&layout);

        assert_eq!(&header[0..4], b"DSD ");
        assert_eq!(u64_at(&header, 4), 28);
        assert_eq!(u64_at(&header, 12), 712_796);
        assert_eq!(u64_at(&header, 20), 712_796);

        assert_eq!(&header[28..32], b"fmt ");
        assert_eq!(u64_at(&header, 32), 52);
        assert_eq!(u32_at(&header, 40), 1);
        assert_eq!(u32_at(&header, 44), 0);
        assert_eq!(u32_at(&header, 48), 2);
        assert_eq!(u32_at(&header, 52), 2);
        assert_eq!(u32_at(&header, 56), 2_822_400);
        assert_eq!(u32_at(&header, 60), 1);
        assert_eq!(u64_at(&header, 64), 75 * 4704 * 8);
        assert_eq!(u32_at(&header, 72), 4096);
        assert_eq!(u32_at(&header, 76), 0);

        assert_eq!(&header[80..84], b"data");
        assert_eq!(u64_at(&header, 84), 12 + 712_704);
    }

    #[test]
    fn verify_channel_type_mapping() {
        for (channels, expected) in [(1u16, 1u32), (2, 2), (3, 3), (4, 4), (5, 6), (6, 7)] {
            let layout =
                DsfLayout { channels, sample_rate: 2_822_400, frame_count: 1, metadata_size: 0 };
            let header = render_header(&layout);
            assert_eq!(u32_at(&header, 48), expected);
        }
    }

    #[test]
    fn verify_alignment_group_output() {
        let layout =
            DsfLayout { channels: 2, sample_rate: 2_822_400, frame_count: 1000, metadata_size: 0 };

        // 128 frames * 4704 bytes = 147 blocks exactly.
        assert_eq!(layout.output_per_alignment_group(), 147 * 4096 * 2);
    }
}
