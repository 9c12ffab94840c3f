// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DSF (DSD Stream File) synthesis for Project Cadenza.
//!
//! This crate produces the pieces of a DSF file without ever materializing one: the layout
//! arithmetic that sizes a synthetic file, the 92-byte prologue (DSD, fmt, and data chunk
//! headers), and the transform that turns byte-interleaved SACD frames into the block-per-
//! channel layout DSF requires.

pub mod header;
pub mod transform;

pub use header::{render_header, DsfLayout};
pub use transform::BlockTransformer;

/// Size of the DSD chunk.
pub const DSD_CHUNK_SIZE: u64 = 28;

/// Size of the fmt chunk.
pub const FMT_CHUNK_SIZE: u64 = 52;

/// Size of the data chunk header (chunk ID + chunk size).
pub const DATA_CHUNK_HEADER_SIZE: u64 = 12;

/// Size of the complete DSF prologue; audio data starts at this offset.
pub const HEADER_SIZE: usize = (DSD_CHUNK_SIZE + FMT_CHUNK_SIZE + DATA_CHUNK_HEADER_SIZE) as usize;

/// Size of one DSF block per channel.
pub const BLOCK_SIZE: usize = 4096;

/// Number of source frames after which frame and block boundaries re-align.
///
/// `gcd(4704, 4096) = 32`, so a frame boundary coincides with a block boundary only every
/// `4096 / 32 = 128` frames.
pub const FRAME_BLOCK_ALIGN: u32 = 128;
