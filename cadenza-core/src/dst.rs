// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dst` module defines the interface to the DST codec.
//!
//! DST (Direct Stream Transfer) is the lossless compression scheme used for SACD audio. The
//! codec itself is an external component; Cadenza consumes it frame-in/frame-out through
//! [`DstDecoder`]. Decoder instances are not thread-safe, so the multi-threaded pipeline
//! creates one per decode job through a shared [`DstDecoderFactory`].

use crate::errors::Result;

/// A DST frame decoder. One compressed frame in, one raw DSD frame out.
///
/// Decoders may move between threads but must never be shared; callers keep one instance per
/// thread or per job.
pub trait DstDecoder: Send {
    /// Decode one compressed frame into `out`, returning the decoded size in bytes
    /// (`4704 × channels` for a whole frame). `out` must hold at least that many bytes.
    fn decode(&mut self, compressed: &[u8], out: &mut [u8]) -> Result<usize>;
}

/// Factory for [`DstDecoder`] instances, shared across worker threads.
pub trait DstDecoderFactory: Send + Sync {
    /// Create a decoder for frames of the given channel count and sample rate.
    fn create(&self, channels: u16, sample_rate: u32) -> Result<Box<dyn DstDecoder>>;
}
