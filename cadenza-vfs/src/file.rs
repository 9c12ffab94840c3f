// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The virtual DSF file engine.
//!
//! A [`VfsFile`] is a read/seek cursor over one synthesized DSF file. The file has three
//! regions: the 92-byte header (pre-rendered at open), the audio region (produced frame by
//! frame through the block transform, decoding DST where required), and the metadata region
//! (the track's ID3 tag, served from the context's overlay cache).
//!
//! Seeking into the audio region exploits the 128-frame alignment groups: decoding restarts at
//! the nearest group boundary at or before the target, and the prefix up to the target is
//! discarded as it is produced.

use std::io::SeekFrom;
use std::sync::Arc;

use log::debug;

use cadenza_core::dst::DstDecoder;
use cadenza_core::errors::{
    dst_decode_error, end_of_file_error, read_error, seek_error, Error, Result,
};
use cadenza_core::sacd::{Area, FrameFormat, SacdReader, FRAME_SIZE_64, MAX_FRAME_SIZE};
use cadenza_core::tpool::ThreadPool;
use cadenza_format_dsf::{
    render_header, BlockTransformer, DsfLayout, BLOCK_SIZE, FRAME_BLOCK_ALIGN, HEADER_SIZE,
};

use crate::context::SacdVfs;
use crate::pipeline::MtPipeline;

/// Size and format information for one virtual file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VfsFileInfo {
    pub header_size: u64,
    pub audio_data_size: u64,
    pub metadata_size: u64,
    pub metadata_offset: u64,
    pub total_size: u64,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub frame_format: FrameFormat,
    pub sample_count: u64,
    pub duration_seconds: f64,
}

/// An open virtual DSF file.
pub struct VfsFile {
    ctx: SacdVfs,
    area: Area,
    track: u8,

    position: u64,
    layout: DsfLayout,
    info: VfsFileInfo,
    header: [u8; HEADER_SIZE],

    start_frame: u32,
    end_frame: u32,
    current_frame: u32,

    transformer: BlockTransformer,
    /// Bytes of freshly produced transform output to discard after a mid-audio seek.
    seek_skip_bytes: u64,

    /// The per-file SACD reader. `None` while the MT pipeline owns it.
    reader: Option<Box<dyn SacdReader>>,
    /// Single-threaded DST decoder, when the area is DST-compressed and no pipeline runs.
    decoder: Option<Box<dyn DstDecoder>>,
    frame_buf: Vec<u8>,
    decode_buf: Vec<u8>,

    pipeline: Option<MtPipeline>,
}

impl VfsFile {
    pub(crate) fn open(
        ctx: &SacdVfs,
        path: &str,
        pool: Option<&Arc<ThreadPool>>,
    ) -> Result<VfsFile> {
        let (area, track) = ctx.parse_track_path(path)?;
        let frame_format = ctx.area_info(area)?.frame_format;
        let (layout, start_frame, end_frame) = ctx.track_layout(area, track)?;

        // Every open file owns its own reader; the underlying reader is not safe to share
        // between concurrently read files.
        let mut reader = ctx.inner.opener.open(&ctx.inner.iso_path)?;
        reader.select_area(area)?;

        let info = VfsFileInfo {
            header_size: HEADER_SIZE as u64,
            audio_data_size: layout.audio_data_size(),
            metadata_size: layout.metadata_size,
            metadata_offset: layout.metadata_offset(),
            total_size: layout.total_size(),
            channel_count: layout.channels,
            sample_rate: layout.sample_rate,
            frame_format,
            sample_count: layout.sample_count(),
            duration_seconds: SacdVfs::frames_to_seconds(layout.frame_count),
        };

        let mut file = VfsFile {
            ctx: ctx.clone(),
            area,
            track,
            position: 0,
            layout,
            info,
            header: render_header(&layout),
            start_frame,
            end_frame,
            current_frame: start_frame,
            transformer: BlockTransformer::new(usize::from(layout.channels)),
            seek_skip_bytes: 0,
            reader: Some(reader),
            decoder: None,
            frame_buf: vec![0; MAX_FRAME_SIZE],
            decode_buf: Vec::new(),
            pipeline: None,
        };

        if frame_format == FrameFormat::Dst {
            let Some(factory) = &ctx.inner.dst_factory else {
                return dst_decode_error("no dst decoder available");
            };

            match pool {
                Some(pool) => {
                    // The reader moves into the dedicated reader thread.
                    let Some(reader) = file.reader.take() else {
                        return read_error("reader detached");
                    };
                    file.pipeline = Some(MtPipeline::start(
                        pool,
                        Arc::clone(factory),
                        reader,
                        layout.channels,
                        layout.sample_rate,
                        start_frame,
                        end_frame,
                    )?);
                }
                None => {
                    file.decoder = Some(factory.create(layout.channels, layout.sample_rate)?);
                    file.decode_buf = vec![0; FRAME_SIZE_64 * usize::from(layout.channels)];
                }
            }
        }

        Ok(file)
    }

    /// Get the file's size and format information.
    pub fn info(&self) -> &VfsFileInfo {
        &self.info
    }

    /// Get the area this file belongs to.
    pub fn area(&self) -> Area {
        self.area
    }

    /// Get the track number (1-based) this file presents.
    pub fn track(&self) -> u8 {
        self.track
    }

    /// Get the current read position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Read from the current position. Returns the number of bytes read, which is less than
    /// `buf.len()` only at end-of-file or when an error interrupted a partially completed
    /// read (the error itself resurfaces on the next call).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.info.total_size {
            return end_of_file_error();
        }

        let mut total = 0;

        while total < buf.len() && self.position < self.info.total_size {
            let chunk = if self.position < self.info.header_size {
                self.read_header_region(&mut buf[total..])
            }
            else if self.position < self.info.metadata_offset {
                self.read_audio_region(&mut buf[total..])
            }
            else {
                self.read_metadata_region(&mut buf[total..])
            };

            match chunk {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(Error::EndOfFile) => break,
                Err(err) => {
                    if total > 0 {
                        break;
                    }
                    return Err(err);
                }
            }
        }

        Ok(total)
    }

    /// Reposition the read cursor.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset)
                .map_err(|_| Error::SeekError("seek offset out of range"))?,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => self.info.total_size as i64 + delta,
        };

        if target < 0 {
            return seek_error("seek before start of file");
        }
        let target = target as u64;

        // Fast path: position unchanged. Filesystem front-ends seek before every read, even
        // for sequential access; without this every read would drain the MT prefetch queue.
        if target == self.position {
            return Ok(target);
        }

        self.position = target;
        self.transformer.reset();
        self.seek_skip_bytes = 0;

        if target < self.info.header_size {
            self.current_frame = self.start_frame;
        }
        else if target < self.info.metadata_offset {
            // Decoding restarts at the nearest 128-frame alignment group boundary; the
            // accumulation buffers are guaranteed empty there. At most one group's output
            // (minus one byte) is produced and discarded before the target.
            let audio_offset = target - self.info.header_size;
            let per_group = self.layout.output_per_alignment_group();

            let group = audio_offset / per_group;
            let mut frame = group * u64::from(FRAME_BLOCK_ALIGN);
            let mut aligned_output = group * per_group;

            let frame_count = u64::from(self.end_frame - self.start_frame);
            if frame > frame_count {
                frame = frame_count;
                aligned_output = frame_count * FRAME_SIZE_64 as u64 / BLOCK_SIZE as u64
                    * self.layout.block_group_size();
            }

            self.current_frame = self.start_frame + frame as u32;
            self.seek_skip_bytes = audio_offset - aligned_output;
        }
        else {
            self.current_frame = self.end_frame;
        }

        // The reader thread drains all outstanding work before repositioning; no pre-seek
        // frame survives the handshake.
        if let Some(pipeline) = &self.pipeline {
            pipeline.seek(self.current_frame);
        }

        Ok(target)
    }

    fn read_header_region(&mut self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.position as usize;
        let remaining = &self.header[offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n as u64;
        Ok(n)
    }

    fn read_audio_region(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pipeline.is_some() {
            return self.read_audio_region_mt(buf);
        }

        let mut total = 0;

        while total < buf.len() && self.position < self.info.metadata_offset {
            // Drain any transform output first.
            if self.transformer.pending() > 0 {
                let n = self.transformer.read(&mut buf[total..]);
                self.position += n as u64;
                total += n;
                continue;
            }

            if self.current_frame < self.end_frame {
                let Some(reader) = self.reader.as_mut() else {
                    return read_error("reader detached");
                };

                let size = match reader.read_frame(self.current_frame, &mut self.frame_buf) {
                    Ok(size) => size,
                    Err(err) => {
                        if total > 0 {
                            break;
                        }
                        return Err(err);
                    }
                };
                self.current_frame += 1;

                let pushed = if let Some(decoder) = self.decoder.as_mut() {
                    match decoder.decode(&self.frame_buf[..size], &mut self.decode_buf) {
                        Ok(len) => self.transformer.push_frame(&self.decode_buf[..len]),
                        Err(err) => Err(err),
                    }
                }
                else {
                    self.transformer.push_frame(&self.frame_buf[..size])
                };

                if let Err(err) = pushed {
                    if total > 0 {
                        break;
                    }
                    return Err(err);
                }

                self.consume_seek_skip();
                continue;
            }

            if self.transformer.bytes_buffered() > 0 {
                // Final partial block group, zero-padded.
                self.transformer.flush();
                self.consume_seek_skip();
                continue;
            }

            break;
        }

        Ok(total)
    }

    /// The multi-threaded audio read: same shape as the single-threaded loop, but frames
    /// arrive already decoded, in serial order, from the pipeline's process queue.
    fn read_audio_region_mt(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;

        while total < buf.len() && self.position < self.info.metadata_offset {
            if self.transformer.pending() > 0 {
                let n = self.transformer.read(&mut buf[total..]);
                self.position += n as u64;
                total += n;
                continue;
            }

            let Some(pipeline) = self.pipeline.as_ref() else {
                return read_error("pipeline detached");
            };

            let Some(job) = pipeline.next_job() else {
                if total > 0 {
                    break;
                }
                return read_error("decode queue shut down");
            };

            if job.eof {
                if self.transformer.bytes_buffered() > 0 {
                    self.transformer.flush();
                    self.consume_seek_skip();
                    continue;
                }
                break;
            }

            if let Some(err) = job.error {
                debug!("vfs: mt decode failed at frame {}: {}", job.frame_number, err);
                if total > 0 {
                    break;
                }
                return Err(err);
            }

            let Some(data) = job.data else {
                if total > 0 {
                    break;
                }
                return dst_decode_error("decoded frame missing payload");
            };

            if let Err(err) = self.transformer.push_frame(data.data()) {
                if total > 0 {
                    break;
                }
                return Err(err);
            }

            self.consume_seek_skip();
        }

        Ok(total)
    }

    fn read_metadata_region(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.info.metadata_size == 0 {
            return end_of_file_error();
        }

        let tag = self.ctx.get_id3_tag(self.area, self.track)?;

        let offset = (self.position - self.info.metadata_offset) as usize;
        if offset >= tag.len() {
            return end_of_file_error();
        }

        let remaining = &tag[offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n as u64;
        Ok(n)
    }

    /// Discard the post-seek alignment prefix from freshly produced transform output.
    fn consume_seek_skip(&mut self) {
        if self.seek_skip_bytes > 0 && self.transformer.pending() > 0 {
            let want = usize::try_from(self.seek_skip_bytes).unwrap_or(usize::MAX);
            let skipped = self.transformer.skip(want);
            self.seek_skip_bytes -= skipped as u64;
        }
    }
}
