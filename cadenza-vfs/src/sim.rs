// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated SACD source and DST codec.
//!
//! The real SACD reader and DST codec are external components. This module provides small,
//! fully deterministic stand-ins implementing the same traits, so the complete VFS — layout,
//! transform, seek arithmetic, the multi-threaded pipeline, tag overlays — can be exercised
//! without disc images or codec licenses.
//!
//! A simulated image is an ordinary file with a `CDZSIM01` magic and a track table; frame
//! payloads are generated from a xorshift PRNG keyed by `(seed, area, frame)`. The simulated
//! DST "compression" XORs every payload byte with `0xA5`, so single- and multi-threaded
//! decodes must agree bit-for-bit.

use std::fs;
use std::path::Path;

use cadenza_core::dst::{DstDecoder, DstDecoderFactory};
use cadenza_core::errors::{
    dst_decode_error, format_error, invalid_parameter_error, not_found_error, read_error, Result,
};
use cadenza_core::sacd::{Area, FrameFormat, SacdOpener, SacdReader, FRAME_SIZE_64};

use crate::id3::TagRenderer;

const IMAGE_MAGIC: &[u8; 8] = b"CDZSIM01";
const DST_XOR_MASK: u8 = 0xA5;

/// One track of a simulated area.
#[derive(Debug, Clone)]
pub struct SimTrack {
    pub frames: u32,
    pub title: Option<String>,
}

/// One area of a simulated disc.
#[derive(Debug, Clone)]
pub struct SimArea {
    pub channels: u16,
    pub sample_rate: u32,
    pub format: FrameFormat,
    pub tracks: Vec<SimTrack>,
}

impl SimArea {
    pub fn new(channels: u16, format: FrameFormat) -> SimArea {
        SimArea { channels, sample_rate: 2_822_400, format, tracks: Vec::new() }
    }

    pub fn with_track(mut self, frames: u32) -> SimArea {
        self.tracks.push(SimTrack { frames, title: None });
        self
    }

    pub fn with_titled_track(mut self, frames: u32, title: &str) -> SimArea {
        self.tracks.push(SimTrack { frames, title: Some(title.to_string()) });
        self
    }

    fn total_frames(&self) -> u32 {
        self.tracks.iter().map(|t| t.frames).sum()
    }
}

/// A simulated disc: up to two areas plus an album title and a payload seed.
#[derive(Debug, Clone)]
pub struct SimDisc {
    pub album: Option<String>,
    pub stereo: Option<SimArea>,
    pub multichannel: Option<SimArea>,
    pub seed: u64,
}

impl SimDisc {
    pub fn new(seed: u64) -> SimDisc {
        SimDisc { album: None, stereo: None, multichannel: None, seed }
    }

    pub fn with_album(mut self, album: &str) -> SimDisc {
        self.album = Some(album.to_string());
        self
    }

    pub fn with_stereo(mut self, area: SimArea) -> SimDisc {
        self.stereo = Some(area);
        self
    }

    pub fn with_multichannel(mut self, area: SimArea) -> SimDisc {
        self.multichannel = Some(area);
        self
    }

    fn area(&self, area: Area) -> Option<&SimArea> {
        match area {
            Area::Stereo => self.stereo.as_ref(),
            Area::Multichannel => self.multichannel.as_ref(),
        }
    }

    /// Write the disc as a simulated image file.
    pub fn write_image(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(IMAGE_MAGIC);
        out.extend_from_slice(&self.seed.to_le_bytes());

        put_string(&mut out, self.album.as_deref());

        for area in [&self.stereo, &self.multichannel] {
            match area {
                None => out.push(0),
                Some(area) => {
                    out.push(1);
                    out.extend_from_slice(&area.channels.to_le_bytes());
                    out.extend_from_slice(&area.sample_rate.to_le_bytes());
                    out.push(match area.format {
                        FrameFormat::Dsd => 0,
                        FrameFormat::Dst => 1,
                    });
                    out.push(area.tracks.len() as u8);
                    for track in &area.tracks {
                        out.extend_from_slice(&track.frames.to_le_bytes());
                        put_string(&mut out, track.title.as_deref());
                    }
                }
            }
        }

        out
    }

    fn from_bytes(data: &[u8]) -> Result<SimDisc> {
        let mut cursor = Cursor { data, pos: 0 };

        if cursor.take(8)? != IMAGE_MAGIC {
            return format_error("sim: bad image magic");
        }

        let seed = u64::from_le_bytes(cursor.take(8)?.try_into().unwrap_or_default());
        let album = take_string(&mut cursor)?;

        let mut areas: [Option<SimArea>; 2] = [None, None];
        for slot in areas.iter_mut() {
            if cursor.take(1)?[0] == 0 {
                continue;
            }

            let channels =
                u16::from_le_bytes(cursor.take(2)?.try_into().unwrap_or_default());
            let sample_rate =
                u32::from_le_bytes(cursor.take(4)?.try_into().unwrap_or_default());
            let format = match cursor.take(1)?[0] {
                0 => FrameFormat::Dsd,
                1 => FrameFormat::Dst,
                _ => return format_error("sim: bad frame format"),
            };
            let track_count = cursor.take(1)?[0];

            let mut tracks = Vec::with_capacity(usize::from(track_count));
            for _ in 0..track_count {
                let frames = u32::from_le_bytes(cursor.take(4)?.try_into().unwrap_or_default());
                let title = take_string(&mut cursor)?;
                tracks.push(SimTrack { frames, title });
            }

            *slot = Some(SimArea { channels, sample_rate, format, tracks });
        }

        let [stereo, multichannel] = areas;
        Ok(SimDisc { album, stereo, multichannel, seed })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return format_error("sim: truncated image");
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

fn put_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => out.extend_from_slice(&0u16.to_le_bytes()),
        Some(s) => {
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
    }
}

fn take_string(cursor: &mut Cursor<'_>) -> Result<Option<String>> {
    let len = u16::from_le_bytes(cursor.take(2)?.try_into().unwrap_or_default());
    if len == 0 {
        return Ok(None);
    }
    let bytes = cursor.take(usize::from(len))?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Some(s.to_string())),
        Err(_) => format_error("sim: invalid utf-8 string"),
    }
}

/// Opens simulated images.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimOpener;

impl SacdOpener for SimOpener {
    fn probe(&self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(data) => data.len() >= IMAGE_MAGIC.len() && data[..8] == IMAGE_MAGIC[..],
            Err(_) => false,
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn SacdReader>> {
        let data = fs::read(path)?;
        let disc = SimDisc::from_bytes(&data)?;

        let selected = if disc.stereo.is_some() { Area::Stereo } else { Area::Multichannel };
        if disc.area(selected).is_none() {
            return format_error("sim: image has no areas");
        }

        Ok(Box::new(SimReader { disc, selected }))
    }
}

struct SimReader {
    disc: SimDisc,
    selected: Area,
}

impl SimReader {
    fn sel(&self) -> &SimArea {
        // `selected` is only ever set to a present area.
        match self.disc.area(self.selected) {
            Some(area) => area,
            None => unreachable!("selected area vanished"),
        }
    }

    fn track(&self, track: u8) -> Result<&SimTrack> {
        if track == 0 {
            return invalid_parameter_error("track number is 1-based");
        }
        match self.sel().tracks.get(usize::from(track) - 1) {
            Some(t) => Ok(t),
            None => not_found_error(),
        }
    }
}

impl SacdReader for SimReader {
    fn album_title(&self) -> Option<String> {
        self.disc.album.clone()
    }

    fn disc_title(&self) -> Option<String> {
        None
    }

    fn available_areas(&self) -> Vec<Area> {
        let mut areas = Vec::new();
        if self.disc.stereo.is_some() {
            areas.push(Area::Stereo);
        }
        if self.disc.multichannel.is_some() {
            areas.push(Area::Multichannel);
        }
        areas
    }

    fn select_area(&mut self, area: Area) -> Result<()> {
        if self.disc.area(area).is_none() {
            return not_found_error();
        }
        self.selected = area;
        Ok(())
    }

    fn track_count(&self) -> u8 {
        self.sel().tracks.len() as u8
    }

    fn channel_count(&self) -> u16 {
        self.sel().channels
    }

    fn sample_rate(&self) -> u32 {
        self.sel().sample_rate
    }

    fn frame_format(&self) -> FrameFormat {
        self.sel().format
    }

    fn track_title(&self, track: u8) -> Option<String> {
        self.track(track).ok().and_then(|t| t.title.clone())
    }

    fn track_index_start(&self, track: u8) -> Result<u32> {
        self.track(track)?;
        let start =
            self.sel().tracks[..usize::from(track) - 1].iter().map(|t| t.frames).sum();
        Ok(start)
    }

    fn track_frame_length(&self, track: u8) -> Result<u32> {
        Ok(self.track(track)?.frames)
    }

    fn read_frame(&mut self, frame_no: u32, buf: &mut [u8]) -> Result<usize> {
        let area = self.sel();
        if frame_no >= area.total_frames() {
            return read_error("sim: frame out of range");
        }

        let len = FRAME_SIZE_64 * usize::from(area.channels);
        if buf.len() < len {
            return invalid_parameter_error("frame buffer too small");
        }

        fill_frame_payload(self.disc.seed, self.selected, frame_no, &mut buf[..len]);

        if area.format == FrameFormat::Dst {
            // Simulated compression: same length, every byte masked.
            for byte in &mut buf[..len] {
                *byte ^= DST_XOR_MASK;
            }
        }

        Ok(len)
    }
}

/// Deterministic frame payload keyed by `(seed, area, frame)`.
fn fill_frame_payload(seed: u64, area: Area, frame_no: u32, buf: &mut [u8]) {
    let mut state = seed
        ^ (area.index() as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ u64::from(frame_no + 1).wrapping_mul(0xD1B5_4A32_D192_ED03);

    for chunk in buf.chunks_mut(8) {
        // xorshift64*.
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let word = state.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}

/// The simulated DST codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimDstFactory;

impl DstDecoderFactory for SimDstFactory {
    fn create(&self, _channels: u16, _sample_rate: u32) -> Result<Box<dyn DstDecoder>> {
        Ok(Box::new(SimDstDecoder))
    }
}

struct SimDstDecoder;

impl DstDecoder for SimDstDecoder {
    fn decode(&mut self, compressed: &[u8], out: &mut [u8]) -> Result<usize> {
        if out.len() < compressed.len() {
            return dst_decode_error("sim: output buffer too small");
        }
        for (dst, src) in out.iter_mut().zip(compressed) {
            *dst = src ^ DST_XOR_MASK;
        }
        Ok(compressed.len())
    }
}

/// Renders a minimal but well-formed ID3v2.4 tag holding the track title.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimTagRenderer;

impl TagRenderer for SimTagRenderer {
    fn render(&self, reader: &mut dyn SacdReader, track: u8) -> Result<Vec<u8>> {
        let title =
            reader.track_title(track).unwrap_or_else(|| format!("Track {:02}", track));

        // One TIT2 frame, UTF-8 encoded.
        let mut body = vec![0x03];
        body.extend_from_slice(title.as_bytes());

        let mut frames = Vec::new();
        frames.extend_from_slice(b"TIT2");
        frames.extend_from_slice(&syncsafe(body.len() as u32));
        frames.extend_from_slice(&[0x00, 0x00]);
        frames.extend_from_slice(&body);

        let mut tag = Vec::with_capacity(10 + frames.len());
        tag.extend_from_slice(b"ID3\x04\x00\x00");
        tag.extend_from_slice(&syncsafe(frames.len() as u32));
        tag.extend_from_slice(&frames);

        Ok(tag)
    }
}

fn syncsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_area_disc() -> SimDisc {
        SimDisc::new(7)
            .with_album("Test Album")
            .with_stereo(SimArea::new(2, FrameFormat::Dsd).with_titled_track(75, "One"))
            .with_multichannel(SimArea::new(6, FrameFormat::Dst).with_track(150))
    }

    #[test]
    fn verify_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        two_area_disc().write_image(&path).unwrap();

        let opener = SimOpener;
        assert!(opener.probe(&path));

        let mut reader = opener.open(&path).unwrap();
        assert_eq!(reader.album_title().as_deref(), Some("Test Album"));
        assert_eq!(reader.available_areas(), vec![Area::Stereo, Area::Multichannel]);

        reader.select_area(Area::Stereo).unwrap();
        assert_eq!(reader.track_count(), 1);
        assert_eq!(reader.channel_count(), 2);
        assert_eq!(reader.frame_format(), FrameFormat::Dsd);
        assert_eq!(reader.track_title(1).as_deref(), Some("One"));
        assert_eq!(reader.track_index_start(1).unwrap(), 0);
        assert_eq!(reader.track_frame_length(1).unwrap(), 75);

        reader.select_area(Area::Multichannel).unwrap();
        assert_eq!(reader.channel_count(), 6);
        assert_eq!(reader.frame_format(), FrameFormat::Dst);
        assert_eq!(reader.track_title(1), None);
    }

    #[test]
    fn verify_probe_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-disc.iso");
        std::fs::write(&path, b"plain data").unwrap();

        assert!(!SimOpener.probe(&path));
        assert!(!SimOpener.probe(&dir.path().join("missing.iso")));
    }

    #[test]
    fn verify_frames_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        two_area_disc().write_image(&path).unwrap();

        let mut a = SimOpener.open(&path).unwrap();
        let mut b = SimOpener.open(&path).unwrap();

        let mut buf_a = vec![0; FRAME_SIZE_64 * 2];
        let mut buf_b = vec![0; FRAME_SIZE_64 * 2];
        for frame in 0..5 {
            let na = a.read_frame(frame, &mut buf_a).unwrap();
            let nb = b.read_frame(frame, &mut buf_b).unwrap();
            assert_eq!(na, nb);
            assert_eq!(buf_a, buf_b);
        }

        // Different frames differ.
        a.read_frame(0, &mut buf_a).unwrap();
        b.read_frame(1, &mut buf_b).unwrap();
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn verify_dst_mask_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        two_area_disc().write_image(&path).unwrap();

        let mut reader = SimOpener.open(&path).unwrap();
        reader.select_area(Area::Multichannel).unwrap();

        let mut compressed = vec![0; FRAME_SIZE_64 * 6];
        let n = reader.read_frame(3, &mut compressed).unwrap();

        let mut decoded = vec![0; n];
        let mut decoder = SimDstFactory.create(6, 2_822_400).unwrap();
        assert_eq!(decoder.decode(&compressed[..n], &mut decoded).unwrap(), n);

        let mut raw = vec![0; n];
        fill_frame_payload(7, Area::Multichannel, 3, &mut raw);
        assert_eq!(decoded, raw);
    }

    #[test]
    fn verify_tag_renderer_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        two_area_disc().write_image(&path).unwrap();

        let mut reader = SimOpener.open(&path).unwrap();
        let tag = SimTagRenderer.render(reader.as_mut(), 1).unwrap();

        assert_eq!(&tag[..3], b"ID3");
        assert_eq!(tag[3], 4);
        assert_eq!(&tag[10..14], b"TIT2");
        assert!(tag.ends_with(b"One"));
    }
}
