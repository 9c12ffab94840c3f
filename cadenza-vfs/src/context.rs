// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-image VFS context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use cadenza_core::dst::DstDecoderFactory;
use cadenza_core::errors::{invalid_parameter_error, not_found_error, Result};
use cadenza_core::path::sanitize_filename;
use cadenza_core::sacd::{Area, FrameFormat, SacdOpener, SacdReader, FRAMES_PER_SEC};
use cadenza_core::tpool::ThreadPool;
use cadenza_format_dsf::DsfLayout;

use crate::file::VfsFile;
use crate::id3::{Id3Entry, TagRenderer};
use crate::sidecar;

/// Directory names of the two areas in the virtual tree.
pub(crate) const AREA_DIR_NAMES: [&str; 2] = ["Stereo", "Multi-channel"];

/// The type of a virtual directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsEntryType {
    File,
    Directory,
}

/// One entry of the virtual tree.
#[derive(Debug, Clone)]
pub struct VfsEntry {
    pub name: String,
    pub entry_type: VfsEntryType,
    pub size: u64,
    pub area: Option<Area>,
    pub track: Option<u8>,
}

impl VfsEntry {
    fn directory(name: &str) -> VfsEntry {
        VfsEntry {
            name: name.to_string(),
            entry_type: VfsEntryType::Directory,
            size: 0,
            area: None,
            track: None,
        }
    }
}

pub(crate) struct AreaInfo {
    pub track_count: u8,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub frame_format: FrameFormat,
}

/// State guarded by the context lock: the context-level reader (used for metadata queries and
/// tag rendering) and the ID3 overlay caches.
pub(crate) struct CtxState {
    pub reader: Box<dyn SacdReader>,
    pub id3: [Vec<Id3Entry>; 2],
}

pub(crate) struct VfsShared {
    pub opener: Arc<dyn SacdOpener>,
    pub dst_factory: Option<Arc<dyn DstDecoderFactory>>,
    pub renderer: Arc<dyn TagRenderer>,
    pub iso_path: PathBuf,
    pub album_name: String,
    pub areas: [Option<AreaInfo>; 2],
    pub visibility: Mutex<[bool; 2]>,
    pub state: Mutex<CtxState>,
}

/// A virtual filesystem over one SACD disc image.
///
/// Cheap to clone; all clones share the same context. Open virtual files keep the context
/// alive.
#[derive(Clone)]
pub struct SacdVfs {
    pub(crate) inner: Arc<VfsShared>,
}

impl SacdVfs {
    /// Open a disc image.
    ///
    /// `dst_factory` enables DST decoding; without it, DST areas fail at file-open time. The
    /// sidecar next to the image, if any, seeds the ID3 overlay.
    pub fn open(
        opener: Arc<dyn SacdOpener>,
        dst_factory: Option<Arc<dyn DstDecoderFactory>>,
        renderer: Arc<dyn TagRenderer>,
        iso_path: &Path,
    ) -> Result<SacdVfs> {
        let mut reader = opener.open(iso_path)?;

        let album_name = reader
            .album_title()
            .or_else(|| reader.disc_title())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown Album".to_string());
        let album_name = sanitize_filename(&album_name);

        let mut areas: [Option<AreaInfo>; 2] = [None, None];
        let mut id3: [Vec<Id3Entry>; 2] = [Vec::new(), Vec::new()];

        for area in reader.available_areas() {
            if reader.select_area(area).is_err() {
                continue;
            }

            let track_count = reader.track_count();
            areas[area.index()] = Some(AreaInfo {
                track_count,
                channel_count: reader.channel_count(),
                sample_rate: reader.sample_rate(),
                frame_format: reader.frame_format(),
            });
            id3[area.index()] = (0..track_count).map(|_| Id3Entry::default()).collect();
        }

        sidecar::load(iso_path, &mut id3);

        debug!("vfs: opened {:?} as \"{}\"", iso_path, album_name);

        Ok(SacdVfs {
            inner: Arc::new(VfsShared {
                opener,
                dst_factory,
                renderer,
                iso_path: iso_path.to_path_buf(),
                album_name,
                areas,
                visibility: Mutex::new([true, true]),
                state: Mutex::new(CtxState { reader, id3 }),
            }),
        })
    }

    /// Get the sanitized album name used as the root folder of the virtual tree.
    pub fn album_name(&self) -> &str {
        &self.inner.album_name
    }

    /// Get the path of the underlying disc image.
    pub fn iso_path(&self) -> &Path {
        &self.inner.iso_path
    }

    /// Returns true if the disc has the given area.
    pub fn has_area(&self, area: Area) -> bool {
        self.inner.areas[area.index()].is_some()
    }

    /// Set whether an area appears in the virtual tree.
    pub fn set_area_visibility(&self, area: Area, visible: bool) {
        self.inner.visibility.lock()[area.index()] = visible;
    }

    /// Get an area's visibility setting.
    pub fn area_visibility(&self, area: Area) -> bool {
        self.inner.visibility.lock()[area.index()]
    }

    /// Decide whether an area is shown: it must exist, and be either visible or the only area
    /// on the disc (a single-area disc is always shown).
    pub fn should_show_area(&self, area: Area) -> bool {
        if !self.has_area(area) {
            return false;
        }
        if self.area_visibility(area) {
            return true;
        }
        !self.has_area(area.other())
    }

    /// Get the number of tracks in an area.
    pub fn track_count(&self, area: Area) -> Result<u8> {
        match &self.inner.areas[area.index()] {
            Some(info) => Ok(info.track_count),
            None => not_found_error(),
        }
    }

    /// Get the virtual filename of a track: `"NN. <Title>.dsf"`, with a `"Track NN"` fallback
    /// when the disc has no title for it.
    pub fn track_filename(&self, area: Area, track: u8) -> Result<String> {
        let info = self.area_info(area)?;
        if track == 0 {
            return invalid_parameter_error("track number is 1-based");
        }
        if track > info.track_count {
            return not_found_error();
        }

        let mut state = self.inner.state.lock();

        let title = match state.reader.select_area(area) {
            Ok(()) => state.reader.track_title(track),
            Err(_) => None,
        };

        let title = match title.filter(|t| !t.is_empty()) {
            Some(title) => sanitize_filename(&title),
            None => format!("Track {:02}", track),
        };

        Ok(format!("{:02}. {}.dsf", track, title))
    }

    /// List a directory of the virtual tree.
    ///
    /// The callback returns `true` to continue and `false` to stop early. Returns the number
    /// of entries emitted.
    pub fn readdir(
        &self,
        path: &str,
        mut callback: impl FnMut(&VfsEntry) -> bool,
    ) -> Result<usize> {
        let components = normalized_components(path);
        let mut count = 0;

        // Root directory: the album folder.
        if components.is_empty() {
            let entry = VfsEntry::directory(&self.inner.album_name);
            callback(&entry);
            return Ok(1);
        }

        if components[0] != self.inner.album_name {
            return not_found_error();
        }

        // Album directory: one folder per visible area.
        if components.len() == 1 {
            for area in [Area::Stereo, Area::Multichannel] {
                if self.should_show_area(area) {
                    count += 1;
                    let entry = VfsEntry::directory(AREA_DIR_NAMES[area.index()]);
                    if !callback(&entry) {
                        return Ok(count);
                    }
                }
            }
            return Ok(count);
        }

        // Area directory: the tracks.
        if components.len() == 2 {
            let Some(area) = area_from_dir_name(components[1]) else {
                return not_found_error();
            };
            if !self.should_show_area(area) {
                return not_found_error();
            }

            let track_count = self.track_count(area)?;
            for track in 1..=track_count {
                let name = self.track_filename(area, track)?;
                let (layout, ..) = self.track_layout(area, track)?;

                count += 1;
                let entry = VfsEntry {
                    name,
                    entry_type: VfsEntryType::File,
                    size: layout.total_size(),
                    area: Some(area),
                    track: Some(track),
                };
                if !callback(&entry) {
                    return Ok(count);
                }
            }
            return Ok(count);
        }

        not_found_error()
    }

    /// Get metadata for one entry of the virtual tree.
    pub fn stat(&self, path: &str) -> Result<VfsEntry> {
        let components = normalized_components(path);

        match components.as_slice() {
            [] => Ok(VfsEntry::directory("/")),
            [album] if *album == self.inner.album_name => {
                Ok(VfsEntry::directory(&self.inner.album_name))
            }
            [album, dir] if *album == self.inner.album_name => {
                match area_from_dir_name(dir) {
                    Some(area) if self.should_show_area(area) => Ok(VfsEntry::directory(dir)),
                    _ => not_found_error(),
                }
            }
            _ => {
                let (area, track) = self.parse_track_path(path)?;
                let (layout, ..) = self.track_layout(area, track)?;

                let name = components.last().map(|n| n.to_string()).unwrap_or_default();
                Ok(VfsEntry {
                    name,
                    entry_type: VfsEntryType::File,
                    size: layout.total_size(),
                    area: Some(area),
                    track: Some(track),
                })
            }
        }
    }

    /// Open a track as a virtual DSF file (single-threaded DST decoding).
    pub fn open_file(&self, path: &str) -> Result<VfsFile> {
        VfsFile::open(self, path, None)
    }

    /// Open a track as a virtual DSF file, decoding DST frames ahead of the consumer on
    /// `pool`'s workers. Non-DST areas, or a `None` pool, fall back to the single-threaded
    /// path.
    pub fn open_file_mt(&self, path: &str, pool: Option<&Arc<ThreadPool>>) -> Result<VfsFile> {
        VfsFile::open(self, path, pool)
    }

    /// Get the ID3 tag bytes for a track: the overlay entry when one is cached, otherwise a
    /// tag freshly rendered from disc metadata (which is then cached).
    pub fn get_id3_tag(&self, area: Area, track: u8) -> Result<Vec<u8>> {
        self.check_track(area, track)?;
        let mut state = self.inner.state.lock();
        self.get_id3_tag_locked(&mut state, area, track)
    }

    pub(crate) fn get_id3_tag_locked(
        &self,
        state: &mut CtxState,
        area: Area,
        track: u8,
    ) -> Result<Vec<u8>> {
        let idx = usize::from(track) - 1;

        if state.id3[area.index()][idx].valid {
            return Ok(state.id3[area.index()][idx].data.clone());
        }

        state.reader.select_area(area)?;
        let data = self.inner.renderer.render(state.reader.as_mut(), track)?;
        if data.is_empty() {
            return cadenza_core::errors::format_error("id3: renderer produced an empty tag");
        }

        let entry = &mut state.id3[area.index()][idx];
        entry.data = data.clone();
        entry.valid = true;

        Ok(data)
    }

    /// Replace the ID3 overlay for a track with user-provided bytes.
    pub fn set_id3_overlay(&self, area: Area, track: u8, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return invalid_parameter_error("id3 overlay must not be empty");
        }
        self.check_track(area, track)?;

        let mut state = self.inner.state.lock();
        state.id3[area.index()][usize::from(track) - 1] =
            Id3Entry { data: data.to_vec(), valid: true, dirty: true, from_xml: false };
        Ok(())
    }

    /// Drop the ID3 overlay for a track. The next save updates the sidecar accordingly.
    pub fn clear_id3_overlay(&self, area: Area, track: u8) -> Result<()> {
        self.check_track(area, track)?;

        let mut state = self.inner.state.lock();
        state.id3[area.index()][usize::from(track) - 1] =
            Id3Entry { data: Vec::new(), valid: false, dirty: true, from_xml: false };
        Ok(())
    }

    /// Returns true if any overlay entry differs from the sidecar.
    pub fn has_unsaved_id3_changes(&self) -> bool {
        let state = self.inner.state.lock();
        state.id3.iter().flatten().any(|e| e.dirty)
    }

    /// Persist the ID3 overlay to the sidecar (or remove the sidecar when nothing qualifies).
    pub fn save_id3_overlay(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        sidecar::save(&self.inner.iso_path, &mut state.id3)
    }

    pub(crate) fn area_info(&self, area: Area) -> Result<&AreaInfo> {
        match &self.inner.areas[area.index()] {
            Some(info) => Ok(info),
            None => not_found_error(),
        }
    }

    fn check_track(&self, area: Area, track: u8) -> Result<()> {
        let info = self.area_info(area)?;
        if track == 0 {
            return invalid_parameter_error("track number is 1-based");
        }
        if track > info.track_count {
            return not_found_error();
        }
        Ok(())
    }

    /// Parse a virtual path into its `(area, track)` pair. The filename must carry the
    /// `NN. ...` prefix.
    pub(crate) fn parse_track_path(&self, path: &str) -> Result<(Area, u8)> {
        let area = path
            .split('/')
            .find_map(area_from_dir_name)
            .ok_or(cadenza_core::errors::Error::NotFound)?;

        if !self.should_show_area(area) {
            return not_found_error();
        }

        let filename = path.rsplit('/').next().unwrap_or(path);
        let digits: String = filename.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() || !filename[digits.len()..].starts_with('.') {
            return not_found_error();
        }

        let track: u8 = match digits.parse() {
            Ok(track) if track > 0 => track,
            _ => return not_found_error(),
        };

        self.check_track(area, track)?;
        Ok((area, track))
    }

    /// Compute the layout and frame range of a track:
    /// `(layout, start_frame, end_frame)`.
    pub(crate) fn track_layout(&self, area: Area, track: u8) -> Result<(DsfLayout, u32, u32)> {
        let info = self.area_info(area)?;

        let mut state = self.inner.state.lock();
        state.reader.select_area(area)?;
        let start = state.reader.track_index_start(track)?;
        let length = state.reader.track_frame_length(track)?;

        let metadata_size = self.get_id3_tag_locked(&mut state, area, track)
            .map(|tag| tag.len() as u64)
            .unwrap_or(0);

        let layout = DsfLayout {
            channels: info.channel_count,
            sample_rate: info.sample_rate,
            frame_count: length,
            metadata_size,
        };

        Ok((layout, start, start + length))
    }

    /// Duration of `frames` frames in seconds.
    pub(crate) fn frames_to_seconds(frames: u32) -> f64 {
        f64::from(frames) / f64::from(FRAMES_PER_SEC)
    }
}

fn area_from_dir_name(name: &str) -> Option<Area> {
    match name {
        "Stereo" => Some(Area::Stereo),
        "Multi-channel" => Some(Area::Multichannel),
        _ => None,
    }
}

fn normalized_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}
