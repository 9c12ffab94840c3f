// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The overlay context: one logical namespace over a host directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, warn};
use parking_lot::Mutex;

use cadenza_core::dst::DstDecoderFactory;
use cadenza_core::errors::{invalid_parameter_error, not_found_error, Error, Result};
use cadenza_core::sacd::{Area, SacdOpener};
use cadenza_core::tpool::ThreadPool;
use cadenza_vfs::{SacdVfs, TagRenderer, VfsEntry, VfsEntryType};

use crate::config::{IsoExtensions, OverlayConfig};
use crate::file::OverlayFile;
use crate::mount::IsoMount;
use crate::paths::{
    build_source_path, is_iso_name, is_sidecar_name, iso_base_name, normalize_vpath,
    parent_and_name,
};

/// Default worker count when the configuration selects automatic sizing.
const DEFAULT_POOL_SIZE: usize = 4;

/// The type of an overlay entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEntryType {
    File,
    Directory,
    /// A virtual folder standing in for a hidden image file.
    IsoFolder,
}

/// Where an overlay entry comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlaySource {
    /// Mirrored from the host filesystem.
    Passthrough,
    /// Synthesized from a disc image.
    Virtual,
}

/// One entry of the overlay namespace.
#[derive(Debug, Clone)]
pub struct OverlayEntry {
    pub name: String,
    pub entry_type: OverlayEntryType,
    pub source: OverlaySource,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub mode: u32,
    pub writable: bool,
}

impl OverlayEntry {
    fn iso_folder(name: &str) -> OverlayEntry {
        OverlayEntry {
            name: name.to_string(),
            entry_type: OverlayEntryType::IsoFolder,
            source: OverlaySource::Virtual,
            size: 0,
            mtime: None,
            mode: 0o755,
            writable: false,
        }
    }

    fn passthrough(name: &str, meta: &fs::Metadata) -> OverlayEntry {
        let is_dir = meta.is_dir();
        OverlayEntry {
            name: name.to_string(),
            entry_type: if is_dir { OverlayEntryType::Directory } else { OverlayEntryType::File },
            source: OverlaySource::Passthrough,
            size: if is_dir { 0 } else { meta.len() },
            mtime: meta.modified().ok(),
            mode: if is_dir { 0o755 } else { 0o666 },
            writable: !is_dir,
        }
    }

    fn from_vfs(entry: &VfsEntry) -> OverlayEntry {
        let is_dir = entry.entry_type == VfsEntryType::Directory;
        OverlayEntry {
            name: entry.name.clone(),
            entry_type: if is_dir { OverlayEntryType::Directory } else { OverlayEntryType::File },
            source: OverlaySource::Virtual,
            size: entry.size,
            mtime: None,
            mode: if is_dir { 0o755 } else { 0o666 },
            // Virtual files accept writes into their tag region.
            writable: !is_dir,
        }
    }
}

pub(crate) struct OverlayShared {
    pub source_dir: PathBuf,
    pub extensions: IsoExtensions,
    pub max_open_isos: u32,
    pub cache_timeout: Option<Duration>,
    pub visible: [bool; 2],

    pub opener: Arc<dyn SacdOpener>,
    pub dst_factory: Option<Arc<dyn DstDecoderFactory>>,
    pub renderer: Arc<dyn TagRenderer>,

    /// Worker pool shared by every mount's DST pipelines; `None` disables MT decoding.
    pub pool: Option<Arc<ThreadPool>>,
    pub mounts: Mutex<Vec<Arc<IsoMount>>>,
}

impl Drop for OverlayShared {
    fn drop(&mut self) {
        // Unsaved tag edits must not be lost on teardown.
        for mount in self.mounts.lock().iter() {
            let state = mount.state.lock();
            if let Some(vfs) = &state.vfs {
                if vfs.has_unsaved_id3_changes() {
                    if let Err(err) = vfs.save_id3_overlay() {
                        warn!("overlay: failed to save {:?}: {}", mount.iso_path, err);
                    }
                }
            }
        }
    }
}

/// The overlay filesystem.
///
/// Cheap to clone; all clones share the same namespace, pool, and mount table. Open
/// [`OverlayFile`]s keep the context alive.
#[derive(Clone)]
pub struct Overlay {
    pub(crate) inner: Arc<OverlayShared>,
}

impl Overlay {
    /// Create an overlay over `config.source_dir`.
    ///
    /// The opener probes and opens disc images, the factory decodes DST (pass `None` to treat
    /// DST areas as unreadable), and the renderer produces default tags for tracks without
    /// overlays.
    pub fn new(
        config: OverlayConfig,
        opener: Arc<dyn SacdOpener>,
        dst_factory: Option<Arc<dyn DstDecoderFactory>>,
        renderer: Arc<dyn TagRenderer>,
    ) -> Result<Overlay> {
        if config.source_dir.as_os_str().is_empty() {
            return invalid_parameter_error("source directory not set");
        }

        let meta = fs::metadata(&config.source_dir).map_err(|_| Error::NotFound)?;
        if !meta.is_dir() {
            return Err(Error::NotDirectory);
        }

        // A pool failure is not fatal: DST decoding falls back to the single-threaded path.
        let pool = if config.thread_pool_size >= 0 {
            let n = match config.thread_pool_size {
                0 => DEFAULT_POOL_SIZE,
                n => n as usize,
            };
            match ThreadPool::new(n) {
                Ok(pool) => Some(Arc::new(pool)),
                Err(err) => {
                    warn!("overlay: worker pool unavailable: {}", err);
                    None
                }
            }
        }
        else {
            None
        };

        Ok(Overlay {
            inner: Arc::new(OverlayShared {
                source_dir: config.source_dir,
                extensions: config.iso_extensions,
                max_open_isos: config.max_open_isos,
                cache_timeout: match config.cache_timeout_seconds {
                    t if t > 0 => Some(Duration::from_secs(t as u64)),
                    _ => None,
                },
                visible: [config.stereo_visible, config.multichannel_visible],
                opener,
                dst_factory,
                renderer,
                pool,
                mounts: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Get the shadowed host directory.
    pub fn source_dir(&self) -> &Path {
        &self.inner.source_dir
    }

    /// Get metadata for one entry of the overlay namespace.
    pub fn stat(&self, vpath: &str) -> Result<OverlayEntry> {
        let vpath = normalize_vpath(vpath);

        if vpath == "/" {
            return Ok(OverlayEntry {
                name: "/".to_string(),
                entry_type: OverlayEntryType::Directory,
                source: OverlaySource::Passthrough,
                size: 0,
                mtime: None,
                mode: 0o755,
                writable: false,
            });
        }

        // A real host entry passes through, unless it is a hidden image or sidecar.
        let source = build_source_path(&self.inner.source_dir, &vpath);
        if let Ok(meta) = fs::metadata(&source) {
            let (_, name) = parent_and_name(&vpath);

            if meta.is_file() && is_iso_name(&name, self.inner.extensions) {
                return not_found_error();
            }
            if is_sidecar_name(&name) {
                return not_found_error();
            }

            return Ok(OverlayEntry::passthrough(&name, &meta));
        }

        // A registered image folder, or a path inside one.
        if let Some(mount) = self.find_mount_by_vpath(&vpath) {
            let inner = mount.inner_vpath(&vpath);
            if inner == "/" {
                return Ok(OverlayEntry::iso_folder(&mount.display_name));
            }

            let vfs = self.ensure_mounted(&mount)?;
            let entry = vfs.stat(inner)?;
            return Ok(OverlayEntry::from_vfs(&entry));
        }

        // An image folder that has not been scanned yet: `<name>` backed by `<name>.iso`.
        let (parent, name) = parent_and_name(&vpath);
        if !name.is_empty() {
            let parent_source = build_source_path(&self.inner.source_dir, &parent);
            for ext in self.candidate_extensions() {
                let candidate = parent_source.join(format!("{}.{}", name, ext));
                if candidate.is_file() && self.inner.opener.probe(&candidate) {
                    return Ok(OverlayEntry::iso_folder(&name));
                }
            }
        }

        not_found_error()
    }

    /// List a directory of the overlay namespace.
    ///
    /// The callback returns `true` to continue and `false` to stop early. Returns the number
    /// of entries emitted.
    pub fn readdir(
        &self,
        vpath: &str,
        mut callback: impl FnMut(&OverlayEntry) -> bool,
    ) -> Result<usize> {
        let vpath = normalize_vpath(vpath);

        // Inside an image folder: delegate to the VFS.
        if let Some(mount) = self.find_mount_by_vpath(&vpath) {
            let inner = mount.inner_vpath(&vpath).to_string();
            let vfs = self.ensure_mounted(&mount)?;
            return vfs.readdir(&inner, |entry| callback(&OverlayEntry::from_vfs(entry)));
        }

        let source = build_source_path(&self.inner.source_dir, &vpath);
        let meta = fs::metadata(&source).map_err(|_| Error::NotFound)?;
        if !meta.is_dir() {
            return Err(Error::NotDirectory);
        }

        let mut seen: Vec<String> = Vec::new();
        let mut count = 0;

        for host_entry in fs::read_dir(&source)? {
            let Ok(host_entry) = host_entry else { continue };
            let name = host_entry.file_name().to_string_lossy().into_owned();
            let Ok(meta) = host_entry.metadata() else { continue };

            if meta.is_file() && is_iso_name(&name, self.inner.extensions) {
                // Image files are hidden; valid ones reappear as virtual folders.
                let full = host_entry.path();
                if !self.inner.opener.probe(&full) {
                    continue;
                }

                let base = iso_base_name(&name).to_string();
                let mut display = base.clone();
                let mut collision = 0u32;
                while seen.iter().any(|s| s == &display) {
                    collision += 1;
                    display = format!("{} ({})", base, collision);
                }

                match self.get_or_create_mount(&full, &vpath, &display, collision) {
                    Ok(_) => {
                        seen.push(display.clone());
                        count += 1;
                        if !callback(&OverlayEntry::iso_folder(&display)) {
                            return Ok(count);
                        }
                    }
                    Err(err) => {
                        warn!("overlay: cannot register {:?}: {}", full, err);
                    }
                }
                continue;
            }

            if is_sidecar_name(&name) {
                continue;
            }

            seen.push(name.clone());
            count += 1;
            if !callback(&OverlayEntry::passthrough(&name, &meta)) {
                return Ok(count);
            }
        }

        Ok(count)
    }

    /// Open a file, passthrough or virtual. `write` requests a writable handle; on virtual
    /// files only the tag region accepts data.
    pub fn open(&self, vpath: &str, write: bool) -> Result<OverlayFile> {
        let vpath = normalize_vpath(vpath);

        if let Some(mount) = self.find_mount_by_vpath(&vpath) {
            let inner = mount.inner_vpath(&vpath);
            if inner == "/" {
                return Err(Error::IsDirectory);
            }

            let vfs = self.ensure_mounted(&mount)?;
            let vfs_file = vfs.open_file_mt(inner, self.inner.pool.as_ref())?;

            {
                let mut state = mount.state.lock();
                state.ref_count += 1;
                state.last_access = Instant::now();
            }

            return Ok(OverlayFile::new_virtual(self.clone(), vpath, mount, vfs, vfs_file, write));
        }

        let (_, name) = parent_and_name(&vpath);
        if is_iso_name(&name, self.inner.extensions) || is_sidecar_name(&name) {
            return not_found_error();
        }

        let source = build_source_path(&self.inner.source_dir, &vpath);
        let meta = fs::metadata(&source).map_err(|_| Error::NotFound)?;
        if meta.is_dir() {
            return Err(Error::IsDirectory);
        }

        let file = fs::OpenOptions::new().read(true).write(write).open(&source)?;
        Ok(OverlayFile::new_passthrough(self.clone(), vpath, file, source, write))
    }

    /// Returns true if `vpath` names a virtual entry (a registered image folder or anything
    /// inside one).
    pub fn is_virtual_path(&self, vpath: &str) -> bool {
        self.find_mount_by_vpath(&normalize_vpath(vpath)).is_some()
    }

    /// Translate a passthrough virtual path to its host path. Virtual paths have no host
    /// counterpart.
    pub fn source_path_for(&self, vpath: &str) -> Result<PathBuf> {
        let vpath = normalize_vpath(vpath);
        if self.find_mount_by_vpath(&vpath).is_some() {
            return invalid_parameter_error("path is virtual");
        }
        Ok(build_source_path(&self.inner.source_dir, &vpath))
    }

    /// Number of images currently mounted (attached VFS), not merely registered.
    pub fn mounted_iso_count(&self) -> usize {
        let mounts = self.inner.mounts.lock();
        mounts.iter().filter(|m| m.state.lock().vfs.is_some()).count()
    }

    /// Save every mount's unsaved tag edits.
    pub fn flush_all(&self) {
        let mounts: Vec<Arc<IsoMount>> = self.inner.mounts.lock().clone();
        for mount in mounts {
            let state = mount.state.lock();
            if let Some(vfs) = &state.vfs {
                if vfs.has_unsaved_id3_changes() {
                    if let Err(err) = vfs.save_id3_overlay() {
                        warn!("overlay: failed to save {:?}: {}", mount.iso_path, err);
                    }
                }
            }
        }
    }

    /// Unmount images that have been idle past the cache timeout. The registration stays for
    /// re-use; only the attached VFS is released (after saving pending tag edits). Returns
    /// the number of images unmounted.
    pub fn cleanup_idle(&self) -> usize {
        let Some(timeout) = self.inner.cache_timeout else { return 0 };

        let mounts: Vec<Arc<IsoMount>> = self.inner.mounts.lock().clone();
        let mut cleaned = 0;

        for mount in mounts {
            let mut state = mount.state.lock();
            let Some(vfs) = &state.vfs else { continue };

            if state.ref_count == 0 && state.last_access.elapsed() > timeout {
                if vfs.has_unsaved_id3_changes() {
                    if let Err(err) = vfs.save_id3_overlay() {
                        warn!("overlay: failed to save {:?}: {}", mount.iso_path, err);
                    }
                }
                state.vfs = None;
                cleaned += 1;
                debug!("overlay: unmounted idle image {:?}", mount.iso_path);
            }
        }

        cleaned
    }

    fn candidate_extensions(&self) -> Vec<&'static str> {
        let mut exts = Vec::new();
        if self.inner.extensions.contains(IsoExtensions::LOWER) {
            exts.push("iso");
        }
        if self.inner.extensions.contains(IsoExtensions::UPPER) {
            exts.push("ISO");
        }
        exts
    }

    fn find_mount_by_vpath(&self, vpath: &str) -> Option<Arc<IsoMount>> {
        let mounts = self.inner.mounts.lock();

        // Prefer the longest (most specific) match.
        let mut best: Option<&Arc<IsoMount>> = None;
        for mount in mounts.iter() {
            if mount.covers_vpath(vpath) {
                match best {
                    Some(b) if b.iso_vpath.len() >= mount.iso_vpath.len() => {}
                    _ => best = Some(mount),
                }
            }
        }
        best.cloned()
    }

    fn get_or_create_mount(
        &self,
        iso_path: &Path,
        parent_vpath: &str,
        display_name: &str,
        collision_index: u32,
    ) -> Result<Arc<IsoMount>> {
        let mut mounts = self.inner.mounts.lock();

        if let Some(mount) = mounts.iter().find(|m| m.iso_path == iso_path) {
            return Ok(Arc::clone(mount));
        }

        if self.inner.max_open_isos > 0 && mounts.len() >= self.inner.max_open_isos as usize {
            return Err(Error::TooManyOpen);
        }

        let mount = Arc::new(IsoMount::new(
            iso_path.to_path_buf(),
            parent_vpath,
            display_name,
            collision_index,
        ));
        mounts.push(Arc::clone(&mount));
        debug!(
            "overlay: registered image #{}: {} (collision {})",
            mounts.len(),
            display_name,
            mount.collision_index
        );

        Ok(mount)
    }

    pub(crate) fn ensure_mounted(&self, mount: &Arc<IsoMount>) -> Result<SacdVfs> {
        let mut state = mount.state.lock();

        if state.vfs.is_none() {
            let vfs = SacdVfs::open(
                Arc::clone(&self.inner.opener),
                self.inner.dst_factory.clone(),
                Arc::clone(&self.inner.renderer),
                &mount.iso_path,
            )?;
            vfs.set_area_visibility(Area::Stereo, self.inner.visible[0]);
            vfs.set_area_visibility(Area::Multichannel, self.inner.visible[1]);
            state.vfs = Some(vfs);
        }

        state.last_access = Instant::now();
        state.vfs.clone().ok_or(Error::NotOpen)
    }
}
