// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Overlay file handles.
//!
//! A handle is either a passthrough onto a host file or a virtual handle onto a synthesized
//! DSF file. Virtual files accept writes: anything entirely below the tag region is silently
//! discarded (tools that rewrite whole files keep working), while writes into the tag region
//! accumulate in a scratch buffer that commits to the ID3 overlay (and its sidecar) on flush
//! and close.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::warn;

use cadenza_core::errors::{Error, Result};
use cadenza_vfs::{SacdVfs, VfsFile};

use crate::context::{Overlay, OverlayEntry, OverlaySource};
use crate::mount::IsoMount;

enum FileInner {
    Passthrough {
        file: fs::File,
        source_path: PathBuf,
    },
    Virtual {
        mount: Arc<IsoMount>,
        vfs: SacdVfs,
        vfs_file: VfsFile,
        /// Pending tag bytes, relative to the start of the tag region. Gaps are zero-filled.
        id3_scratch: Vec<u8>,
        id3_dirty: bool,
    },
}

/// An open overlay file.
pub struct OverlayFile {
    overlay: Overlay,
    vpath: String,
    writable: bool,
    inner: FileInner,
}

impl OverlayFile {
    pub(crate) fn new_passthrough(
        overlay: Overlay,
        vpath: String,
        file: fs::File,
        source_path: PathBuf,
        writable: bool,
    ) -> OverlayFile {
        OverlayFile {
            overlay,
            vpath,
            writable,
            inner: FileInner::Passthrough { file, source_path },
        }
    }

    pub(crate) fn new_virtual(
        overlay: Overlay,
        vpath: String,
        mount: Arc<IsoMount>,
        vfs: SacdVfs,
        vfs_file: VfsFile,
        writable: bool,
    ) -> OverlayFile {
        OverlayFile {
            overlay,
            vpath,
            writable,
            inner: FileInner::Virtual {
                mount,
                vfs,
                vfs_file,
                id3_scratch: Vec::new(),
                id3_dirty: false,
            },
        }
    }

    /// Get the handle's virtual path.
    pub fn vpath(&self) -> &str {
        &self.vpath
    }

    /// Where this handle's data comes from.
    pub fn source(&self) -> OverlaySource {
        match self.inner {
            FileInner::Passthrough { .. } => OverlaySource::Passthrough,
            FileInner::Virtual { .. } => OverlaySource::Virtual,
        }
    }

    /// Read at an absolute offset. A read at or past end-of-file returns zero bytes.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        match &mut self.inner {
            FileInner::Passthrough { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;

                let mut total = 0;
                while total < buf.len() {
                    let n = file.read(&mut buf[total..])?;
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                Ok(total)
            }
            FileInner::Virtual { vfs_file, .. } => {
                vfs_file.seek(SeekFrom::Start(offset))?;
                match vfs_file.read(buf) {
                    Ok(n) => Ok(n),
                    Err(Error::EndOfFile) => Ok(0),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Write at an absolute offset.
    ///
    /// Passthrough handles write to the host file. On virtual handles, the portion of the
    /// write below the tag region is accepted and discarded; the portion inside it is
    /// buffered for commit.
    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        if !self.writable {
            return Err(Error::Access);
        }

        match &mut self.inner {
            FileInner::Passthrough { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(data)?;
                Ok(data.len())
            }
            FileInner::Virtual { vfs_file, id3_scratch, id3_dirty, .. } => {
                let metadata_offset = vfs_file.info().metadata_offset;
                let write_end = offset + data.len() as u64;

                // Entirely below the tag region: report success, store nothing.
                if write_end <= metadata_offset {
                    return Ok(data.len());
                }

                let tag_start = offset.max(metadata_offset);
                let skip = (tag_start - offset) as usize;
                let scratch_offset = (tag_start - metadata_offset) as usize;
                let payload = &data[skip..];

                let required = scratch_offset + payload.len();
                if id3_scratch.len() < required {
                    // Zero-fill any gap between previous writes and this one.
                    id3_scratch.resize(required, 0);
                }
                id3_scratch[scratch_offset..required].copy_from_slice(payload);
                *id3_dirty = true;

                Ok(data.len())
            }
        }
    }

    /// Commit pending state: host buffers for passthrough files, the ID3 scratch (through the
    /// overlay cache to the sidecar) for virtual files.
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.inner {
            FileInner::Passthrough { file, .. } => {
                file.flush()?;
                Ok(())
            }
            FileInner::Virtual { vfs, vfs_file, id3_scratch, id3_dirty, .. } => {
                if !*id3_dirty || id3_scratch.is_empty() {
                    return Ok(());
                }

                vfs.set_id3_overlay(vfs_file.area(), vfs_file.track(), id3_scratch)?;
                vfs.save_id3_overlay()?;
                *id3_dirty = false;
                Ok(())
            }
        }
    }

    /// Get the file's size: host size for passthrough, synthesized total for virtual.
    pub fn size(&self) -> Result<u64> {
        match &self.inner {
            FileInner::Passthrough { source_path, .. } => Ok(fs::metadata(source_path)?.len()),
            FileInner::Virtual { vfs_file, .. } => Ok(vfs_file.info().total_size),
        }
    }

    /// Get metadata for this handle's path.
    pub fn stat(&self) -> Result<OverlayEntry> {
        self.overlay.stat(&self.vpath)
    }
}

impl Drop for OverlayFile {
    fn drop(&mut self) {
        // Close still releases resources when the final flush fails; the failure is only
        // logged.
        if let Err(err) = self.flush() {
            warn!("overlay: flush of {} failed on close: {}", self.vpath, err);
        }

        if let FileInner::Virtual { mount, .. } = &self.inner {
            mount.release();
        }
    }
}
