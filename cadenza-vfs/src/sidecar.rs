// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ID3 overlay sidecar.
//!
//! User-edited tags persist to an XML file stored next to the disc image (`<iso>.xml`):
//!
//! ```text
//! <SacdId3Overlay version="1.0" iso="album.iso">
//!   <Area type="stereo">
//!     <Track number="1">
//!       <Id3>BASE64...</Id3>
//!     </Track>
//!   </Area>
//! </SacdId3Overlay>
//! ```
//!
//! Only entries that are valid and either dirty or originally from the sidecar are written.
//! When no entry qualifies the sidecar is removed. Unreadable or malformed sidecars are
//! skipped silently; the overlay simply starts empty.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use cadenza_core::errors::{Error, Result};

use crate::id3::Id3Entry;

const AREA_NAMES: [&str; 2] = ["stereo", "multichannel"];

/// The sidecar lives next to the image: `<iso_path>.xml`.
pub(crate) fn sidecar_path(iso_path: &Path) -> PathBuf {
    let mut os = iso_path.as_os_str().to_os_string();
    os.push(".xml");
    PathBuf::from(os)
}

/// Load sidecar entries into the caches. Missing or malformed sidecars are ignored.
pub(crate) fn load(iso_path: &Path, caches: &mut [Vec<Id3Entry>; 2]) {
    let path = sidecar_path(iso_path);

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(_) => return,
    };

    let mut reader = Reader::from_str(&contents);

    let mut area: Option<usize> = None;
    let mut track: Option<usize> = None;
    let mut in_id3 = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"Area" => {
                    area = attribute(&e, b"type")
                        .and_then(|t| AREA_NAMES.iter().position(|&n| n == t));
                }
                b"Track" => {
                    track = attribute(&e, b"number").and_then(|n| n.parse::<usize>().ok());
                }
                b"Id3" => in_id3 = true,
                _ => {}
            },
            Ok(Event::Text(text)) if in_id3 => {
                let (Some(area), Some(track)) = (area, track) else { continue };

                let Ok(text) = text.unescape() else { continue };
                let Ok(decoded) = BASE64.decode(text.trim().as_bytes()) else { continue };
                if decoded.is_empty() {
                    continue;
                }

                // Track numbers are 1-based; ignore entries for unknown tracks.
                if track >= 1 && track <= caches[area].len() {
                    caches[area][track - 1] = Id3Entry {
                        data: decoded,
                        valid: true,
                        dirty: false,
                        from_xml: true,
                    };
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"Area" => area = None,
                b"Track" => track = None,
                b"Id3" => in_id3 = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                debug!("sidecar: skipping malformed sidecar {:?}: {}", path, err);
                return;
            }
            _ => {}
        }
    }
}

/// Write the sidecar, or remove it when no entry qualifies. Successfully saved entries become
/// clean (`dirty = false, from_xml = true`).
pub(crate) fn save(iso_path: &Path, caches: &mut [Vec<Id3Entry>; 2]) -> Result<()> {
    let path = sidecar_path(iso_path);

    let has_data = caches.iter().flatten().any(|e| e.should_persist());
    if !has_data {
        // Nothing to save: a stale sidecar must not resurrect old overlays.
        let _ = fs::remove_file(&path);
        return Ok(());
    }

    let basename = iso_path.file_name().map(|n| n.to_string_lossy().into_owned());

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let xml_failed = |_| Error::FormatError("sidecar: xml serialization failed");

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_failed)?;

    let mut root = BytesStart::new("SacdId3Overlay");
    root.push_attribute(("version", "1.0"));
    if let Some(basename) = &basename {
        root.push_attribute(("iso", basename.as_str()));
    }
    writer.write_event(Event::Start(root)).map_err(xml_failed)?;

    for (area, cache) in caches.iter().enumerate() {
        if !cache.iter().any(|e| e.should_persist()) {
            continue;
        }

        let mut area_start = BytesStart::new("Area");
        area_start.push_attribute(("type", AREA_NAMES[area]));
        writer.write_event(Event::Start(area_start)).map_err(xml_failed)?;

        for (idx, entry) in cache.iter().enumerate() {
            if !entry.should_persist() {
                continue;
            }

            let number = (idx + 1).to_string();
            let mut track_start = BytesStart::new("Track");
            track_start.push_attribute(("number", number.as_str()));
            writer.write_event(Event::Start(track_start)).map_err(xml_failed)?;

            writer.write_event(Event::Start(BytesStart::new("Id3"))).map_err(xml_failed)?;
            let encoded = BASE64.encode(&entry.data);
            writer.write_event(Event::Text(BytesText::new(&encoded))).map_err(xml_failed)?;
            writer.write_event(Event::End(BytesEnd::new("Id3"))).map_err(xml_failed)?;

            writer.write_event(Event::End(BytesEnd::new("Track"))).map_err(xml_failed)?;
        }

        writer.write_event(Event::End(BytesEnd::new("Area"))).map_err(xml_failed)?;
    }

    writer.write_event(Event::End(BytesEnd::new("SacdId3Overlay"))).map_err(xml_failed)?;

    fs::write(&path, writer.into_inner())?;

    for entry in caches.iter_mut().flatten() {
        if entry.should_persist() {
            entry.dirty = false;
            entry.from_xml = true;
        }
    }

    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data: &[u8], dirty: bool, from_xml: bool) -> Id3Entry {
        Id3Entry { data: data.to_vec(), valid: true, dirty, from_xml }
    }

    fn empty_caches(stereo: usize, multi: usize) -> [Vec<Id3Entry>; 2] {
        [
            (0..stereo).map(|_| Id3Entry::default()).collect(),
            (0..multi).map(|_| Id3Entry::default()).collect(),
        ]
    }

    #[test]
    fn verify_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("album.iso");
        fs::write(&iso, b"image").unwrap();

        let mut caches = empty_caches(3, 2);
        caches[0][0] = entry(b"ID3\x04\x00stereo-one", true, false);
        caches[0][2] = entry(b"ID3\x04\x00stereo-three", true, false);
        caches[1][1] = entry(b"ID3\x04\x00multi-two", true, false);

        save(&iso, &mut caches).unwrap();
        assert!(sidecar_path(&iso).is_file());

        // Saved entries are clean afterwards.
        assert!(!caches[0][0].dirty);
        assert!(caches[0][0].from_xml);

        let mut loaded = empty_caches(3, 2);
        load(&iso, &mut loaded);

        assert_eq!(loaded[0][0].data, b"ID3\x04\x00stereo-one");
        assert!(loaded[0][0].valid && !loaded[0][0].dirty && loaded[0][0].from_xml);
        assert!(!loaded[0][1].valid);
        assert_eq!(loaded[0][2].data, b"ID3\x04\x00stereo-three");
        assert_eq!(loaded[1][1].data, b"ID3\x04\x00multi-two");
    }

    #[test]
    fn verify_clean_unloaded_entries_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("album.iso");

        let mut caches = empty_caches(2, 0);
        // Valid but neither dirty nor from the sidecar: a tag freshly rendered from disc
        // metadata. It must not be persisted.
        caches[0][0] = entry(b"rendered", false, false);

        save(&iso, &mut caches).unwrap();
        assert!(!sidecar_path(&iso).exists());
    }

    #[test]
    fn verify_empty_save_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("album.iso");

        let mut caches = empty_caches(2, 0);
        caches[0][1] = entry(b"tag", true, false);
        save(&iso, &mut caches).unwrap();
        assert!(sidecar_path(&iso).exists());

        // Clearing the overlay and saving again deletes the file.
        caches[0][1] = Id3Entry { valid: false, dirty: true, ..Id3Entry::default() };
        save(&iso, &mut caches).unwrap();
        assert!(!sidecar_path(&iso).exists());
    }

    #[test]
    fn verify_malformed_sidecar_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("album.iso");
        fs::write(sidecar_path(&iso), b"<SacdId3Overlay><Area ty").unwrap();

        let mut caches = empty_caches(2, 0);
        load(&iso, &mut caches);
        assert!(caches.iter().flatten().all(|e| !e.valid));
    }

    #[test]
    fn verify_out_of_range_tracks_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("album.iso");

        let mut caches = empty_caches(5, 0);
        caches[0][4] = entry(b"five", true, false);
        save(&iso, &mut caches).unwrap();

        // A disc with fewer tracks ignores the out-of-range entry.
        let mut loaded = empty_caches(2, 0);
        load(&iso, &mut loaded);
        assert!(loaded[0].iter().all(|e| !e.valid));
    }
}
