// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the virtual filesystem over simulated discs.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use cadenza_core::errors::{format_error, Error, Result};
use cadenza_core::sacd::{Area, FrameFormat, SacdReader};
use cadenza_core::tpool::ThreadPool;
use cadenza_vfs::sim::{SimArea, SimDisc, SimDstFactory, SimOpener, SimTagRenderer};
use cadenza_vfs::{SacdVfs, TagRenderer, VfsEntryType, VfsFile};

/// A renderer that never produces a tag, for files whose metadata region must be empty.
struct NullTagRenderer;

impl TagRenderer for NullTagRenderer {
    fn render(&self, _reader: &mut dyn SacdReader, _track: u8) -> Result<Vec<u8>> {
        format_error("no tag available")
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    iso: PathBuf,
}

fn write_disc(disc: &SimDisc) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let iso = dir.path().join("disc.iso");
    disc.write_image(&iso).unwrap();
    Fixture { _dir: dir, iso }
}

fn open_vfs(fixture: &Fixture, tags: bool) -> SacdVfs {
    let renderer: Arc<dyn TagRenderer> = if tags {
        Arc::new(SimTagRenderer)
    } else {
        Arc::new(NullTagRenderer)
    };
    SacdVfs::open(Arc::new(SimOpener), Some(Arc::new(SimDstFactory)), renderer, &fixture.iso)
        .unwrap()
}

fn read_all(file: &mut VfsFile) -> Vec<u8> {
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(Error::EndOfFile) => break,
            Err(err) => panic!("read failed: {}", err),
        }
    }
    out
}

fn stereo_dsd_disc() -> SimDisc {
    SimDisc::new(11)
        .with_album("Album")
        .with_stereo(SimArea::new(2, FrameFormat::Dsd).with_titled_track(75, "One"))
}

fn stereo_dst_disc() -> SimDisc {
    SimDisc::new(11)
        .with_album("Album")
        .with_stereo(SimArea::new(2, FrameFormat::Dst).with_titled_track(75, "One"))
}

#[test]
fn verify_one_second_stereo_layout() {
    let fixture = write_disc(&stereo_dsd_disc());
    let vfs = open_vfs(&fixture, false);

    let mut file = vfs.open_file("/Album/Stereo/01. One.dsf").unwrap();
    let info = *file.info();

    assert_eq!(info.header_size, 92);
    assert_eq!(info.audio_data_size, 712_704);
    assert_eq!(info.metadata_offset, 712_796);
    assert_eq!(info.metadata_size, 0);
    assert_eq!(info.total_size, 712_796);
    assert_eq!(info.channel_count, 2);
    assert_eq!(info.sample_count, 75 * 4704 * 8);
    assert!((info.duration_seconds - 1.0).abs() < 1e-9);

    // The header region is byte-exact.
    let mut head = [0u8; 28];
    file.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(file.read(&mut head).unwrap(), 28);
    assert_eq!(&head[..4], b"DSD ");
    assert_eq!(u64::from_le_bytes(head[20..28].try_into().unwrap()), 712_796);
}

#[test]
fn verify_two_second_multichannel_layout() {
    let disc = SimDisc::new(3)
        .with_album("Album")
        .with_multichannel(SimArea::new(6, FrameFormat::Dsd).with_track(150));
    let fixture = write_disc(&disc);
    let vfs = open_vfs(&fixture, false);

    let file = vfs.open_file("/Album/Multi-channel/01. Track 01.dsf").unwrap();
    let info = file.info();

    assert_eq!(info.audio_data_size, 4_251_648);
    assert_eq!(info.metadata_offset, 4_251_740);
    assert_eq!(info.total_size, 4_251_740);
}

#[test]
fn verify_st_and_mt_decodes_are_identical() {
    // The DSD and DST discs share a seed: their raw frames are identical, so a correct DST
    // decode must reproduce the DSD output exactly.
    let dsd = write_disc(&stereo_dsd_disc());
    let dst = write_disc(&stereo_dst_disc());

    let path = "/Album/Stereo/01. One.dsf";

    let vfs_dsd = open_vfs(&dsd, false);
    let reference = read_all(&mut vfs_dsd.open_file(path).unwrap());
    assert_eq!(reference.len(), 712_796);

    let vfs_dst = open_vfs(&dst, false);
    let single = read_all(&mut vfs_dst.open_file(path).unwrap());
    assert_eq!(single, reference);

    for workers in [1, 8] {
        let pool = Arc::new(ThreadPool::new(workers).unwrap());
        let mut file = vfs_dst.open_file_mt(path, Some(&pool)).unwrap();
        let multi = read_all(&mut file);
        assert_eq!(multi, reference, "mt decode with {} workers diverged", workers);
    }
}

#[test]
fn verify_repeated_reads_are_identical() {
    let fixture = write_disc(&stereo_dst_disc());
    let vfs = open_vfs(&fixture, true);
    let pool = Arc::new(ThreadPool::new(4).unwrap());

    let mut file = vfs.open_file_mt("/Album/Stereo/01. One.dsf", Some(&pool)).unwrap();
    let first = read_all(&mut file);
    let second = read_all(&mut file);
    assert_eq!(first, second);
}

#[test]
fn verify_seek_read_equivalence() {
    let fixture = write_disc(&stereo_dst_disc());
    let vfs = open_vfs(&fixture, true);
    let pool = Arc::new(ThreadPool::new(4).unwrap());
    let path = "/Album/Stereo/01. One.dsf";

    let reference = read_all(&mut vfs.open_file(path).unwrap());
    let total = reference.len() as u64;

    let offsets = [
        0u64,
        1,
        91,
        92,
        93,
        4096,
        92 + 4096 * 2 + 17,
        total / 2,
        total - 4096,
        total - 10,
        total - 1,
    ];

    for mt in [false, true] {
        let mut file = if mt {
            vfs.open_file_mt(path, Some(&pool)).unwrap()
        } else {
            vfs.open_file(path).unwrap()
        };

        for &offset in &offsets {
            file.seek(SeekFrom::Start(offset)).unwrap();
            let mut buf = vec![0u8; 257];
            let n = file.read(&mut buf).unwrap();

            let expect_len = 257usize.min((total - offset) as usize);
            assert_eq!(n, expect_len, "short read at offset {} (mt={})", offset, mt);
            assert_eq!(
                &buf[..n],
                &reference[offset as usize..offset as usize + n],
                "bytes diverge at offset {} (mt={})",
                offset,
                mt
            );
        }
    }
}

#[test]
fn verify_sequential_read_matches_direct_seek() {
    let fixture = write_disc(&stereo_dsd_disc());
    let vfs = open_vfs(&fixture, false);
    let path = "/Album/Stereo/01. One.dsf";

    let p1 = 10_000u64;
    let p2 = 300_000u64;

    // Direct: seek straight to p2.
    let mut direct = vfs.open_file(path).unwrap();
    direct.seek(SeekFrom::Start(p2)).unwrap();
    let mut byte_direct = [0u8; 1];
    assert_eq!(direct.read(&mut byte_direct).unwrap(), 1);

    // Sequential: seek to p1 and read through to p2.
    let mut seq = vfs.open_file(path).unwrap();
    seq.seek(SeekFrom::Start(p1)).unwrap();
    let mut remaining = (p2 - p1) as usize;
    let mut sink = vec![0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(sink.len());
        let n = seq.read(&mut sink[..want]).unwrap();
        assert!(n > 0);
        remaining -= n;
    }
    let mut byte_seq = [0u8; 1];
    assert_eq!(seq.read(&mut byte_seq).unwrap(), 1);

    assert_eq!(byte_direct, byte_seq);
}

#[test]
fn verify_tail_read_returns_short_count() {
    let fixture = write_disc(&stereo_dsd_disc());
    let vfs = open_vfs(&fixture, false);
    let path = "/Album/Stereo/01. One.dsf";

    let reference = read_all(&mut vfs.open_file(path).unwrap());
    let total = reference.len() as u64;

    let mut file = vfs.open_file(path).unwrap();
    file.seek(SeekFrom::Start(total - 10)).unwrap();

    let mut buf = [0u8; 100];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf[..10], &reference[reference.len() - 10..]);

    // The next read is a clean end-of-file.
    assert!(matches!(file.read(&mut buf), Err(Error::EndOfFile)));
}

#[test]
fn verify_seek_to_current_position_is_stable() {
    let fixture = write_disc(&stereo_dst_disc());
    let vfs = open_vfs(&fixture, false);
    let pool = Arc::new(ThreadPool::new(2).unwrap());
    let path = "/Album/Stereo/01. One.dsf";

    let reference = read_all(&mut vfs.open_file(path).unwrap());

    // Seek to the current position before every read, as filesystem front-ends do.
    let mut file = vfs.open_file_mt(path, Some(&pool)).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; 4000];
    let mut position = 0u64;
    loop {
        file.seek(SeekFrom::Start(position)).unwrap();
        match file.read(&mut buf) {
            Ok(0) | Err(Error::EndOfFile) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                position += n as u64;
            }
            Err(err) => panic!("read failed: {}", err),
        }
    }

    assert_eq!(out, reference);
}

#[test]
fn verify_metadata_region_serves_tag() {
    let fixture = write_disc(&stereo_dsd_disc());
    let vfs = open_vfs(&fixture, true);

    let tag = vfs.get_id3_tag(Area::Stereo, 1).unwrap();
    assert!(!tag.is_empty());

    let mut file = vfs.open_file("/Album/Stereo/01. One.dsf").unwrap();
    let info = *file.info();
    assert_eq!(info.metadata_size, tag.len() as u64);
    assert_eq!(info.total_size, info.metadata_offset + tag.len() as u64);

    file.seek(SeekFrom::Start(info.metadata_offset)).unwrap();
    let mut out = vec![0u8; tag.len()];
    assert_eq!(file.read(&mut out).unwrap(), tag.len());
    assert_eq!(out, tag);
}

#[test]
fn verify_id3_overlay_round_trip() {
    let fixture = write_disc(&stereo_dsd_disc());

    let tag: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x0ctest-payload";
    {
        let vfs = open_vfs(&fixture, true);
        vfs.set_id3_overlay(Area::Stereo, 1, tag).unwrap();
        assert!(vfs.has_unsaved_id3_changes());
        vfs.save_id3_overlay().unwrap();
        assert!(!vfs.has_unsaved_id3_changes());
    }

    // A fresh context sees the overlay, and serves it through the metadata region.
    let vfs = open_vfs(&fixture, true);
    assert_eq!(vfs.get_id3_tag(Area::Stereo, 1).unwrap(), tag);

    let mut file = vfs.open_file("/Album/Stereo/01. One.dsf").unwrap();
    let info = *file.info();
    assert_eq!(info.metadata_size, tag.len() as u64);
    file.seek(SeekFrom::Start(info.metadata_offset)).unwrap();
    let mut out = vec![0u8; tag.len()];
    file.read(&mut out).unwrap();
    assert_eq!(out, tag);
}

#[test]
fn verify_clearing_overlay_removes_sidecar() {
    let fixture = write_disc(&stereo_dsd_disc());
    let sidecar = PathBuf::from(format!("{}.xml", fixture.iso.display()));

    let vfs = open_vfs(&fixture, true);
    vfs.set_id3_overlay(Area::Stereo, 1, b"ID3\x04\x00\x00overlay").unwrap();
    vfs.save_id3_overlay().unwrap();
    assert!(sidecar.is_file());

    vfs.clear_id3_overlay(Area::Stereo, 1).unwrap();
    vfs.save_id3_overlay().unwrap();
    assert!(!sidecar.exists());
}

#[test]
fn verify_readdir_tree() {
    let disc = SimDisc::new(5)
        .with_album("My Album")
        .with_stereo(
            SimArea::new(2, FrameFormat::Dsd)
                .with_titled_track(75, "First")
                .with_titled_track(38, "Second / Reprise"),
        )
        .with_multichannel(SimArea::new(6, FrameFormat::Dsd).with_track(75));
    let fixture = write_disc(&disc);
    let vfs = open_vfs(&fixture, false);

    let mut roots = Vec::new();
    vfs.readdir("/", |e| {
        roots.push((e.name.clone(), e.entry_type));
        true
    })
    .unwrap();
    assert_eq!(roots, vec![("My Album".to_string(), VfsEntryType::Directory)]);

    let mut areas = Vec::new();
    vfs.readdir("/My Album", |e| {
        areas.push(e.name.clone());
        true
    })
    .unwrap();
    assert_eq!(areas, vec!["Stereo".to_string(), "Multi-channel".to_string()]);

    let mut tracks = Vec::new();
    vfs.readdir("/My Album/Stereo", |e| {
        tracks.push((e.name.clone(), e.size, e.track));
        true
    })
    .unwrap();

    // Titles are sanitized into the filenames.
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].0, "01. First.dsf");
    assert_eq!(tracks[1].0, "02. Second _ Reprise.dsf");
    assert_eq!(tracks[0].2, Some(1));
    assert!(tracks[0].1 > 0);

    // stat agrees with readdir.
    let entry = vfs.stat("/My Album/Stereo/01. First.dsf").unwrap();
    assert_eq!(entry.entry_type, VfsEntryType::File);
    assert_eq!(entry.size, tracks[0].1);
    assert_eq!(entry.area, Some(Area::Stereo));
}

#[test]
fn verify_area_visibility_and_single_area_fallback() {
    // Two areas: hiding one removes it.
    let fixture = write_disc(
        &SimDisc::new(5)
            .with_album("A")
            .with_stereo(SimArea::new(2, FrameFormat::Dsd).with_track(10))
            .with_multichannel(SimArea::new(6, FrameFormat::Dsd).with_track(10)),
    );
    let vfs = open_vfs(&fixture, false);
    vfs.set_area_visibility(Area::Stereo, false);

    assert!(!vfs.should_show_area(Area::Stereo));
    assert!(vfs.should_show_area(Area::Multichannel));
    assert!(vfs.open_file("/A/Stereo/01. Track 01.dsf").is_err());

    // Single area: shown even when hidden.
    let fixture = write_disc(
        &SimDisc::new(5)
            .with_album("A")
            .with_stereo(SimArea::new(2, FrameFormat::Dsd).with_track(10)),
    );
    let vfs = open_vfs(&fixture, false);
    vfs.set_area_visibility(Area::Stereo, false);
    assert!(vfs.should_show_area(Area::Stereo));
    assert!(vfs.open_file("/A/Stereo/01. Track 01.dsf").is_ok());
}

#[test]
fn verify_second_track_starts_at_its_index() {
    let disc = SimDisc::new(21).with_album("A").with_stereo(
        SimArea::new(2, FrameFormat::Dsd).with_track(75).with_track(75),
    );
    let fixture = write_disc(&disc);
    let vfs = open_vfs(&fixture, false);

    let one = read_all(&mut vfs.open_file("/A/Stereo/01. Track 01.dsf").unwrap());
    let two = read_all(&mut vfs.open_file("/A/Stereo/02. Track 02.dsf").unwrap());

    assert_eq!(one.len(), two.len());
    // Same layout, different frames.
    assert_eq!(&one[..92], &two[..92]);
    assert_ne!(&one[92..], &two[92..]);
}

#[test]
fn verify_unknown_paths_are_not_found() {
    let fixture = write_disc(&stereo_dsd_disc());
    let vfs = open_vfs(&fixture, false);

    assert!(matches!(vfs.open_file("/Album/Stereo/99. Nope.dsf"), Err(Error::NotFound)));
    assert!(matches!(vfs.open_file("/Album/Nowhere/01. One.dsf"), Err(Error::NotFound)));
    assert!(matches!(vfs.open_file("/Album/Stereo/readme.txt"), Err(Error::NotFound)));
    assert!(matches!(vfs.stat("/Other Album"), Err(Error::NotFound)));
}

#[test]
fn verify_mt_seek_storm() {
    // Rapid alternating seeks and reads must never deadlock or deliver stale frames.
    let fixture = write_disc(&stereo_dst_disc());
    let vfs = open_vfs(&fixture, false);
    let pool = Arc::new(ThreadPool::new(4).unwrap());
    let path = "/Album/Stereo/01. One.dsf";

    let reference = read_all(&mut vfs.open_file(path).unwrap());
    let total = reference.len() as u64;

    let mut file = vfs.open_file_mt(path, Some(&pool)).unwrap();
    let mut offset = 92u64;
    for round in 0..24u64 {
        // A deterministic scatter of forward and backward seeks.
        offset = (offset + round * 37_123) % total;
        file.seek(SeekFrom::Start(offset)).unwrap();

        let mut buf = [0u8; 64];
        let n = file.read(&mut buf).unwrap();
        let expect = 64usize.min((total - offset) as usize);
        assert_eq!(n, expect);
        assert_eq!(&buf[..n], &reference[offset as usize..offset as usize + n]);
    }
}
