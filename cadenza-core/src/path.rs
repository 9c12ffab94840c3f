// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `path` module provides filesystem path helpers.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;

/// Maximum number of ` (N)` suffixes tried by [`unique_path`].
const UNIQUE_PATH_MAX_ATTEMPTS: u32 = 64;

/// Replace characters that are invalid in filenames with `_`.
///
/// Replaces `/ \ : * ? " < > |` and control characters, trims leading and trailing dots and
/// whitespace, and substitutes `"untitled"` when nothing printable remains.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        "untitled".to_string()
    }
    else {
        trimmed.to_string()
    }
}

/// Compose a path from a base directory, an optional sub-directory, a filename, and an optional
/// extension. Only the filename component is sanitized; directory components are taken as-is.
pub fn make_path(
    base: &Path,
    subdir: Option<&str>,
    filename: &str,
    extension: Option<&str>,
) -> PathBuf {
    let mut path = base.to_path_buf();

    if let Some(subdir) = subdir {
        path.push(subdir);
    }

    let mut name = sanitize_filename(filename);
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(ext);
    }
    path.push(name);

    path
}

/// Find a path under `dir` that does not exist yet, trying `name`, `name (1)`, `name (2)`, ...
/// up to 64 attempts. Returns `None` when every candidate exists.
pub fn unique_path(dir: &Path, name: &str, extension: Option<&str>) -> Option<PathBuf> {
    for attempt in 0..UNIQUE_PATH_MAX_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        }
        else {
            format!("{} ({})", name, attempt)
        };

        let path = make_path(dir, None, &candidate, extension);
        if !path_exists(&path) {
            return Some(path);
        }
    }
    None
}

/// Recursively create a directory and its missing parents.
pub fn mkdir_p(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Returns true if `path` exists.
pub fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Returns true if `path` exists and is a directory.
pub fn dir_exists(path: &Path) -> bool {
    path.metadata().map(|m| m.is_dir()).unwrap_or(false)
}

/// Returns true if `path` exists and is a regular file.
pub fn file_exists(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_sanitize_filename() {
        assert_eq!(sanitize_filename("Adagio / Allegro"), "Adagio _ Allegro");
        assert_eq!(sanitize_filename("a:b*c?d\"e<f>g|h\\i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(sanitize_filename("  .hidden.  "), "hidden");
        assert_eq!(sanitize_filename("..."), "untitled");
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
        // Multi-byte characters pass through untouched.
        assert_eq!(sanitize_filename("Études"), "Études");
    }

    #[test]
    fn verify_make_path_sanitizes_filename_only() {
        let path = make_path(Path::new("/music"), Some("out"), "a/b", Some("dsf"));
        assert_eq!(path, PathBuf::from("/music/out/a_b.dsf"));

        let path = make_path(Path::new("/music"), None, "title", None);
        assert_eq!(path, PathBuf::from("/music/title"));
    }

    #[test]
    fn verify_unique_path_skips_existing() {
        let dir = tempfile::tempdir().unwrap();

        let first = unique_path(dir.path(), "track", Some("dsf")).unwrap();
        assert_eq!(first, dir.path().join("track.dsf"));

        fs::write(&first, b"x").unwrap();
        let second = unique_path(dir.path(), "track", Some("dsf")).unwrap();
        assert_eq!(second, dir.path().join("track (1).dsf"));

        fs::write(&second, b"x").unwrap();
        let third = unique_path(dir.path(), "track", Some("dsf")).unwrap();
        assert_eq!(third, dir.path().join("track (2).dsf"));
    }

    #[test]
    fn verify_existence_probes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        assert!(path_exists(dir.path()));
        assert!(dir_exists(dir.path()));
        assert!(!file_exists(dir.path()));

        assert!(path_exists(&file));
        assert!(file_exists(&file));
        assert!(!dir_exists(&file));

        assert!(!path_exists(&dir.path().join("missing")));
    }

    #[test]
    fn verify_mkdir_p() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b").join("c");
        mkdir_p(&deep).unwrap();
        assert!(dir_exists(&deep));
        // Idempotent.
        mkdir_p(&deep).unwrap();
    }
}
