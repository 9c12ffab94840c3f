// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual path handling.
//!
//! Virtual paths use `/` separators and always begin with `/`; the root is `"/"`.

use std::path::{Path, PathBuf};

use crate::config::IsoExtensions;

/// Normalize a virtual path: `\` becomes `/`, a leading `/` is ensured, and trailing
/// separators are stripped (except for the root itself).
pub(crate) fn normalize_vpath(vpath: &str) -> String {
    let mut path: String = vpath.chars().map(|c| if c == '\\' { '/' } else { c }).collect();

    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

/// Split a normalized virtual path into its parent directory and final component. The root
/// splits into `("/", "")`.
pub(crate) fn parent_and_name(vpath: &str) -> (String, String) {
    if vpath == "/" {
        return ("/".to_string(), String::new());
    }

    match vpath.rfind('/') {
        Some(0) => ("/".to_string(), vpath[1..].to_string()),
        Some(pos) => (vpath[..pos].to_string(), vpath[pos + 1..].to_string()),
        None => ("/".to_string(), vpath.to_string()),
    }
}

/// Translate a virtual path into the shadowed host path.
pub(crate) fn build_source_path(source_dir: &Path, vpath: &str) -> PathBuf {
    let mut path = source_dir.to_path_buf();
    for component in vpath.split('/').filter(|c| !c.is_empty()) {
        path.push(component);
    }
    path
}

/// Returns true if `name` carries a recognized image extension.
pub(crate) fn is_iso_name(name: &str, extensions: IsoExtensions) -> bool {
    let Some(ext) = name.rsplit('.').next().filter(|e| e.len() < name.len()) else {
        return false;
    };

    if extensions.contains(IsoExtensions::LOWER) && ext == "iso" {
        return true;
    }
    if extensions.contains(IsoExtensions::UPPER) && ext == "ISO" {
        return true;
    }
    // With both variants enabled, mixed-case extensions count too.
    extensions.contains(IsoExtensions::LOWER | IsoExtensions::UPPER)
        && ext.eq_ignore_ascii_case("iso")
}

/// Returns true if `name` is an overlay sidecar (`<image>.iso.xml`).
pub(crate) fn is_sidecar_name(name: &str) -> bool {
    name.len() > 8 && name.ends_with(".iso.xml")
}

/// Strip the image extension from a filename.
pub(crate) fn iso_base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}
