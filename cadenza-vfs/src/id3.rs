// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ID3 overlay cache types.

use cadenza_core::errors::Result;
use cadenza_core::sacd::SacdReader;

/// Renders an ID3v2.4 tag for a track from disc metadata.
///
/// Tag construction is an external concern; the VFS only caches and serves the rendered bytes.
pub trait TagRenderer: Send + Sync {
    /// Render a tag for a track (1-based) of the reader's selected area.
    fn render(&self, reader: &mut dyn SacdReader, track: u8) -> Result<Vec<u8>>;
}

/// One cached (possibly user-edited) tag.
#[derive(Default)]
pub struct Id3Entry {
    pub data: Vec<u8>,
    /// The entry holds a usable tag.
    pub valid: bool,
    /// The entry differs from what the sidecar holds.
    pub dirty: bool,
    /// The entry was loaded from the sidecar and must be preserved on save.
    pub from_xml: bool,
}

impl Id3Entry {
    /// An entry is persisted iff it is valid and either changed or originally from the sidecar.
    pub fn should_persist(&self) -> bool {
        self.valid && (self.dirty || self.from_xml)
    }
}
