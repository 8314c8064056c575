// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The handful of knobs this core exposes to its embedder.
//!
//! Nothing here reopens a Non-goal: both fields only pin down bounds the
//! specification already names (the protocol-practice block-size cap, and
//! where the default [`crate::downloads::DefaultDownloads`] collaborator
//! looks for a downloads directory).

use std::path::PathBuf;

/// Protocol practice bounds `block-size` to at most this many bytes; this
/// is [`JftConfig::max_block_size`]'s default.
pub const MAX_BLOCK_SIZE: u16 = u16::MAX;

/// Configuration shared by the Session Manager and IBB Transport.
#[derive(Debug, Clone)]
pub struct JftConfig {
    /// Overrides the directory the default `Downloads` collaborator
    /// resolves files into. `None` defers to the platform default.
    pub downloads_dir: Option<PathBuf>,

    /// Largest `block-size` a negotiated transport may declare. A
    /// `session-initiate` whose transport exceeds this is rejected as
    /// unsupported, the same as an unparsable one. Defaults to
    /// [`MAX_BLOCK_SIZE`]; an embedder wary of a single IBB frame eating
    /// too much memory can lower it.
    pub max_block_size: u16,
}

impl Default for JftConfig {
    fn default() -> Self {
        JftConfig {
            downloads_dir: None,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl JftConfig {
    /// The defaults described in §3 and §6 of the specification: the
    /// largest block-size protocol practice allows, and the platform's
    /// default downloads directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific directory instead of the platform default.
    pub fn with_downloads_dir(mut self, dir: PathBuf) -> Self {
        self.downloads_dir = Some(dir);
        self
    }

    /// Reject any negotiated transport declaring a larger `block-size`.
    pub fn with_max_block_size(mut self, max_block_size: u16) -> Self {
        self.max_block_size = max_block_size;
        self
    }
}
