/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Ambient configuration threaded through store/compactor/indexer/ingest entry points,
//! replacing the source's process-wide preference cache with an explicit struct.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// What to do with an arriving message whose `Message-ID` already exists in the folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMessagePolicy {
    /// Publish the header as usual (source default).
    #[default]
    Keep,
    /// `discardNewMessage` the incoming copy.
    Discard,
    /// Move the incoming copy to the account's Trash folder.
    MoveToTrash,
    /// Publish it but mark it read.
    MarkRead,
}

/// Configuration for the local store and index subsystem. Threaded explicitly through
/// `Store`, `FolderCompactor`, `StoreIndexer` and the ingest sink rather than read from
/// process-wide globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Header names (RFC 5322 token characters only, per the spec's Open Question
    /// decision) whose values are captured into `MsgHdr.properties`.
    pub custom_db_headers: Vec<String>,
    /// Seconds of slack allowed between a folder's cached `folderSize`/`folderDate` and
    /// the on-disk file's actual size/mtime before the summary is declared stale.
    pub time_stamp_leeway_secs: i64,
    /// Wrap new-message output streams in `QuarantinedOutputStream` before they reach
    /// the live store.
    pub quarantine_enabled: bool,
    /// Enforce the 4 GiB - 4 MiB mbox size ceiling in `hasSpaceAvailable`.
    pub mbox_size_cap_enabled: bool,
    /// Policy applied to an ingested message whose `messageId` already exists.
    pub duplicate_message_policy: DuplicateMessagePolicy,
    /// Minimum bytes to buffer from the start of a message before attempting the
    /// compactor's header-patch sniff (spec: "buffer >= ~16 KiB").
    pub compactor_sniff_window: usize,
    /// Bound on a single header-block line before it's soaked up and discarded as far
    /// as the header parser is concerned (still counted in `messageSize`).
    pub max_header_line_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            custom_db_headers: Vec::new(),
            time_stamp_leeway_secs: 60,
            quarantine_enabled: false,
            mbox_size_cap_enabled: false,
            duplicate_message_policy: DuplicateMessagePolicy::default(),
            compactor_sniff_window: 16 * 1024,
            max_header_line_len: crate::header_state::STUPIDLY_LONG_LINE_THRESHOLD,
        }
    }
}

/// mbox size ceiling enforced when `mbox_size_cap_enabled` is set: 4 GiB - 4 MiB.
pub const MBOX_SIZE_CAP_BYTES: u64 = 4 * 1024 * 1024 * 1024 - 4 * 1024 * 1024;

/// Whether quarantine's one-shot availability probe has already run and failed; flipped
/// by callers that detect no virus scanner is installed, so repeated ingest batches
/// don't re-probe. Process-wide by nature (it reflects host OS capability, not folder
/// state), so it stays a flag rather than threaded config.
static QUARANTINE_UNAVAILABLE: AtomicBool = AtomicBool::new(false);

pub fn mark_quarantine_unavailable() {
    QUARANTINE_UNAVAILABLE.store(true, Ordering::SeqCst);
}

pub fn quarantine_unavailable() -> bool {
    QUARANTINE_UNAVAILABLE.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_leeway() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.time_stamp_leeway_secs, 60);
        assert!(!cfg.quarantine_enabled);
    }

    #[test]
    fn duplicate_policy_serializes_snake_case() {
        let json = serde_json::to_string(&DuplicateMessagePolicy::MoveToTrash).unwrap();
        assert_eq!(json, "\"move_to_trash\"");
    }

    #[test]
    fn quarantine_unavailable_flag_is_process_wide() {
        mark_quarantine_unavailable();
        assert!(quarantine_unavailable());
    }
}
