/*
 * mod.rs
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

//! The `Store` capability contract shared by the mbox and maildir backends (§4.6, §9).
//! Rather than the source's virtual-dispatch interface, each backend implements this
//! trait directly over its own `Pending`/`Staged` associated types; callers (the
//! compactor, indexer, and ingest sink) are generic over `S: Store`.

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::StoreError;
use crate::msghdr::{Flags, MsgHdr};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Whether a message copy/move was performed by the store itself, or must be done by
/// the caller via a stream-copy (mbox reports this; maildir handles it directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Handled,
    CallerMustStreamCopy,
}

/// One message retained by a compaction pass: its old and new `storeToken`, and its
/// on-disk size post-rewrite. Mirrors the `onMessageRetained` listener callback (§6).
#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub old_token: String,
    pub new_token: String,
    pub size: u64,
}

/// Result of compacting one folder, once committed.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub original_size: u64,
    pub final_size: u64,
    pub retained: Vec<RetainedMessage>,
}

/// A retention decision for one message under compaction, keyed by its current
/// `storeToken`: `None` drops it, `Some` keeps it with the given (possibly
/// filter-rule-updated) flags and keywords baked into the rewritten `X-Mozilla-*`
/// headers. The closure is expected to look the token up in the folder's `Database`.
pub type RetentionDecision = Option<(Flags, Vec<String>)>;

/// Abstract backend: folder-tree discovery, per-message I/O, flag/keyword in-place
/// rewrite, and the scan+compact primitives the higher-level components drive.
pub trait Store {
    /// Handle for a message mid-delivery: open but not yet committed to the store.
    type Pending;
    /// Handle for a compaction pass that has rewritten the store but not yet committed
    /// (the caller's database-commit callback runs between `begin_compaction` and
    /// `commit_compaction`, giving the crash-safe three-phase protocol of §4.7).
    type Staged;

    fn discover_sub_folders(&self, folder: &Path) -> Result<Vec<PathBuf>, StoreError>;
    fn create_folder(&self, parent: &Path, name: &str) -> Result<PathBuf, StoreError>;
    fn rename_folder(&self, folder: &Path, new_name: &str) -> Result<PathBuf, StoreError>;
    fn delete_folder(&self, folder: &Path) -> Result<(), StoreError>;
    fn copy_folder(&self, src: &Path, dst_parent: &Path, move_it: bool) -> Result<PathBuf, StoreError>;

    fn has_space_available(&self, folder: &Path, additional_bytes: u64, config: &StoreConfig) -> Result<bool, StoreError>;
    fn is_summary_file_valid(&self, folder: &Path, db: &Database, config: &StoreConfig) -> Result<bool, StoreError>;
    fn set_summary_file_valid(&self, folder: &Path, db: &mut Database, valid: bool) -> Result<(), StoreError>;

    /// Begin a new message: allocate its `storeToken` and open whatever underlying
    /// writer the backend needs, wrapped in quarantine staging when configured.
    fn get_new_msg_output_stream(
        &self,
        folder: &Path,
        db: &mut Database,
        config: &StoreConfig,
    ) -> Result<(MsgHdr, Self::Pending), StoreError>;
    fn write_new_message(&self, pending: &mut Self::Pending, data: &[u8]) -> Result<(), StoreError>;
    fn discard_new_message(&self, folder: &Path, pending: Self::Pending) -> Result<(), StoreError>;
    fn finish_new_message(&self, folder: &Path, hdr: MsgHdr, pending: Self::Pending) -> Result<MsgHdr, StoreError>;

    fn get_msg_input_stream(&self, folder: &Path, store_token: &str) -> Result<Box<dyn Read>, StoreError>;

    fn delete_messages(&self, folder: &Path, hdrs: &mut [&mut MsgHdr]) -> Result<(), StoreError>;
    fn copy_messages(&self, move_it: bool, src_folder: &Path, hdrs: &[MsgHdr], dst_folder: &Path) -> Result<CopyOutcome, StoreError>;

    fn change_flags(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], mask: Flags, set: bool) -> Result<(), StoreError>;
    fn change_keywords(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], keywords: &[String], add: bool) -> Result<(), StoreError>;

    /// Stream every message's raw bytes to `callback` as `(storeToken, bytes)`, live or
    /// not (the store has no notion of `Expunged`; that lives in the index). `callback`
    /// returns `false` to halt the scan early (a caller-visible cancellation).
    fn scan_messages(&self, folder: &Path, callback: &mut dyn FnMut(&str, &[u8]) -> bool) -> Result<(), StoreError>;

    /// Phase 1 of compaction: scan the store, ask `retain` (by current `storeToken`)
    /// whether to keep each message, and rewrite the backend into a staged, not-yet-live
    /// form. The live store is untouched until `commit_compaction` runs.
    fn begin_compaction(
        &self,
        folder: &Path,
        config: &StoreConfig,
        retain: &mut dyn FnMut(&str) -> RetentionDecision,
    ) -> Result<Self::Staged, StoreError>;

    /// Phase 2: make the staged rewrite live (the backup of the pre-compaction store,
    /// if any, is left on disk). The caller must durably commit its own database
    /// changes next and only then call `finalize_compaction` — a crash between the two
    /// leaves the backup in place for recovery, since the live store is already correct.
    fn commit_compaction(&self, folder: &Path, staged: Self::Staged) -> Result<CompactionOutcome, StoreError>;

    /// Phase 3: delete the pre-compaction backup now that the caller's database commit
    /// has durably landed. Best-effort: a failure here leaves stale backup files behind
    /// but does not affect the already-live, already-indexed store.
    fn finalize_compaction(&self, folder: &Path) -> Result<(), StoreError>;

    /// Best-effort rollback of a staged-but-uncommitted compaction.
    fn rollback_compaction(&self, folder: &Path, staged: Self::Staged) -> Result<(), StoreError>;
}
