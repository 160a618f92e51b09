/*
 * compactor.rs
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

//! Folder compaction (§4.7): reclaims the space held by expunged messages by driving a
//! backend's `Store::begin_compaction`/`commit_compaction`/`finalize_compaction` and
//! renumbering the survivors' `storeToken`s in the folder's index in between.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::folder::Folder;
use crate::store::{CompactionOutcome, Store};
use std::path::Path;
use tracing::{debug, info, warn};

/// Progress hooks a caller (e.g. a UI layer) can observe a compaction pass through.
pub trait CompactionListener {
    fn on_compaction_begin(&mut self, _folder: &Path) {}
    fn on_retention_query(&mut self, _store_token: &str, _keep: bool) {}
    fn on_message_retained(&mut self, _old_token: &str, _new_token: &str) {}
    fn on_compaction_complete(&mut self, _outcome: &CompactionOutcome) {}
}

#[derive(Default)]
pub struct NullCompactionListener;
impl CompactionListener for NullCompactionListener {}

/// Drives one backend's compaction primitives against a folder's index.
pub struct FolderCompactor<'s, S: Store> {
    store: &'s S,
}

impl<'s, S: Store> FolderCompactor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Compact `folder` if it has any expunged bytes to reclaim; a no-op (not an
    /// error) otherwise. Acquires the folder's semaphore for the duration.
    pub fn compact(
        &self,
        folder: &mut Folder,
        config: &StoreConfig,
        listener: &mut dyn CompactionListener,
    ) -> Result<CompactionOutcome, StoreError> {
        folder.semaphore.acquire("compactor")?;
        let outcome = self.compact_locked(folder, config, listener);
        folder.semaphore.release();
        outcome
    }

    fn compact_locked(
        &self,
        folder: &mut Folder,
        config: &StoreConfig,
        listener: &mut dyn CompactionListener,
    ) -> Result<CompactionOutcome, StoreError> {
        if folder.database.expunged_bytes == 0 && folder.database.iter().all(|h| !h.is_expunged()) {
            debug!(folder = %folder.path.display(), "nothing to compact");
            return Ok(CompactionOutcome {
                original_size: 0,
                final_size: 0,
                retained: Vec::new(),
            });
        }

        info!(folder = %folder.path.display(), expunged_bytes = folder.database.expunged_bytes, "compaction begin");
        listener.on_compaction_begin(&folder.path);

        let db = &folder.database;
        let mut dropped_tokens: Vec<String> = Vec::new();
        let staged = {
            let mut retain = |token: &str| {
                let decision = db
                    .iter()
                    .find(|h| h.store_token == token)
                    .filter(|h| !h.is_expunged())
                    .map(|h| (h.flags, h.keywords.split_whitespace().map(String::from).collect()));
                listener.on_retention_query(token, decision.is_some());
                if decision.is_none() {
                    dropped_tokens.push(token.to_string());
                }
                decision
            };
            self.store.begin_compaction(&folder.path, config, &mut retain)?
        };

        // Phase 2: make the rewrite live. Once this returns, the on-disk store already
        // reflects the compaction; only the backend's pre-compaction backup and our own
        // database are left to reconcile.
        let outcome = self.store.commit_compaction(&folder.path, staged)?;

        for token in &dropped_tokens {
            if let Some(key) = folder.database.iter().find(|h| &h.store_token == token).map(|h| h.msg_key) {
                folder.database.remove(key);
            }
        }
        for retained in &outcome.retained {
            if let Some(hdr) = folder.database.iter_mut().find(|h| h.store_token == retained.old_token) {
                hdr.store_token = retained.new_token.clone();
                hdr.message_offset = retained.new_token.parse().unwrap_or(0);
                listener.on_message_retained(&retained.old_token, &retained.new_token);
            }
        }
        folder.database.expunged_bytes = 0;
        self.store.set_summary_file_valid(&folder.path, &mut folder.database, true)?;

        // Phase 3: our database commit above is what makes the pre-compaction backup
        // disposable. A crash before this point still has the backup on disk to recover
        // from; a failure here is logged but doesn't undo an already-committed compaction.
        if let Err(e) = self.store.finalize_compaction(&folder.path) {
            warn!(folder = %folder.path.display(), error = %e, "compaction backup cleanup failed");
        }

        info!(
            folder = %folder.path.display(),
            original_size = outcome.original_size,
            final_size = outcome.final_size,
            retained = outcome.retained.len(),
            "compaction complete"
        );
        listener.on_compaction_complete(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localstorage::mbox::MboxStore;
    use crate::msghdr::Flags;
    use tempfile::tempdir;

    fn deliver(
        store: &MboxStore,
        path: &std::path::Path,
        db: &mut crate::database::Database,
        config: &StoreConfig,
        body: &[u8],
    ) -> crate::msghdr::MsgHdr {
        let (hdr, mut pending) = store.get_new_msg_output_stream(path, db, config).unwrap();
        store.write_new_message(&mut pending, body).unwrap();
        let hdr = store.finish_new_message(path, hdr, pending).unwrap();
        db.insert(hdr.clone());
        hdr
    }

    #[test]
    fn compact_drops_expunged_and_renumbers_survivor() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();

        let keep = deliver(&store, &folder.path, &mut folder.database, &config, b"Subject: keep\r\n\r\nbody\r\n");
        let drop = deliver(&store, &folder.path, &mut folder.database, &config, b"Subject: drop\r\n\r\nbody\r\n");

        {
            let hdr = folder.database.get_mut(drop.msg_key).unwrap();
            hdr.flags.set(Flags::EXPUNGED, true);
        }
        folder.database.expunged_bytes = 1;

        let compactor = FolderCompactor::new(&store);
        let mut listener = NullCompactionListener;
        let outcome = compactor.compact(&mut folder, &config, &mut listener).unwrap();

        assert_eq!(outcome.retained.len(), 1);
        assert!(folder.database.get(drop.msg_key).is_none());
        let kept = folder.database.get(keep.msg_key).unwrap();
        assert_eq!(kept.store_token, "0");
        assert_eq!(folder.database.expunged_bytes, 0);
    }
}
