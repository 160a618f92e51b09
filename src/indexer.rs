/*
 * indexer.rs
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

//! Index rebuild (§4.8): re-derives a folder's `Database` entirely from the store's raw
//! messages, running each one through [`MessageHeaderState`]. A caller-supplied backup
//! database (e.g. a stashed copy of the prior index) carries forward keywords and
//! custom properties that aren't recoverable from the message bytes alone.

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::StoreError;
use crate::folder::Folder;
use crate::header_state::{HeaderStateConfig, MessageHeaderState};
use crate::store::Store;
use tracing::info;

/// Progress hooks for a rebuild pass.
pub trait IndexerListener {
    fn on_index_begin(&mut self, _folder_path: &std::path::Path) {}
    fn on_message_indexed(&mut self, _store_token: &str, _msg_key: u64) {}
    fn on_index_complete(&mut self, _num_messages: usize) {}
}

#[derive(Default)]
pub struct NullIndexerListener;
impl IndexerListener for NullIndexerListener {}

/// Drives a full rebuild of one folder's index from its backend store.
pub struct StoreIndexer<'s, S: Store> {
    store: &'s S,
}

impl<'s, S: Store> StoreIndexer<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Rebuild `folder`'s database by scanning the backend from scratch. `backup`, if
    /// given, is consulted to carry forward keywords and custom properties for
    /// messages matched by `Message-ID`.
    pub fn rebuild(
        &self,
        folder: &mut Folder,
        config: &StoreConfig,
        backup: Option<&Database>,
        listener: &mut dyn IndexerListener,
    ) -> Result<(), StoreError> {
        folder.semaphore.acquire("indexer")?;
        let result = self.rebuild_locked(folder, config, backup, listener);
        folder.semaphore.release();
        result
    }

    fn rebuild_locked(
        &self,
        folder: &mut Folder,
        config: &StoreConfig,
        backup: Option<&Database>,
        listener: &mut dyn IndexerListener,
    ) -> Result<(), StoreError> {
        info!(folder = %folder.path.display(), "index rebuild begin");
        listener.on_index_begin(&folder.path);

        let mut fresh = Database::new();
        let header_config = HeaderStateConfig {
            custom_db_headers: config.custom_db_headers.clone(),
            envelope_date: None,
        };

        let mut scan_error: Option<StoreError> = None;
        {
            let fresh = &mut fresh;
            let result = self.store.scan_messages(&folder.path, &mut |token, bytes| {
                let msg_key = fresh.next_msg_key();
                let mut state = MessageHeaderState::new(header_config.clone());
                state.feed(bytes);
                let size = state.message_size();
                match state.finish(msg_key, token) {
                    Some(mut hdr) => {
                        hdr.message_offset = token.parse().unwrap_or(0);
                        listener.on_message_indexed(token, msg_key);
                        fresh.insert(hdr);
                    }
                    None => {
                        fresh.expunged_bytes += size;
                    }
                }
                true
            });
            if let Err(e) = result {
                scan_error = Some(e);
            }
        }
        if let Some(e) = scan_error {
            return Err(e);
        }

        if let Some(backup) = backup {
            fresh.carry_forward_from(backup);
        }

        self.store.set_summary_file_valid(&folder.path, &mut fresh, true)?;
        let count = fresh.num_messages();
        info!(folder = %folder.path.display(), num_messages = count, expunged_bytes = fresh.expunged_bytes, "index rebuild complete");
        folder.database = fresh;
        listener.on_index_complete(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localstorage::mbox::MboxStore;
    use crate::msghdr::Flags;
    use tempfile::tempdir;

    #[test]
    fn rebuild_recovers_two_messages_from_raw_store() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();

        for body in [
            &b"Subject: one\r\n\r\nbody one\r\n"[..],
            &b"Subject: two\r\n\r\nbody two\r\n"[..],
        ] {
            let (hdr, mut pending) = store
                .get_new_msg_output_stream(&folder.path, &mut folder.database, &config)
                .unwrap();
            store.write_new_message(&mut pending, body).unwrap();
            store.finish_new_message(&folder.path, hdr, pending).unwrap();
        }
        folder.database = Database::new();

        let indexer = StoreIndexer::new(&store);
        let mut listener = NullIndexerListener;
        indexer.rebuild(&mut folder, &config, None, &mut listener).unwrap();

        assert_eq!(folder.database.num_messages(), 2);
    }

    #[test]
    fn rebuild_excludes_expunged_tombstone_and_counts_its_bytes() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();

        let (hdr, mut pending) = store
            .get_new_msg_output_stream(&folder.path, &mut folder.database, &config)
            .unwrap();
        store
            .write_new_message(&mut pending, b"X-Mozilla-Status: 0008\r\n\r\ngone\r\n")
            .unwrap();
        store.finish_new_message(&folder.path, hdr, pending).unwrap();
        folder.database = Database::new();

        let indexer = StoreIndexer::new(&store);
        let mut listener = NullIndexerListener;
        indexer.rebuild(&mut folder, &config, None, &mut listener).unwrap();

        assert_eq!(folder.database.num_messages(), 0);
        assert!(folder.database.expunged_bytes > 0);
        let _ = Flags::EXPUNGED;
    }

    #[test]
    fn rebuild_carries_forward_keywords_from_backup() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();

        let (hdr, mut pending) = store
            .get_new_msg_output_stream(&folder.path, &mut folder.database, &config)
            .unwrap();
        store
            .write_new_message(&mut pending, b"Message-ID: <same@id>\r\n\r\nbody\r\n")
            .unwrap();
        store.finish_new_message(&folder.path, hdr, pending).unwrap();
        folder.database = Database::new();

        let mut backup = Database::new();
        let bkey = backup.next_msg_key();
        let mut old = crate::msghdr::MsgHdr::new(bkey, "0");
        old.message_id = "same@id".to_string();
        old.keywords = "flagged".to_string();
        backup.insert(old);

        let indexer = StoreIndexer::new(&store);
        let mut listener = NullIndexerListener;
        indexer.rebuild(&mut folder, &config, Some(&backup), &mut listener).unwrap();

        let hdr = folder.database.iter().next().unwrap();
        assert_eq!(hdr.keywords, "flagged");
    }
}
