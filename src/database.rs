/*
 * database.rs
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

//! Per-folder index: the in-memory database of `MsgHdr`s plus the accounting fields
//! that mirror the on-disk store.

use crate::msghdr::MsgHdr;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// A folder's index. Not a real database engine: an ordered map keyed by the
/// monotonic `msgKey`, matching how the teacher's in-memory stores are structured.
#[derive(Debug, Default)]
pub struct Database {
    headers: BTreeMap<u64, MsgHdr>,
    next_key: u64,
    pub expunged_bytes: u64,
    pub folder_size: u64,
    pub folder_date: Option<SystemTime>,
    summary_valid: bool,
}

impl Database {
    pub fn new() -> Self {
        Self {
            next_key: 1,
            ..Default::default()
        }
    }

    pub fn summary_valid(&self) -> bool {
        self.summary_valid
    }

    pub fn set_summary_valid(&mut self, valid: bool) {
        self.summary_valid = valid;
    }

    /// Reserve the next monotonic `msgKey` without inserting a header yet.
    pub fn next_msg_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Insert a finalized header. Panics if `msg_key` was never reserved via
    /// `next_msg_key` and collides with an existing entry, which would indicate a
    /// caller bug rather than a recoverable condition.
    pub fn insert(&mut self, hdr: MsgHdr) {
        if hdr.msg_key >= self.next_key {
            self.next_key = hdr.msg_key + 1;
        }
        self.headers.insert(hdr.msg_key, hdr);
    }

    pub fn remove(&mut self, msg_key: u64) -> Option<MsgHdr> {
        self.headers.remove(&msg_key)
    }

    pub fn get(&self, msg_key: u64) -> Option<&MsgHdr> {
        self.headers.get(&msg_key)
    }

    pub fn get_mut(&mut self, msg_key: u64) -> Option<&mut MsgHdr> {
        self.headers.get_mut(&msg_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MsgHdr> {
        self.headers.values()
    }

    /// Mutable iteration, used by the compactor to renumber survivors' `storeToken`s
    /// after a compaction pass and by the indexer during carry-forward.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MsgHdr> {
        self.headers.values_mut()
    }

    /// Find a header by `messageId`, used for backup-database carry-forward during a
    /// rebuild and for duplicate-message detection during ingest.
    pub fn find_by_message_id(&self, message_id: &str) -> Option<&MsgHdr> {
        self.headers.values().find(|h| h.message_id == message_id)
    }

    pub fn num_messages(&self) -> usize {
        self.headers.values().filter(|h| !h.is_expunged()).count()
    }

    pub fn num_unread(&self) -> usize {
        self.headers.values().filter(|h| !h.is_expunged() && !h.is_read()).count()
    }

    pub fn num_new(&self) -> usize {
        self.headers
            .values()
            .filter(|h| !h.is_expunged() && h.flags.contains(crate::msghdr::Flags::NEW))
            .count()
    }

    /// Carry forward sticky per-message metadata (keywords, priority, properties) from a
    /// prior generation of this database, matched by `messageId`, as used by the indexer
    /// during a rebuild.
    pub fn carry_forward_from(&mut self, backup: &Database) {
        for hdr in self.headers.values_mut() {
            if let Some(prior) = backup.find_by_message_id(&hdr.message_id) {
                hdr.keywords = prior.keywords.clone();
                hdr.grow_keywords = prior.grow_keywords;
                for (k, v) in &prior.properties {
                    hdr.properties.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_round_trips() {
        let mut db = Database::new();
        let key = db.next_msg_key();
        let hdr = MsgHdr::new(key, "0");
        db.insert(hdr);
        assert!(db.get(key).is_some());
        assert_eq!(db.num_messages(), 1);
    }

    #[test]
    fn expunged_headers_excluded_from_counts() {
        let mut db = Database::new();
        let key = db.next_msg_key();
        let mut hdr = MsgHdr::new(key, "0");
        hdr.flags.set(crate::msghdr::Flags::EXPUNGED, true);
        db.insert(hdr);
        assert_eq!(db.num_messages(), 0);
    }

    #[test]
    fn carry_forward_preserves_keywords_by_message_id() {
        let mut backup = Database::new();
        let bkey = backup.next_msg_key();
        let mut old = MsgHdr::new(bkey, "7");
        old.message_id = "same@id".to_string();
        old.keywords = "important".to_string();
        backup.insert(old);

        let mut db = Database::new();
        let key = db.next_msg_key();
        let mut fresh = MsgHdr::new(key, "0");
        fresh.message_id = "same@id".to_string();
        db.insert(fresh);

        db.carry_forward_from(&backup);
        assert_eq!(db.get(key).unwrap().keywords, "important");
    }

    #[test]
    fn find_by_message_id_misses_return_none() {
        let db = Database::new();
        assert!(db.find_by_message_id("nope").is_none());
    }
}
