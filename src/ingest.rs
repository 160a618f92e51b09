/*
 * ingest.rs
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

//! Ingest sink (§4.9): the per-message delivery protocol a POP/IMAP/local-delivery
//! collaborator drives to append arriving mail to a folder. Prepends the canonical
//! `X-Mozilla-*` metadata block ahead of the arriving bytes, feeds the same bytes
//! through a [`MessageHeaderState`] for indexing, and settles duplicate-message policy
//! and biff bookkeeping once a message is complete.
//!
//! The filter-rule engine itself is external (the source's search-and-act rule chain);
//! this module only exposes the hook point it runs through, via [`FilterRuleEngine`].

use crate::config::{DuplicateMessagePolicy, StoreConfig};
use crate::database::Database;
use crate::error::StoreError;
use crate::folder::Folder;
use crate::header_state::{HeaderStateConfig, MessageHeaderState};
use crate::msghdr::{Flags, MsgHdr};
use crate::store::Store;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of applying filter rules to a freshly published header.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOutcome {
    /// Whether any rule actually matched and ran (distinct from the engine merely being
    /// invoked), used to decide whether biff should still fire for this batch.
    pub ran: bool,
    /// Whether the rule chain marked the message read or moved/deleted it out of this
    /// folder, which excludes it from the "new mail" biff count.
    pub disposed: bool,
}

/// Hook point the external filter-rule engine is invoked through. A no-op default
/// (`NullFilterRuleEngine`) is used when no filtering collaborator is wired up.
pub trait FilterRuleEngine {
    fn apply(&mut self, folder_path: &Path, hdr: &mut MsgHdr) -> FilterOutcome;
}

#[derive(Default)]
pub struct NullFilterRuleEngine;
impl FilterRuleEngine for NullFilterRuleEngine {
    fn apply(&mut self, _folder_path: &Path, _hdr: &mut MsgHdr) -> FilterOutcome {
        FilterOutcome::default()
    }
}

/// What became of one `incorporateComplete` call.
#[derive(Debug, Clone)]
pub enum IncorporateOutcome {
    /// Published as a new header, after any filter-rule disposition.
    Published(MsgHdr),
    /// The arriving message carried `Expunged` in its own status header; its bytes were
    /// rolled back and counted toward `expungedBytes` instead of being published.
    DiscardedExpunged,
    /// Dropped under `DuplicateMessagePolicy::Discard`.
    DuplicateDiscarded,
}

/// A message opened via `incorporate_begin`, not yet completed or aborted. Calling any
/// other ingest method out of sequence while one of these is outstanding is a protocol
/// violation (programming error), matching the external contract's "Violation is a
/// programming error surfaced via a failure return code."
pub struct IncorporateHandle<S: Store> {
    store_hdr: MsgHdr,
    pending: S::Pending,
    header_state: MessageHeaderState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fresh,
    FolderSet,
    Delivering,
    MessageOpen,
}

/// Drives one delivery batch's worth of `incorporate*` calls against a folder, through
/// a single backend. Not `Sync`; a batch is driven by one collaborator at a time, same
/// as the rest of the single-threaded cooperative scheduling model (§5).
pub struct IngestSink<'s, S: Store> {
    store: &'s S,
    pop_server: Option<String>,
    account_key: Option<String>,
    stage: Stage,
    num_new_messages: u64,
    any_filter_ran: bool,
}

impl<'s, S: Store> IngestSink<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            pop_server: None,
            account_key: None,
            stage: Stage::Fresh,
            num_new_messages: 0,
            any_filter_ran: false,
        }
    }

    /// `setPopServer`: records which server this delivery batch came from. Informational
    /// only (not validated against anything); callers that don't deliver over POP can
    /// skip it.
    pub fn set_pop_server(&mut self, server: impl Into<String>) {
        self.pop_server = Some(server.into());
    }

    pub fn pop_server(&self) -> Option<&str> {
        self.pop_server.as_deref()
    }

    /// `setFolder`: selects the destination folder's `X-Mozilla-Account-Key` value
    /// written into each arriving message's metadata block, and opens the batch for
    /// `beginMailDelivery`.
    pub fn set_folder(&mut self, account_key: Option<impl Into<String>>) {
        self.account_key = account_key.map(Into::into);
        self.stage = Stage::FolderSet;
    }

    /// `beginMailDelivery`: starts a delivery batch, resetting the per-batch biff
    /// counters.
    pub fn begin_mail_delivery(&mut self) -> Result<(), StoreError> {
        if self.stage != Stage::FolderSet {
            return Err(StoreError::protocol("beginMailDelivery called out of sequence"));
        }
        self.stage = Stage::Delivering;
        self.num_new_messages = 0;
        self.any_filter_ran = false;
        info!(pop_server = self.pop_server.as_deref().unwrap_or(""), "mail delivery begin");
        Ok(())
    }

    /// `incorporateBegin`: allocates a new message in the store and writes the leading
    /// `X-Mozilla-*` metadata block (Account-Key, optional UIDL, Status, Status2, and an
    /// 80-space-padded Keys placeholder) ahead of the arriving bytes.
    pub fn incorporate_begin(
        &mut self,
        folder: &mut Folder,
        config: &StoreConfig,
        uidl: Option<&str>,
        initial_flags: Flags,
    ) -> Result<IncorporateHandle<S>, StoreError> {
        if self.stage != Stage::Delivering {
            return Err(StoreError::protocol("incorporateBegin called out of sequence"));
        }

        let (store_hdr, mut pending) = self
            .store
            .get_new_msg_output_stream(&folder.path, &mut folder.database, config)?;

        let on_disk = initial_flags.on_disk();
        let mut preamble = String::new();
        if let Some(account_key) = &self.account_key {
            preamble.push_str(&format!("X-Mozilla-Account-Key: {account_key}\r\n"));
        }
        if let Some(uidl) = uidl {
            preamble.push_str(&format!("X-UIDL: {uidl}\r\n"));
        }
        preamble.push_str(&format!("X-Mozilla-Status: {:04x}\r\n", on_disk.low16()));
        preamble.push_str(&format!("X-Mozilla-Status2: {:08x}\r\n", on_disk.high16()));
        preamble.push_str(&format!("X-Mozilla-Keys: {}\r\n", " ".repeat(80)));

        self.store.write_new_message(&mut pending, preamble.as_bytes())?;

        let header_config = HeaderStateConfig {
            custom_db_headers: config.custom_db_headers.clone(),
            envelope_date: None,
        };
        let mut header_state = MessageHeaderState::new(header_config);
        header_state.feed(preamble.as_bytes());

        self.stage = Stage::MessageOpen;
        Ok(IncorporateHandle {
            store_hdr,
            pending,
            header_state,
        })
    }

    /// `incorporateWrite`: streams one chunk of the arriving message's own bytes to both
    /// the store and the header-state parser.
    pub fn incorporate_write(&mut self, handle: &mut IncorporateHandle<S>, data: &[u8]) -> Result<(), StoreError> {
        if self.stage != Stage::MessageOpen {
            return Err(StoreError::protocol("incorporateWrite called out of sequence"));
        }
        self.store.write_new_message(&mut handle.pending, data)?;
        handle.header_state.feed(data);
        Ok(())
    }

    /// `incorporateAbort`: rolls back a message mid-delivery via `discardNewMessage`.
    /// Safe even though earlier messages in the same batch have already committed.
    pub fn incorporate_abort(&mut self, folder: &Folder, handle: IncorporateHandle<S>) -> Result<(), StoreError> {
        if self.stage != Stage::MessageOpen {
            return Err(StoreError::protocol("incorporateAbort called out of sequence"));
        }
        self.store.discard_new_message(&folder.path, handle.pending)?;
        self.stage = Stage::Delivering;
        Ok(())
    }

    /// `incorporateComplete`: finalizes the header state, applies duplicate-message
    /// policy (checked *before* the store write is committed, so `Discard` can still
    /// roll back via `discardNewMessage`), commits the store write, publishes the
    /// header, runs the filter-rule hook, and folds the result into this batch's biff
    /// counters.
    pub fn incorporate_complete(
        &mut self,
        folder: &mut Folder,
        config: &StoreConfig,
        handle: IncorporateHandle<S>,
        filters: &mut dyn FilterRuleEngine,
    ) -> Result<IncorporateOutcome, StoreError> {
        if self.stage != Stage::MessageOpen {
            return Err(StoreError::protocol("incorporateComplete called out of sequence"));
        }
        self.stage = Stage::Delivering;

        let IncorporateHandle {
            store_hdr,
            pending,
            header_state,
        } = handle;

        let size = header_state.message_size();
        let parsed = header_state.finish(store_hdr.msg_key, store_hdr.store_token.clone());

        let Some(mut final_hdr) = parsed else {
            warn!(folder = %folder.path.display(), "arriving message carried Expunged status, discarding");
            self.store.discard_new_message(&folder.path, pending)?;
            folder.database.expunged_bytes += size;
            return Ok(IncorporateOutcome::DiscardedExpunged);
        };
        final_hdr.message_offset = store_hdr.message_offset;

        // A pre-existing header with the same messageId is either a partial (header-only)
        // stub awaiting this very body, in which case the full message replaces it
        // outright, or a true duplicate subject to the configured policy.
        let existing = folder
            .database
            .find_by_message_id(&final_hdr.message_id)
            .map(|h| (h.msg_key, h.flags));

        let mut policy_discard = false;
        match existing {
            Some((old_key, flags)) if flags.contains(Flags::PARTIAL) => {
                folder.database.remove(old_key);
                debug!(
                    message_id = %final_hdr.message_id,
                    old_msg_key = old_key,
                    "replacing partial header with full message"
                );
            }
            Some(_) => match config.duplicate_message_policy {
                DuplicateMessagePolicy::Discard => policy_discard = true,
                DuplicateMessagePolicy::Keep => {}
                DuplicateMessagePolicy::MarkRead => final_hdr.flags.set(Flags::READ, true),
                // The actual cross-folder move is a caller-level concern (it needs a
                // destination Trash folder this sink has no handle to); publish as
                // usual here and let the caller relocate it afterward.
                DuplicateMessagePolicy::MoveToTrash => {}
            },
            None => {}
        }

        if policy_discard {
            debug!(message_id = %final_hdr.message_id, "duplicate message discarded per policy");
            self.store.discard_new_message(&folder.path, pending)?;
            return Ok(IncorporateOutcome::DuplicateDiscarded);
        }

        let committed = self.store.finish_new_message(&folder.path, store_hdr, pending)?;
        final_hdr.store_token = committed.store_token;
        if committed.message_size > 0 {
            final_hdr.message_size = committed.message_size;
        }

        folder.database.insert(final_hdr.clone());

        let mut disposed = false;
        if let Some(inserted) = folder.database.get_mut(final_hdr.msg_key) {
            let outcome = filters.apply(&folder.path, inserted);
            if outcome.ran {
                self.any_filter_ran = true;
            }
            disposed = outcome.disposed;
            final_hdr = inserted.clone();
        }

        if !disposed {
            self.num_new_messages += 1;
        }

        Ok(IncorporateOutcome::Published(final_hdr))
    }

    /// `endMailDelivery`: closes the batch. If any message landed as new mail and no
    /// filter rule ran to dispose of it, raises the folder's biff state.
    pub fn end_mail_delivery(&mut self, folder: &mut Folder) -> Result<(), StoreError> {
        if self.stage != Stage::Delivering {
            return Err(StoreError::protocol("endMailDelivery called out of sequence"));
        }
        if self.num_new_messages > 0 && !self.any_filter_ran {
            folder.biff_new_mail = true;
        }
        info!(
            folder = %folder.path.display(),
            num_new_messages = self.num_new_messages,
            biff = folder.biff_new_mail,
            "mail delivery end"
        );
        self.stage = Stage::Fresh;
        Ok(())
    }

    pub fn num_new_messages(&self) -> u64 {
        self.num_new_messages
    }
}

/// Look up a folder's prior database (e.g. loaded from a persisted summary) purely to
/// hand to `IngestSink`'s duplicate check outside the active `Folder`; unused by the
/// sink itself, which consults `folder.database` directly, but kept for callers that
/// stage a batch against a detached copy before committing it.
pub fn duplicate_exists(db: &Database, message_id: &str) -> bool {
    db.find_by_message_id(message_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localstorage::mbox::MboxStore;
    use tempfile::tempdir;

    fn open_batch(sink: &mut IngestSink<MboxStore>, account_key: Option<&str>) {
        sink.set_pop_server("pop.example.com");
        sink.set_folder(account_key);
        sink.begin_mail_delivery().unwrap();
    }

    #[test]
    fn incorporate_complete_publishes_with_metadata_block() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();
        let mut sink = IngestSink::new(&store);
        let mut filters = NullFilterRuleEngine;

        open_batch(&mut sink, Some("account1"));
        let mut handle = sink.incorporate_begin(&mut folder, &config, Some("uidl-1"), Flags::default()).unwrap();
        sink.incorporate_write(&mut handle, b"Subject: hi\r\nFrom: a@b\r\n\r\nbody\r\n").unwrap();
        let outcome = sink.incorporate_complete(&mut folder, &config, handle, &mut filters).unwrap();

        match outcome {
            IncorporateOutcome::Published(hdr) => {
                assert_eq!(hdr.subject, "hi");
                assert_eq!(hdr.account_key.as_deref(), Some("account1"));
            }
            other => panic!("expected Published, got {other:?}"),
        }

        sink.end_mail_delivery(&mut folder).unwrap();
        assert!(folder.biff_new_mail);
        assert_eq!(folder.database.num_messages(), 1);

        let mut raw = Vec::new();
        std::io::Read::read_to_end(&mut store.get_msg_input_stream(&folder.path, "0").unwrap(), &mut raw).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.starts_with("X-Mozilla-Account-Key: account1\r\n"));
        assert!(text.contains("X-UIDL: uidl-1\r\n"));
        assert!(text.contains("X-Mozilla-Status: 0000\r\n"));
        assert!(text.contains("Subject: hi\r\n"));
    }

    #[test]
    fn incorporate_abort_rolls_back_and_does_not_publish() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();
        let mut sink = IngestSink::new(&store);

        open_batch(&mut sink, None);
        let mut handle = sink.incorporate_begin(&mut folder, &config, None, Flags::default()).unwrap();
        sink.incorporate_write(&mut handle, b"Subject: dropped\r\n\r\n").unwrap();
        sink.incorporate_abort(&folder, handle).unwrap();
        sink.end_mail_delivery(&mut folder).unwrap();

        assert_eq!(folder.database.num_messages(), 0);
        assert!(!folder.biff_new_mail);
    }

    #[test]
    fn duplicate_discard_policy_rolls_back_without_publishing() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let mut config = StoreConfig::default();
        config.duplicate_message_policy = DuplicateMessagePolicy::Discard;
        let mut sink = IngestSink::new(&store);
        let mut filters = NullFilterRuleEngine;

        open_batch(&mut sink, None);
        let mut first = sink.incorporate_begin(&mut folder, &config, None, Flags::default()).unwrap();
        sink.incorporate_write(&mut first, b"Message-ID: <same@id>\r\n\r\nbody\r\n").unwrap();
        sink.incorporate_complete(&mut folder, &config, first, &mut filters).unwrap();
        assert_eq!(folder.database.num_messages(), 1);

        let mut second = sink.incorporate_begin(&mut folder, &config, None, Flags::default()).unwrap();
        sink.incorporate_write(&mut second, b"Message-ID: <same@id>\r\n\r\nbody\r\n").unwrap();
        let outcome = sink.incorporate_complete(&mut folder, &config, second, &mut filters).unwrap();

        assert!(matches!(outcome, IncorporateOutcome::DuplicateDiscarded));
        assert_eq!(folder.database.num_messages(), 1);
    }

    #[test]
    fn full_message_replaces_pre_existing_partial_header() {
        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();
        let mut sink = IngestSink::new(&store);
        let mut filters = NullFilterRuleEngine;

        let partial_key = folder.database.next_msg_key();
        let mut stub = MsgHdr::new(partial_key, "stub-token");
        stub.message_id = "<same@id>".to_string();
        stub.flags.set(Flags::PARTIAL, true);
        folder.database.insert(stub);
        assert_eq!(folder.database.num_messages(), 1);

        open_batch(&mut sink, None);
        let mut handle = sink.incorporate_begin(&mut folder, &config, None, Flags::default()).unwrap();
        sink.incorporate_write(&mut handle, b"Message-ID: <same@id>\r\n\r\nfull body\r\n").unwrap();
        let outcome = sink.incorporate_complete(&mut folder, &config, handle, &mut filters).unwrap();

        match outcome {
            IncorporateOutcome::Published(hdr) => {
                assert_eq!(hdr.message_id, "<same@id>");
                assert!(!hdr.flags.contains(Flags::PARTIAL));
            }
            other => panic!("expected Published, got {other:?}"),
        }
        // The partial stub is gone, replaced by exactly the one full message.
        assert_eq!(folder.database.num_messages(), 1);
        assert!(folder.database.get(partial_key).is_none());
    }

    #[test]
    fn filter_disposal_suppresses_biff_for_that_message() {
        struct MarkReadFilter;
        impl FilterRuleEngine for MarkReadFilter {
            fn apply(&mut self, _folder_path: &Path, hdr: &mut MsgHdr) -> FilterOutcome {
                hdr.flags.set(Flags::READ, true);
                FilterOutcome { ran: true, disposed: true }
            }
        }

        let dir = tempdir().unwrap();
        let mut folder = Folder::new(dir.path().join("INBOX"));
        let store = MboxStore::new();
        let config = StoreConfig::default();
        let mut sink = IngestSink::new(&store);
        let mut filters = MarkReadFilter;

        open_batch(&mut sink, None);
        let mut handle = sink.incorporate_begin(&mut folder, &config, None, Flags::default()).unwrap();
        sink.incorporate_write(&mut handle, b"Subject: filtered\r\n\r\nbody\r\n").unwrap();
        sink.incorporate_complete(&mut folder, &config, handle, &mut filters).unwrap();
        sink.end_mail_delivery(&mut folder).unwrap();

        assert_eq!(sink.num_new_messages(), 0);
        assert!(!folder.biff_new_mail);
        assert_eq!(folder.database.num_messages(), 1);
    }

    #[test]
    fn calls_out_of_sequence_return_protocol_error() {
        let store = MboxStore::new();
        let mut sink = IngestSink::new(&store);
        assert!(sink.begin_mail_delivery().is_err());
    }
}
