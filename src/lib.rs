/*
 * lib.rs
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

//! Local mail message store and index subsystem: mbox and maildir codecs behind a
//! common [`store::Store`] trait, a per-folder [`database::Database`] index, the
//! [`compactor::FolderCompactor`] and [`indexer::StoreIndexer`] maintenance passes, and
//! the [`ingest::IngestSink`] delivery protocol that ties them together.

pub mod compactor;
pub mod config;
pub mod database;
pub mod error;
pub mod folder;
pub mod header_reader;
pub mod header_state;
pub mod ingest;
pub mod indexer;
pub mod line_reader;
pub mod localstorage;
pub mod mbox_output_stream;
pub mod message_id;
pub mod mime;
pub mod msghdr;
pub mod quarantine;
pub mod store;
pub mod uri;

pub use compactor::{CompactionListener, FolderCompactor, NullCompactionListener};
pub use config::{DuplicateMessagePolicy, StoreConfig};
pub use database::Database;
pub use error::{ErrorKind, ExitCode, StoreError};
pub use folder::{Folder, FolderFlags, Semaphore};
pub use ingest::{FilterOutcome, FilterRuleEngine, IncorporateHandle, IncorporateOutcome, IngestSink, NullFilterRuleEngine};
pub use indexer::{IndexerListener, NullIndexerListener, StoreIndexer};
pub use localstorage::maildir::MaildirStore;
pub use localstorage::mbox::MboxStore;
pub use msghdr::{Flags, MsgHdr, Priority};
pub use store::{CompactionOutcome, CopyOutcome, RetainedMessage, RetentionDecision, Store};
