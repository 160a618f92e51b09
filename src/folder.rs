/*
 * folder.rs
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

//! A folder tree node: filesystem path, per-folder index, flags, and the cooperative
//! single-writer lock operations are serialized behind.

use crate::database::Database;
use crate::error::StoreError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderFlags(pub u32);

impl FolderFlags {
    pub const INBOX: FolderFlags = FolderFlags(0x0001);
    pub const SENT: FolderFlags = FolderFlags(0x0002);
    pub const DRAFTS: FolderFlags = FolderFlags(0x0004);
    pub const TRASH: FolderFlags = FolderFlags(0x0008);
    pub const JUNK: FolderFlags = FolderFlags(0x0010);
    pub const ARCHIVE: FolderFlags = FolderFlags(0x0020);
    pub const QUEUE: FolderFlags = FolderFlags(0x0040);
    pub const TEMPLATES: FolderFlags = FolderFlags(0x0080);
    pub const SPECIAL_USE: FolderFlags = FolderFlags(0x0100);
    pub const VIRTUAL: FolderFlags = FolderFlags(0x0200);
    pub const OFFLINE: FolderFlags = FolderFlags(0x0400);

    pub fn contains(&self, other: FolderFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: FolderFlags, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl std::ops::BitOr for FolderFlags {
    type Output = FolderFlags;
    fn bitor(self, rhs: FolderFlags) -> FolderFlags {
        FolderFlags(self.0 | rhs.0)
    }
}

/// Cooperative single-writer lock. Advisory only: nothing stops a caller from mutating
/// the folder without acquiring it. The single-threaded cooperative scheduling model
/// (§5) makes kernel-level locking unnecessary; this exists purely to reject concurrent
/// *logical* operations (e.g. a compaction started while an ingest batch is mid-flight).
#[derive(Debug, Default)]
pub struct Semaphore {
    holder: Option<String>,
}

impl Semaphore {
    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    pub fn acquire(&mut self, holder: impl Into<String>) -> Result<(), StoreError> {
        if self.holder.is_some() {
            return Err(StoreError::busy("folder semaphore already held"));
        }
        self.holder = Some(holder.into());
        Ok(())
    }

    pub fn release(&mut self) {
        self.holder = None;
    }
}

/// A folder node: on-disk path, cached index, flags, and the advisory lock operations
/// are serialized behind. The backend (mbox or maildir) it's stored by is implicit in
/// which `Store` implementation a caller reaches it through.
#[derive(Debug)]
pub struct Folder {
    pub path: PathBuf,
    pub flags: FolderFlags,
    pub database: Database,
    pub semaphore: Semaphore,
    /// Set by the ingest sink when a delivery batch leaves unread new mail and no
    /// filter ran to dispose of it; cleared by whatever consumes the notification.
    pub biff_new_mail: bool,
}

impl Folder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flags: FolderFlags::default(),
            database: Database::new(),
            semaphore: Semaphore::default(),
            biff_new_mail: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_messages(&self) -> usize {
        self.database.num_messages()
    }

    pub fn num_unread(&self) -> usize {
        self.database.num_unread()
    }

    pub fn num_new(&self) -> usize {
        self.database.num_new()
    }
}
