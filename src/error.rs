/*
 * error.rs
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

//! Store errors: one hand-rolled enum plus kind/bundle-key accessors, no `thiserror`.

use std::fmt;

/// Broad category of a store error, surfaced to callers that need to branch on it
/// (e.g. a duplicate-message policy that treats `Concurrency` differently from `Corrupt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem/stream I/O failure.
    Io,
    /// Unparseable header, impossible offset, or other structurally broken input.
    Corrupt,
    /// Out of disk space, or the mbox size cap was reached.
    Quota,
    /// Folder busy (semaphore held) or other serialization conflict.
    Concurrency,
    /// A caller invoked operations out of the required sequence (programming error).
    Protocol,
    /// A scan/compact/ingest callback asked to stop.
    UserAborted,
    /// A retention listener or virus scanner rejected the operation.
    Policy,
}

/// Error from Store, Folder, Compactor, Indexer, or Ingest operations.
#[derive(Debug)]
pub struct StoreError {
    kind: ErrorKind,
    message: String,
    bundle_key: Option<&'static str>,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            bundle_key: None,
        }
    }

    /// Attach the string-bundle key a status-feedback collaborator would localize.
    pub fn with_bundle_key(mut self, key: &'static str) -> Self {
        self.bundle_key = Some(key);
        self
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corrupt, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Concurrency, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserAborted, message)
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Policy, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn bundle_key(&self) -> Option<&'static str> {
        self.bundle_key
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::io(e.to_string())
    }
}

/// Exit/error codes surfaced to UI-facing callers (distinct from `ErrorKind`, which
/// categorizes the underlying failure; these are the discrete result codes §6 names).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    FolderBusy,
    FolderMissingSummary,
    SummaryOutOfDate,
    NotAMailFolder,
    WritingMailFolder,
    FileTooBig,
    InsufficientSpace,
    InvalidFolderName,
    FolderExists,
    CopyFolderAborted,
    MessageNotOffline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_sets_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: StoreError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn bundle_key_attaches() {
        let err = StoreError::quota("disk full").with_bundle_key("outOfDiskSpace");
        assert_eq!(err.bundle_key(), Some("outOfDiskSpace"));
        assert_eq!(err.kind(), ErrorKind::Quota);
    }
}
