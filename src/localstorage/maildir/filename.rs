/*
 * filename.rs
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

//! Unique maildir filename generation. Per the spec's Open Question decision, flags and
//! keywords live only in the `X-Mozilla-*` headers inside the message, so filenames carry
//! no `:2,<flags>` suffix; the opaque filename is the `storeToken` in full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_unique_part() -> String {
    let pid = std::process::id();
    let c = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}.{}", pid, c)
}

/// A maildir message filename: `<timestamp>.<pid>.<counter>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaildirFilename {
    pub timestamp: u64,
    pub unique_part: String,
}

impl MaildirFilename {
    /// Generate a fresh filename for a message about to be delivered to `tmp/`.
    pub fn generate() -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            timestamp: ts,
            unique_part: next_unique_part(),
        }
    }

    /// Parse an existing on-disk filename back into its components; returns `None` if it
    /// doesn't match the `<timestamp>.<unique>` shape (e.g. a foreign file dropped into
    /// `cur/` by another tool).
    pub fn parse(filename: &str) -> Option<Self> {
        let dot = filename.find('.')?;
        let timestamp: u64 = filename[..dot].parse().ok()?;
        Some(Self {
            timestamp,
            unique_part: filename[dot + 1..].to_string(),
        })
    }
}

impl std::fmt::Display for MaildirFilename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.timestamp, self.unique_part)
    }
}
