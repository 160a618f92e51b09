/*
 * message_id.rs
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

//! Stable message identifier: the opaque `mailbox-message://` URI form used to address a
//! message independent of its `storeToken`. Not the `Message-ID:` header value.

use std::fmt;

/// Opaque stable message id, unique within a folder.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(uri_or_opaque: impl Into<String>) -> Self {
        Self(uri_or_opaque.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a `MessageId` for a maildir message: folder URI + filename.
pub fn maildir_message_id(folder_uri: &str, filename: &str) -> MessageId {
    MessageId::new(format!("{}#{}", folder_uri, filename))
}

/// Build a `MessageId` for an mbox message: folder URI + byte offset.
pub fn mbox_message_id(folder_uri: &str, offset: &str) -> MessageId {
    MessageId::new(format!("{}#{}", folder_uri, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_uri_roundtrip_maildir() {
        let id = maildir_message_id("mailbox://local/INBOX", "1234567890.M12345P67890.host");
        let s = id.as_str();
        assert!(s.starts_with("mailbox://"));
        let id2 = MessageId::new(s);
        assert_eq!(id.as_str(), id2.as_str());
    }

    #[test]
    fn message_id_uri_roundtrip_mbox() {
        let id = mbox_message_id("mailbox://local/INBOX", "0");
        assert_eq!(id.as_str(), "mailbox://local/INBOX#0");
    }
}
