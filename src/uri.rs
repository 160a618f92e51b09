/*
 * uri.rs
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

//! `mailbox://` / `mailbox-message://` URI scheme: `mailbox://<server-path>` addresses a
//! folder, `mailbox-message://<server-path>#<msgKey>[?part=X.Y|&header=none]` addresses a
//! message within it. A legacy `mailbox://user@host@server/folder?number=N` form is
//! parsed on input but never produced on output.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Path segment safe set: encode path separators and reserved URI characters.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'%')
    .add(b' ');

fn path_with_leading_slash(path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", path)
    }
}

/// Folder URI: `mailbox://<server-path>`.
pub fn folder_uri(server_path: &str) -> String {
    format!("mailbox://{}", path_with_leading_slash(server_path))
}

/// Message URI: `mailbox-message://<server-path>#<msgKey>`, optionally with a
/// `?part=X.Y` or `&header=none` query suffix.
pub fn message_uri(server_path: &str, msg_key: u64) -> String {
    format!(
        "mailbox-message://{}#{}",
        path_with_leading_slash(server_path),
        msg_key
    )
}

pub fn message_uri_with_part(server_path: &str, msg_key: u64, part: &str) -> String {
    format!("{}?part={}", message_uri(server_path, msg_key), part)
}

/// Percent-encode a folder name for use as a path segment (encodes `/`, non-ASCII, etc.).
pub fn encode_folder_name(folder_name: &str) -> String {
    utf8_percent_encode(folder_name, PATH_SEGMENT).to_string()
}

/// Decode a percent-encoded path segment back to a folder name.
pub fn decode_folder_name(encoded: &str) -> String {
    percent_encoding::percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}

/// A parsed `mailbox-message://` reference: the folder's server path plus the `msgKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessageUri {
    pub server_path: String,
    pub msg_key: u64,
}

/// Parse a canonical `mailbox-message://<server-path>#<msgKey>[?...]` URI, or the legacy
/// `mailbox://user@host@server/folder?number=N` form. Returns `None` if neither matches.
pub fn parse_message_uri(uri: &str) -> Option<ParsedMessageUri> {
    if let Some(rest) = uri.strip_prefix("mailbox-message://") {
        let (path_and_hash, _query) = match rest.split_once('?') {
            Some((a, b)) => (a, Some(b)),
            None => (rest, None),
        };
        let (path, key_str) = path_and_hash.split_once('#')?;
        let msg_key: u64 = key_str.parse().ok()?;
        return Some(ParsedMessageUri {
            server_path: path.to_string(),
            msg_key,
        });
    }
    if let Some(rest) = uri.strip_prefix("mailbox://") {
        // legacy: user@host@server/folder?number=N
        let (path, query) = rest.split_once('?')?;
        let number = query.strip_prefix("number=")?;
        let msg_key: u64 = number.parse().ok()?;
        // path looks like user@host@server/folder; the folder's server-path is
        // everything after the second '@'.
        let mut at_iter = path.match_indices('@');
        let second_at = at_iter.nth(1).map(|(i, _)| i);
        let server_path = match second_at {
            Some(i) => path[i + 1..].to_string(),
            None => path.to_string(),
        };
        return Some(ParsedMessageUri {
            server_path,
            msg_key,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_uri_has_leading_slash() {
        assert_eq!(folder_uri("local/INBOX"), "mailbox://local/INBOX");
    }

    #[test]
    fn message_uri_includes_msg_key() {
        assert_eq!(message_uri("local/INBOX", 42), "mailbox-message://local/INBOX#42");
    }

    #[test]
    fn message_uri_with_part_appends_query() {
        let u = message_uri_with_part("local/INBOX", 42, "1.2");
        assert_eq!(u, "mailbox-message://local/INBOX#42?part=1.2");
    }

    #[test]
    fn folder_name_roundtrips_through_encode_decode() {
        let name = "INBOX/Work";
        let enc = encode_folder_name(name);
        assert_eq!(decode_folder_name(&enc), name);
    }

    #[test]
    fn parses_canonical_message_uri() {
        let parsed = parse_message_uri("mailbox-message://local/INBOX#42?part=1.2").unwrap();
        assert_eq!(parsed.server_path, "local/INBOX");
        assert_eq!(parsed.msg_key, 42);
    }

    #[test]
    fn parses_legacy_message_uri() {
        let parsed = parse_message_uri("mailbox://user@host@server/folder?number=7").unwrap();
        assert_eq!(parsed.server_path, "server/folder");
        assert_eq!(parsed.msg_key, 7);
    }

    #[test]
    fn rejects_unrelated_uri() {
        assert!(parse_message_uri("https://example.com").is_none());
    }
}
