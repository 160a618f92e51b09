/*
 * header_state.rs
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

//! Per-message parser that turns a raw byte stream into a [`MsgHdr`]: accumulates the
//! header block with `LineReader`, then counts body lines. Finalization normalizes
//! subject, addresses, date, flags and custom properties.

use crate::line_reader::LineReader;
use crate::msghdr::{Flags, MsgHdr};
use base64::Engine;
use std::collections::BTreeMap;

/// Lines longer than this are still counted toward `messageSize` but truncated before
/// being handed to the header parser, guarding against unbounded memory growth from a
/// single pathological line.
pub const STUPIDLY_LONG_LINE_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ParseHeaders,
    ParseBodyState,
}

/// Case-insensitive header names captured for special handling; anything else either
/// falls into `customDBHeaders` (if configured) or is dropped.
fn is_known(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "subject"
            | "from"
            | "sender"
            | "to"
            | "cc"
            | "bcc"
            | "message-id"
            | "references"
            | "in-reply-to"
            | "date"
            | "delivery-date"
            | "received"
            | "reply-to"
            | "content-type"
            | "x-mozilla-status"
            | "x-mozilla-status2"
            | "x-mozilla-account-key"
            | "x-mozilla-keys"
            | "status"
            | "disposition-notification-to"
            | "return-receipt-to"
    )
}

/// Accumulates one raw header occurrence; used to implement first-occurrence-wins while
/// still letting To/Cc aggregate across repeats.
#[derive(Default)]
struct RawHeaders {
    first: BTreeMap<String, String>,
    to_parts: Vec<String>,
    cc_parts: Vec<String>,
    received: Vec<String>,
    custom: BTreeMap<String, String>,
}

impl RawHeaders {
    fn record(&mut self, name: &str, value: &str, custom_db_headers: &[String]) {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "to" => self.to_parts.push(value.to_string()),
            "cc" => self.cc_parts.push(value.to_string()),
            "received" => self.received.push(value.to_string()),
            _ => {
                self.first.entry(lower.clone()).or_insert_with(|| value.to_string());
                if !is_known(name) {
                    for allowed in custom_db_headers {
                        if allowed.eq_ignore_ascii_case(name) {
                            self.custom.entry(name.to_string()).or_insert_with(|| value.to_string());
                        }
                    }
                }
            }
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.first.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Configuration inputs that shape header-state finalization; a subset of
/// [`crate::config::StoreConfig`] relevant to this parser.
#[derive(Debug, Clone, Default)]
pub struct HeaderStateConfig {
    /// Header names (restricted to RFC 5322 token characters) whose values are captured
    /// into `MsgHdr.properties`.
    pub custom_db_headers: Vec<String>,
    /// Externally supplied date (e.g. protocol envelope date) used if `Date:` is absent.
    pub envelope_date: Option<i64>,
}

/// A per-message parser driving toward one finalized [`MsgHdr`].
pub struct MessageHeaderState {
    state: State,
    line_reader: LineReader,
    raw_headers: RawHeaders,
    raw_header_block: Vec<u8>,
    line_count: u64,
    message_size: u64,
    config: HeaderStateConfig,
}

impl MessageHeaderState {
    pub fn new(config: HeaderStateConfig) -> Self {
        Self {
            state: State::ParseHeaders,
            line_reader: LineReader::new(),
            raw_headers: RawHeaders::default(),
            raw_header_block: Vec::new(),
            line_count: 0,
            message_size: 0,
            config,
        }
    }

    /// Feed a chunk of raw message bytes (header block or body, in arrival order).
    pub fn feed(&mut self, chunk: &[u8]) {
        self.message_size += chunk.len() as u64;
        let mut lines: Vec<Vec<u8>> = Vec::new();
        self.line_reader.feed(chunk, |line| {
            lines.push(line.to_vec());
            true
        });
        for line in lines {
            self.feed_line(&line);
        }
    }

    fn feed_line(&mut self, line: &[u8]) {
        match self.state {
            State::ParseHeaders => {
                let content_len = line
                    .len()
                    .saturating_sub(if line.ends_with(b"\r\n") { 2 } else if line.ends_with(b"\n") { 1 } else { 0 });
                if content_len == 0 {
                    self.raw_header_block.extend_from_slice(line);
                    self.parse_header_block();
                    self.state = State::ParseBodyState;
                    return;
                }
                self.raw_header_block.extend_from_slice(line);
            }
            State::ParseBodyState => {
                self.line_count += 1;
            }
        }
    }

    fn parse_header_block(&mut self) {
        let mut lr = LineReader::new();
        let mut hr = crate::header_reader::HeaderReader::new();
        let data = std::mem::take(&mut self.raw_header_block);
        let custom_db_headers = self.config.custom_db_headers.clone();
        let raw_headers = &mut self.raw_headers;
        hr.feed(&data, &mut lr, |h| {
            let name = h.name_str().into_owned();
            let mut value = h.value_str().into_owned();
            if value.len() > STUPIDLY_LONG_LINE_THRESHOLD {
                value.truncate(STUPIDLY_LONG_LINE_THRESHOLD);
            }
            raw_headers.record(&name, &value, &custom_db_headers);
        });
        if !hr.is_complete() {
            lr.flush(|line| {
                hr.feed_line(line, |_| {});
                true
            });
            hr.flush(|h| {
                let name = h.name_str().into_owned();
                let value = h.value_str().into_owned();
                raw_headers.record(&name, &value, &custom_db_headers);
            });
        }
        self.raw_header_block = data;
    }

    /// Finalize the accumulated state into a `MsgHdr`. Returns `None` if the message is
    /// `Expunged` (caller should add `message_size()` to the folder's `expungedBytes`
    /// instead of publishing a header).
    pub fn finish(mut self, msg_key: u64, store_token: impl Into<String>) -> Option<MsgHdr> {
        if self.state == State::ParseHeaders {
            // No blank line ever arrived; parse whatever header bytes we have anyway.
            self.parse_header_block();
        }

        let (flags, priority) = self.parse_flags();
        if flags.contains(Flags::EXPUNGED) {
            return None;
        }

        let mut hdr = MsgHdr::new(msg_key, store_token);
        hdr.flags = flags;
        hdr.priority = priority;
        hdr.line_count = self.line_count;
        hdr.message_size = self.message_size;

        hdr.from = self.raw_headers.get("from").unwrap_or_default().to_string();
        hdr.to = self.raw_headers.to_parts.join(", ");
        hdr.cc = self.raw_headers.cc_parts.join(", ");
        hdr.bcc = self.raw_headers.get("bcc").unwrap_or_default().to_string();

        let message_id = self.raw_headers.get("message-id").map(strip_angle_brackets);
        hdr.message_id = message_id.unwrap_or_else(|| self.synthesize_message_id());

        let (subject, has_re) = strip_reply_prefix(self.raw_headers.get("subject").unwrap_or(""));
        hdr.subject = subject;
        if has_re {
            hdr.flags.set(Flags::HAS_RE, true);
        }

        hdr.references = self
            .raw_headers
            .get("references")
            .or_else(|| self.raw_headers.get("in-reply-to"))
            .unwrap_or_default()
            .to_string();

        hdr.date = self.resolve_date();

        if let Some(ct) = self.raw_headers.get("content-type").and_then(crate::mime::parse_content_type) {
            hdr.charset = ct.get_parameter("charset").map(str::to_string);
            if ct.is_mime_type("multipart", "mixed") {
                hdr.flags.set(Flags::ATTACHMENT, true);
            }
        }

        if (self.raw_headers.get("disposition-notification-to").is_some()
            || self.raw_headers.get("return-receipt-to").is_some())
            && !hdr.is_read()
        {
            hdr.flags.set(Flags::MDN_REPORT_NEEDED, true);
        }

        hdr.account_key = self.raw_headers.get("x-mozilla-account-key").map(str::to_string);
        hdr.properties = self.raw_headers.custom.clone();

        if let Some(dr) = self.derive_received_date() {
            hdr.properties.insert("dateReceived".to_string(), dr.to_string());
        }

        Some(hdr)
    }

    pub fn message_size(&self) -> u64 {
        self.message_size
    }

    fn synthesize_message_id(&self) -> String {
        use md5::Digest;
        let digest = md5::Md5::digest(&self.raw_header_block);
        let encoded = base64::engine::general_purpose::STANDARD.encode(digest);
        format!("<md5:{encoded}>")
    }

    /// `X-Mozilla-Status`/`Status2` if present, else a Berkeley `Status:` fallback.
    fn parse_flags(&self) -> (Flags, crate::msghdr::Priority) {
        let low = self
            .raw_headers
            .get("x-mozilla-status")
            .and_then(|v| u16::from_str_radix(v.trim(), 16).ok());
        let high = self
            .raw_headers
            .get("x-mozilla-status2")
            .and_then(|v| u32::from_str_radix(v.trim(), 16).ok());

        if let Some(low) = low {
            let combined = Flags::from_halves(low, high.unwrap_or(0) as u16);
            return combined.split_priority();
        }

        let mut flags = Flags::default();
        if let Some(status) = self.raw_headers.get("status") {
            for c in status.chars() {
                match c {
                    'R' | 'O' => flags.set(Flags::READ, true),
                    'N' | 'U' => flags.set(Flags::READ, false),
                    'D' => {}
                    _ => {}
                }
            }
        }
        (flags, crate::msghdr::Priority::None)
    }

    fn resolve_date(&self) -> i64 {
        if let Some(date) = self.raw_headers.get("date").and_then(crate::mime::parse_rfc5322_date) {
            return date.timestamp_micros();
        }
        if let Some(envelope) = self.config.envelope_date {
            return envelope;
        }
        if let Some(received) = self.derive_received_date() {
            return received * 1_000_000;
        }
        0
    }

    /// Seconds-since-epoch derived from `Received:` → `Delivery-Date:` → `Date:`.
    fn derive_received_date(&self) -> Option<i64> {
        if let Some(first) = self.raw_headers.received.first() {
            if let Some(semi) = first.rfind(';') {
                if let Some(date) = crate::mime::parse_rfc5322_date(first[semi + 1..].trim()) {
                    return Some(date.timestamp());
                }
            }
        }
        if let Some(d) = self.raw_headers.get("delivery-date").and_then(crate::mime::parse_rfc5322_date) {
            return Some(d.timestamp());
        }
        if let Some(d) = self.raw_headers.get("date").and_then(crate::mime::parse_rfc5322_date) {
            return Some(d.timestamp());
        }
        None
    }
}

fn strip_angle_brackets(v: &str) -> String {
    let v = v.trim();
    if let Some(stripped) = v.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        stripped.to_string()
    } else {
        v.to_string()
    }
}

/// Strip one or more leading reply prefixes (`Re:`, `RE:`, `Aw:`, etc.). Returns the
/// stripped subject and whether anything was removed.
fn strip_reply_prefix(subject: &str) -> (String, bool) {
    let mut s = subject.trim();
    let mut stripped = false;
    loop {
        let lower_start: String = s.chars().take(4).collect::<String>().to_ascii_lowercase();
        if let Some(rest) = lower_start.starts_with("re:").then(|| &s[3..]) {
            s = rest.trim_start();
            stripped = true;
            continue;
        }
        if let Some(rest) = lower_start.starts_with("aw:").then(|| &s[3..]) {
            s = rest.trim_start();
            stripped = true;
            continue;
        }
        break;
    }
    (s.to_string(), stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(data: &[u8]) -> MsgHdr {
        let mut state = MessageHeaderState::new(HeaderStateConfig::default());
        state.feed(data);
        state.finish(1, "0").expect("not expunged")
    }

    #[test]
    fn simple_message_fields() {
        let hdr = run(b"Subject: hi\r\nFrom: a@b\r\nTo: c@d\r\n\r\nbody\r\n");
        assert_eq!(hdr.subject, "hi");
        assert_eq!(hdr.from, "a@b");
        assert_eq!(hdr.to, "c@d");
        assert_eq!(hdr.line_count, 1);
    }

    #[test]
    fn folded_subject_unfolds() {
        let hdr = run(b"Subject: long\r\n folded\r\n subject\r\n\r\nbody\r\n");
        assert_eq!(hdr.subject, "long folded subject");
    }

    #[test]
    fn repeated_to_lines_aggregate() {
        let hdr = run(b"To: a@b\r\nTo: c@d\r\n\r\n");
        assert_eq!(hdr.to, "a@b, c@d");
    }

    #[test]
    fn bcc_header_is_captured() {
        let hdr = run(b"To: a@b\r\nBcc: hidden@example.com\r\n\r\n");
        assert_eq!(hdr.bcc, "hidden@example.com");
    }

    #[test]
    fn first_subject_occurrence_wins() {
        let hdr = run(b"Subject: first\r\nSubject: second\r\n\r\n");
        assert_eq!(hdr.subject, "first");
    }

    #[test]
    fn re_prefix_sets_has_re_flag() {
        let hdr = run(b"Subject: Re: hello\r\n\r\n");
        assert_eq!(hdr.subject, "hello");
        assert!(hdr.flags.contains(Flags::HAS_RE));
    }

    #[test]
    fn missing_message_id_is_synthesized() {
        let hdr = run(b"Subject: x\r\n\r\n");
        assert!(hdr.message_id.starts_with("<md5:"));
    }

    #[test]
    fn explicit_message_id_strips_angle_brackets() {
        let hdr = run(b"Message-ID: <abc@def>\r\n\r\n");
        assert_eq!(hdr.message_id, "abc@def");
    }

    #[test]
    fn mozilla_status_headers_parsed_into_flags() {
        let hdr = run(b"X-Mozilla-Status: 0001\r\nX-Mozilla-Status2: 00000000\r\n\r\n");
        assert!(hdr.is_read());
    }

    #[test]
    fn expunged_message_yields_none() {
        let mut state = MessageHeaderState::new(HeaderStateConfig::default());
        state.feed(b"X-Mozilla-Status: 0008\r\n\r\nbody\r\n");
        assert!(state.finish(1, "0").is_none());
    }

    #[test]
    fn berkeley_status_fallback_when_no_mozilla_headers() {
        let hdr = run(b"Status: RO\r\n\r\n");
        assert!(hdr.is_read());
    }

    #[test]
    fn multipart_mixed_sets_attachment_flag() {
        let hdr = run(b"Content-Type: multipart/mixed; boundary=x\r\n\r\n");
        assert!(hdr.flags.contains(Flags::ATTACHMENT));
    }

    #[test]
    fn custom_db_header_captured_when_configured() {
        let mut state = MessageHeaderState::new(HeaderStateConfig {
            custom_db_headers: vec!["X-Label".to_string()],
            envelope_date: None,
        });
        state.feed(b"X-Label: important\r\n\r\n");
        let hdr = state.finish(1, "0").unwrap();
        assert_eq!(hdr.properties.get("X-Label").map(String::as_str), Some("important"));
    }
}
