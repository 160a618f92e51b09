/*
 * header_reader.rs
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

//! RFC 5322 header reader layered on `LineReader`. Emits unfolded header values together
//! with the byte offsets of their *raw* (folded) region, so a caller holding the same
//! underlying file can seek back and overwrite a value in place without touching
//! neighboring bytes.

use crate::line_reader::LineReader;

/// One emitted header: name verbatim, value unfolded and whitespace-normalized, plus the
/// byte range of the raw value (as fed) for in-place rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    /// Byte offset, within the data fed to this reader, of the first byte of the value.
    pub raw_value_pos: u64,
    /// Length of the raw value region, including interior EOLs but excluding the
    /// terminal EOL of the header's last line.
    pub raw_value_length: u64,
}

impl Header {
    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Headers,
    Complete,
}

/// Pending header under construction.
struct Pending {
    name: Vec<u8>,
    value: Vec<u8>,
    raw_value_pos: u64,
    raw_value_length: u64,
}

/// Streaming RFC 5322 header parser. Feed it lines (as produced by `LineReader`) via
/// [`HeaderReader::feed_line`]; it emits complete `Header`s through the callback passed
/// to [`HeaderReader::feed`].
pub struct HeaderReader {
    state: State,
    bytes_fed: u64,
    pending: Option<Pending>,
    last_was_fold: bool,
}

impl Default for HeaderReader {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderReader {
    pub fn new() -> Self {
        Self {
            state: State::Headers,
            bytes_fed: 0,
            pending: None,
            last_was_fold: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Total bytes seen so far (the coordinate space `raw_value_pos` is measured in).
    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    /// Feed raw bytes (header-block-only; the caller is expected to stop at the blank
    /// line using `LineReader` line boundaries). Internally drives a `LineReader` and
    /// calls `feed_line` per emitted line.
    pub fn feed(&mut self, chunk: &[u8], line_reader: &mut LineReader, mut on_header: impl FnMut(Header)) {
        // Collect lines first: feed_line may itself need `&mut self`, so we can't
        // borrow `self` from inside the LineReader callback directly.
        let mut lines: Vec<Vec<u8>> = Vec::new();
        line_reader.feed(chunk, |line| {
            lines.push(line.to_vec());
            true
        });
        for line in lines {
            self.feed_line(&line, &mut on_header);
            if self.is_complete() {
                break;
            }
        }
    }

    /// Feed one line (terminator included, except possibly the final line of input).
    pub fn feed_line(&mut self, line: &[u8], mut on_header: impl FnMut(Header)) {
        if self.state == State::Complete {
            return;
        }
        let eol_len = eol_length(line);
        let content = &line[..line.len() - eol_len];

        if content.is_empty() {
            // blank line: end of header block
            self.flush_pending(&mut on_header);
            self.state = State::Complete;
            self.bytes_fed += line.len() as u64;
            self.last_was_fold = false;
            return;
        }

        let is_fold = matches!(content.first(), Some(b' ') | Some(b'\t'));
        if is_fold {
            if let Some(p) = self.pending.as_mut() {
                // Keep interior EOL + folded line length in raw_value_length, but emit
                // a single normalizing space plus the trimmed continuation in `value`.
                let trimmed = trim_leading_ws(content);
                if !p.value.is_empty() {
                    p.value.push(b' ');
                }
                p.value.extend_from_slice(trimmed);
                p.raw_value_length += line.len() as u64;
            }
            // A fold with no pending header (stray continuation before any header
            // started) is silently ignored, per spec tolerance.
            self.last_was_fold = true;
            self.bytes_fed += line.len() as u64;
            return;
        }

        // Not a fold: flush any pending header, then try to start a new one.
        self.flush_pending(&mut on_header);
        self.last_was_fold = false;

        if let Some(colon) = content.iter().position(|&b| b == b':') {
            let name = content[..colon].to_vec();
            let mut rest = &content[colon + 1..];
            let mut consumed = colon as u64 + 1;
            if let Some(&c) = rest.first() {
                if c == b' ' || c == b'\t' {
                    rest = &rest[1..];
                    consumed += 1;
                }
            }
            let raw_value_pos = self.bytes_fed + consumed;
            let raw_value_length = content.len() as u64 - consumed;
            self.pending = Some(Pending {
                name,
                value: rest.to_vec(),
                raw_value_pos,
                raw_value_length,
            });
        }
        // No colon: line silently ignored (tolerance).

        self.bytes_fed += line.len() as u64;
    }

    /// Flush any pending header assembled so far. Idempotent: a header is emitted only
    /// if one is pending and the caller hasn't just fed a folded continuation with
    /// nothing after it (i.e. this simply emits whatever has accumulated).
    pub fn flush(&mut self, mut on_header: impl FnMut(Header)) {
        self.flush_pending(&mut on_header);
    }

    fn flush_pending(&mut self, on_header: &mut impl FnMut(Header)) {
        if let Some(p) = self.pending.take() {
            on_header(Header {
                name: p.name,
                value: p.value,
                raw_value_pos: p.raw_value_pos,
                raw_value_length: p.raw_value_length,
            });
        }
    }
}

fn eol_length(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    }
}

fn trim_leading_ws(content: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < content.len() && (content[i] == b' ' || content[i] == b'\t') {
        i += 1;
    }
    &content[i..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(data: &[u8]) -> Vec<Header> {
        let mut lr = LineReader::new();
        let mut hr = HeaderReader::new();
        let mut headers = Vec::new();
        hr.feed(data, &mut lr, |h| headers.push(h));
        if !hr.is_complete() {
            lr.flush(|line| {
                hr.feed_line(line, |h| headers.push(h));
                true
            });
            hr.flush(|h| headers.push(h));
        }
        headers
    }

    #[test]
    fn simple_headers_no_folding() {
        let data = b"Subject: hello\r\nFrom: a@b\r\n\r\nbody";
        let headers = parse_all(data);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name_str(), "Subject");
        assert_eq!(headers[0].value_str(), "hello");
        assert_eq!(headers[1].name_str(), "From");
        assert_eq!(headers[1].value_str(), "a@b");
    }

    #[test]
    fn folded_subject_unfolds_with_single_space() {
        let data = b"Subject: long\r\n folded\r\n subject\r\n\r\nbody";
        let headers = parse_all(data);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value_str(), "long folded subject");
        // raw_value_length covers all three lines' content minus the terminal EOL.
        // "long\r\n folded\r\n subject" = 4 + 2 + 7 + 2 + 8 = 23
        assert_eq!(headers[0].raw_value_length, 23);
    }

    #[test]
    fn stray_continuation_before_any_header_ignored() {
        let data = b" stray\r\nSubject: ok\r\n\r\n";
        let headers = parse_all(data);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value_str(), "ok");
    }

    #[test]
    fn line_without_colon_is_ignored() {
        let data = b"not-a-header-line\r\nSubject: ok\r\n\r\n";
        let headers = parse_all(data);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value_str(), "ok");
    }

    #[test]
    fn raw_value_pos_locates_absolute_offset() {
        let data = b"X-Mozilla-Status: 0001\r\n\r\n";
        let headers = parse_all(data);
        let h = &headers[0];
        let pos = h.raw_value_pos as usize;
        let len = h.raw_value_length as usize;
        assert_eq!(&data[pos..pos + len], b"0001");
    }

    #[test]
    fn flush_without_blank_line_emits_pending_final_header() {
        let mut lr = LineReader::new();
        let mut hr = HeaderReader::new();
        let mut headers = Vec::new();
        hr.feed(b"Subject: no-trailing-blank", &mut lr, |h| headers.push(h));
        lr.flush(|line| {
            hr.feed_line(line, |h| headers.push(h));
            true
        });
        hr.flush(|h| headers.push(h));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value_str(), "no-trailing-blank");
    }

    #[test]
    fn idempotence_reemit_matches_canonical_block_modulo_whitespace() {
        let data = b"A: 1\r\nB: 2\r\nC: 3\r\n\r\n";
        let headers = parse_all(data);
        let mut rebuilt = Vec::new();
        for h in &headers {
            rebuilt.extend_from_slice(&h.name);
            rebuilt.extend_from_slice(b": ");
            rebuilt.extend_from_slice(&h.value);
            rebuilt.extend_from_slice(b"\r\n");
        }
        rebuilt.extend_from_slice(b"\r\n");
        assert_eq!(rebuilt, data.to_vec());
    }
}
