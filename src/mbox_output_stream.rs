/*
 * mbox_output_stream.rs
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

//! Write-side mboxrd codec for a single message: emits the `From ` envelope, escapes
//! body lines matching `^>*From ` by prepending one more `>`, and offers
//! commit (`finish`) / rollback (`close`) transactional semantics over a seekable,
//! truncatable output stream (the "safe output stream" pattern).

use crate::error::StoreError;
use std::io::{Seek, SeekFrom, Write};

const FROM_NEEDLE: &[u8] = b"From ";

/// A seekable stream that also supports truncation, needed to roll an aborted
/// message back to its starting offset.
pub trait Truncatable: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

impl Truncatable for std::fs::File {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

impl Truncatable for std::io::Cursor<Vec<u8>> {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    StartOfLine,
    MidLine,
    StartAwaitingData,
    Error,
    Closed,
}

enum Classification {
    Escape,
    NotFrom,
    Indeterminate,
}

/// Does `buf` begin with zero or more `>` followed by the literal `From `?
fn classify(buf: &[u8]) -> Classification {
    let mut i = 0;
    while i < buf.len() && buf[i] == b'>' {
        i += 1;
    }
    if i == buf.len() {
        return Classification::Indeterminate;
    }
    let avail = &buf[i..];
    let cmp_len = avail.len().min(FROM_NEEDLE.len());
    if avail[..cmp_len] != FROM_NEEDLE[..cmp_len] {
        return Classification::NotFrom;
    }
    if avail.len() < FROM_NEEDLE.len() {
        return Classification::Indeterminate;
    }
    Classification::Escape
}

/// Transactional, escaping write-side codec for one mbox message.
pub struct MboxMsgOutputStream<W: Truncatable> {
    inner: W,
    state: State,
    start_pos: u64,
    pending: Vec<u8>,
    crlf: bool,
    last_byte: Option<u8>,
    last_error: Option<String>,
}

impl<W: Truncatable> MboxMsgOutputStream<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: State::Initial,
            start_pos: 0,
            pending: Vec::new(),
            crlf: true,
            last_byte: None,
            last_error: None,
        }
    }

    /// Position in the underlying stream this message's envelope began at; `close`
    /// without a prior `finish` truncates back to this offset.
    pub fn start_pos(&self) -> u64 {
        self.start_pos
    }

    pub fn stream_status(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Unwrap the underlying stream, e.g. to hand fully-escaped in-memory bytes off to
    /// a quarantine stage. Only meaningful once `finish` or `close` has run.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn fail(&mut self, e: std::io::Error) -> StoreError {
        self.state = State::Error;
        self.last_error = Some(e.to_string());
        StoreError::io(self.last_error.clone().unwrap())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.inner.write_all(bytes).map_err(|e| self.fail(e))?;
        let last = bytes[bytes.len() - 1];
        self.last_byte = Some(last);
        if last == b'\n' {
            self.crlf = bytes.len() >= 2 && bytes[bytes.len() - 2] == b'\r';
        }
        Ok(())
    }

    fn ensure_started(&mut self) -> Result<(), StoreError> {
        if self.state != State::Initial {
            return Ok(());
        }
        self.start_pos = self.inner.stream_position().map_err(|e| self.fail(e))?;
        self.state = State::StartOfLine;
        self.emit(b"From \r\n")
    }

    fn line_ending(&self) -> &'static [u8] {
        if self.crlf {
            b"\r\n"
        } else {
            b"\n"
        }
    }

    /// Write message bytes, escaping `From `-prefixed body lines as they're discovered.
    pub fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        match self.state {
            State::Error => {
                return Err(StoreError::io(
                    self.last_error.clone().unwrap_or_default(),
                ))
            }
            State::Closed => return Err(StoreError::protocol("write after close")),
            _ => {}
        }
        self.ensure_started()?;

        let mut owned;
        let mut buf: &[u8] = if self.pending.is_empty() {
            data
        } else {
            owned = std::mem::take(&mut self.pending);
            owned.extend_from_slice(data);
            &owned
        };

        loop {
            match self.state {
                State::MidLine => {
                    if let Some(nl) = buf.iter().position(|&b| b == b'\n') {
                        self.emit(&buf[..=nl])?;
                        buf = &buf[nl + 1..];
                        self.state = State::StartOfLine;
                        continue;
                    } else {
                        self.emit(buf)?;
                        return Ok(());
                    }
                }
                State::StartOfLine | State::StartAwaitingData => {
                    if buf.is_empty() {
                        self.state = State::StartOfLine;
                        return Ok(());
                    }
                    match classify(buf) {
                        Classification::Escape => {
                            self.emit(b">")?;
                            self.state = State::MidLine;
                            continue;
                        }
                        Classification::NotFrom => {
                            self.state = State::MidLine;
                            continue;
                        }
                        Classification::Indeterminate => {
                            self.pending = buf.to_vec();
                            self.state = State::StartAwaitingData;
                            return Ok(());
                        }
                    }
                }
                State::Initial | State::Error | State::Closed => unreachable!(),
            }
        }
    }

    /// Commit the message: flush any buffered ambiguous prefix, append a missing
    /// terminal EOL if the body didn't end on a line boundary (the one documented
    /// byte-inexactness), then emit the blank end-of-message separator line.
    pub fn finish(&mut self) -> Result<(), StoreError> {
        if self.state == State::Error {
            return Err(StoreError::io(
                self.last_error.clone().unwrap_or_default(),
            ));
        }
        if self.state == State::Closed {
            return Ok(());
        }
        self.ensure_started()?;
        if self.state == State::StartAwaitingData {
            let pending = std::mem::take(&mut self.pending);
            self.emit(&pending)?;
        }
        if self.last_byte != Some(b'\n') {
            let eol = self.line_ending().to_vec();
            self.emit(&eol)?;
        }
        let sep = self.line_ending().to_vec();
        self.emit(&sep)?;
        self.state = State::Closed;
        Ok(())
    }

    /// Roll back: if `finish` was not called first, truncate the underlying stream
    /// back to the position recorded when this message's envelope was emitted.
    /// Idempotent once closed.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.state == State::Closed {
            return Ok(());
        }
        if self.state == State::Initial {
            self.state = State::Closed;
            return Ok(());
        }
        self.inner
            .seek(SeekFrom::Start(self.start_pos))
            .map_err(StoreError::from)?;
        self.inner
            .truncate_to(self.start_pos)
            .map_err(StoreError::from)?;
        self.state = State::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn into_bytes(stream: MboxMsgOutputStream<Cursor<Vec<u8>>>) -> Vec<u8> {
        stream.inner.into_inner()
    }

    #[test]
    fn simple_message_round_trip_with_commit() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"From: a\r\n\r\nhello\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert_eq!(out, b"From \r\nFrom: a\r\n\r\nhello\r\n\r\n".to_vec());
    }

    #[test]
    fn from_escape_inverse_on_body_line() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"From: b\r\n\r\n>From space\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.windows(14).any(|w| w == b">>From space\r\n"));
    }

    #[test]
    fn escape_applies_regardless_of_gt_run_length() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"X\r\n\r\n>>>From x\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.windows(14).any(|w| w == b">>>>From x\r\n"));
    }

    #[test]
    fn non_from_line_passes_through_unchanged() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"X\r\n\r\nFrolic\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.windows(9).any(|w| w == b"Frolic\r\n"));
        assert!(!out.windows(10).any(|w| w == b">Frolic\r\n"));
    }

    #[test]
    fn straddling_from_across_write_calls_still_escaped() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"X\r\n\r\n>>From").unwrap();
        s.write(b" space\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.windows(15).any(|w| w == b">>>From space\r\n"));
    }

    #[test]
    fn straddling_non_from_across_write_calls_not_escaped() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"X\r\n\r\n>>Fro").unwrap();
        s.write(b"zen\r\n").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.windows(10).any(|w| w == b">>Frozen\r\n"));
    }

    #[test]
    fn unterminated_final_line_gets_missing_eol_appended() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"X: 1\r\n\r\nno trailing eol").unwrap();
        s.finish().unwrap();
        let out = into_bytes(s);
        assert!(out.ends_with(b"no trailing eol\r\n\r\n"));
    }

    #[test]
    fn close_without_finish_truncates_to_start() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"will be discarded\r\n").unwrap();
        s.close().unwrap();
        let out = into_bytes(s);
        assert!(out.is_empty());
    }

    #[test]
    fn close_without_finish_after_prior_message_preserves_it() {
        let mut first = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        first.write(b"From: a\r\n\r\nkept\r\n").unwrap();
        first.finish().unwrap();
        let cursor = into_bytes(first);
        let kept_len = cursor.len();

        let mut second = MboxMsgOutputStream::new(Cursor::new(cursor));
        second.write(b"From: b\r\n\r\ndiscarded\r\n").unwrap();
        second.close().unwrap();
        let out = into_bytes(second);
        assert_eq!(out.len(), kept_len);
    }

    #[test]
    fn write_after_close_is_an_error() {
        let mut s = MboxMsgOutputStream::new(Cursor::new(Vec::new()));
        s.write(b"x\r\n").unwrap();
        s.finish().unwrap();
        assert!(s.write(b"more").is_err());
    }
}
