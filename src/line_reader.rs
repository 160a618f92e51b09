/*
 * line_reader.rs
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

//! Byte-exact streaming line splitter. Feeds one line at a time (terminator included)
//! to a callback; a trailing partial line carries over to the next `feed` or is flushed
//! terminator-less by `flush`.

/// Splits a byte stream into lines, carrying a partial line across `feed` calls.
#[derive(Debug, Default)]
pub struct LineReader {
    carry: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self { carry: Vec::new() }
    }

    /// True if a partial line is currently buffered.
    pub fn has_carry(&self) -> bool {
        !self.carry.is_empty()
    }

    /// Scan `chunk` for `LF`-terminated lines and pass each (with its carried prefix, if
    /// any) to `callback`. Stops early, discarding the rest of `chunk`, if `callback`
    /// returns `false`; the internal carry buffer is left untouched in that case.
    pub fn feed(&mut self, chunk: &[u8], mut callback: impl FnMut(&[u8]) -> bool) {
        let mut start = 0usize;
        while let Some(rel_nl) = chunk[start..].iter().position(|&b| b == b'\n') {
            let nl = start + rel_nl;
            let line_end = nl + 1;
            let emitted: std::borrow::Cow<[u8]> = if self.carry.is_empty() {
                std::borrow::Cow::Borrowed(&chunk[start..line_end])
            } else {
                let mut joined = std::mem::take(&mut self.carry);
                joined.extend_from_slice(&chunk[start..line_end]);
                std::borrow::Cow::Owned(joined)
            };
            if !callback(&emitted) {
                return;
            }
            start = line_end;
        }
        if start < chunk.len() {
            self.carry.extend_from_slice(&chunk[start..]);
        }
    }

    /// Emit any buffered partial line (without a terminator). No-op if nothing is buffered.
    /// Stopping (`callback` returning `false`) has no further effect since this is the last line.
    pub fn flush(&mut self, mut callback: impl FnMut(&[u8]) -> bool) {
        if self.carry.is_empty() {
            return;
        }
        let carry = std::mem::take(&mut self.carry);
        callback(&carry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_lines(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            reader.feed(chunk, |line| {
                lines.push(line.to_vec());
                true
            });
        }
        reader.flush(|line| {
            lines.push(line.to_vec());
            true
        });
        lines
    }

    #[test]
    fn single_chunk_multiple_lines() {
        let lines = collect_lines(&[b"a\r\nb\nc"]);
        assert_eq!(lines, vec![b"a\r\n".to_vec(), b"b\n".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn byte_exactness_across_arbitrary_chunk_boundaries() {
        let data = b"From: a\r\nSubject: long\r\n folded\r\n\r\nbody line\r\nsecond\r\n";
        for split in 0..=data.len() {
            let (a, b) = data.split_at(split);
            let lines = collect_lines(&[a, b]);
            let joined: Vec<u8> = lines.into_iter().flatten().collect();
            assert_eq!(joined, data.to_vec(), "split at {split} failed");
        }
    }

    #[test]
    fn byte_exactness_one_byte_at_a_time() {
        let data = b"xy\nzzz\nw";
        let mut reader = LineReader::new();
        let mut collected = Vec::new();
        for &b in data {
            reader.feed(&[b], |line| {
                collected.extend_from_slice(line);
                true
            });
        }
        reader.flush(|line| {
            collected.extend_from_slice(line);
            true
        });
        assert_eq!(collected, data.to_vec());
    }

    #[test]
    fn callback_halt_preserves_carry_and_discards_rest() {
        let mut reader = LineReader::new();
        let mut seen = Vec::new();
        reader.feed(b"one\ntwo\nthree\npartial", |line| {
            if line == b"two\n" {
                return false;
            }
            seen.push(line.to_vec());
            true
        });
        assert_eq!(seen, vec![b"one\n".to_vec()]);
        // carry untouched: "three\npartial" was never scanned since we stopped at "two\n"
        assert!(!reader.has_carry());
    }

    #[test]
    fn flush_is_noop_when_nothing_buffered() {
        let mut reader = LineReader::new();
        reader.feed(b"complete\n", |_| true);
        let mut called = false;
        reader.flush(|_| {
            called = true;
            true
        });
        assert!(!called);
    }
}
