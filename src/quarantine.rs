/*
 * quarantine.rs
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

//! Optional quarantine layer: buffers a message to a temp file first, so a virus
//! scanner (or any other gate) can inspect it before it ever reaches the real store.

use crate::error::StoreError;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Writing,
    Error,
    Closed,
}

/// Wraps a "safe output stream" `W` (one exposing `finish`/`close` commit/rollback,
/// like [`crate::mbox_output_stream::MboxMsgOutputStream`]) with a staging temp file.
/// Nothing reaches `inner` until `finish` succeeds.
pub struct QuarantinedOutputStream<W> {
    inner: W,
    temp: Option<NamedTempFile>,
    state: State,
    last_error: Option<String>,
}

impl<W> QuarantinedOutputStream<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            temp: None,
            state: State::Initial,
            last_error: None,
        }
    }

    pub fn stream_status(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fail(&mut self, e: impl ToString) -> StoreError {
        self.state = State::Error;
        self.last_error = Some(e.to_string());
        StoreError::io(self.last_error.clone().unwrap())
    }

    /// Buffer `data` to the staging temp file, creating it lazily on first call.
    pub fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        match self.state {
            State::Error => return Err(StoreError::io(self.last_error.clone().unwrap_or_default())),
            State::Closed => return Err(StoreError::protocol("write after close")),
            _ => {}
        }
        if self.temp.is_none() {
            let f = NamedTempFile::new().map_err(|e| self.fail(e))?;
            self.temp = Some(f);
        }
        self.state = State::Writing;
        let temp = self.temp.as_mut().expect("just created");
        temp.write_all(data).map_err(|e| self.fail(e))
    }
}

impl<W: crate::mbox_output_stream::Truncatable> QuarantinedOutputStream<W> {
    /// Close the temp file, reopen it for read, and copy its contents into the
    /// wrapped stream, bracketed by a recorded start position so a failure rolls
    /// the wrapped stream back rather than leaving it partially written. If the
    /// wrapped stream is itself a safe output stream, its own `finish` is the
    /// final commit step.
    pub fn finish(&mut self) -> Result<(), StoreError> {
        if self.state == State::Error {
            return Err(StoreError::io(self.last_error.clone().unwrap_or_default()));
        }
        if self.state == State::Closed {
            return Ok(());
        }
        let start_pos = self.inner.stream_position().map_err(|e| self.fail(e))?;
        let result = self.copy_temp_into_inner();
        match result {
            Ok(()) => {
                self.temp = None;
                self.state = State::Closed;
                Ok(())
            }
            Err(e) => {
                let _ = self.inner.seek(SeekFrom::Start(start_pos));
                let _ = self.inner.truncate_to(start_pos);
                self.temp = None;
                self.state = State::Error;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn copy_temp_into_inner(&mut self) -> Result<(), StoreError> {
        let Some(temp) = self.temp.as_mut() else {
            return Ok(());
        };
        temp.flush().map_err(StoreError::from)?;
        let mut reader = temp.reopen().map_err(StoreError::from)?;
        reader.seek(SeekFrom::Start(0)).map_err(StoreError::from)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).map_err(StoreError::from)?;
            if n == 0 {
                break;
            }
            self.inner.write_all(&buf[..n]).map_err(StoreError::from)?;
        }
        Ok(())
    }

    /// Discard the staging temp file without ever touching the wrapped stream.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.temp = None;
        self.state = State::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finish_copies_staged_bytes_into_wrapped_stream() {
        let mut q = QuarantinedOutputStream::new(Cursor::new(Vec::new()));
        q.write(b"hello ").unwrap();
        q.write(b"world").unwrap();
        q.finish().unwrap();
        assert_eq!(q.inner.into_inner(), b"hello world".to_vec());
    }

    #[test]
    fn close_without_finish_discards_everything() {
        let mut q = QuarantinedOutputStream::new(Cursor::new(Vec::new()));
        q.write(b"never lands").unwrap();
        q.close().unwrap();
        assert!(q.inner.into_inner().is_empty());
    }

    #[test]
    fn finish_after_prior_bytes_only_appends_new_message() {
        let mut cursor = Cursor::new(b"existing\r\n\r\n".to_vec());
        cursor.seek(SeekFrom::End(0)).unwrap();
        let mut q = QuarantinedOutputStream::new(cursor);
        q.write(b"new message").unwrap();
        q.finish().unwrap();
        assert_eq!(q.inner.into_inner(), b"existing\r\n\r\nnew message".to_vec());
    }

    #[test]
    fn write_after_close_is_an_error() {
        let mut q = QuarantinedOutputStream::new(Cursor::new(Vec::new()));
        q.write(b"x").unwrap();
        q.finish().unwrap();
        assert!(q.write(b"more").is_err());
    }
}
