/*
 * mod.rs
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

//! mbox backend: one append-only file per folder, `storeToken` is the decimal byte
//! offset of a message's `From ` line, and subfolders live in a sibling `<name>.sbd/`
//! directory (§4.6).

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::StoreError;
use crate::header_reader::{Header, HeaderReader};
use crate::line_reader::LineReader;
use crate::mbox_output_stream::MboxMsgOutputStream;
use crate::msghdr::{Flags, MsgHdr};
use crate::quarantine::QuarantinedOutputStream;
use crate::store::{CompactionOutcome, CopyOutcome, RetainedMessage, RetentionDecision, Store};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{is_ignorable_sbd_entry, sbd_dir_for};

fn find_eol(data: &[u8], start: usize) -> usize {
    match data[start..].iter().position(|&b| b == b'\n') {
        Some(p) => start + p + 1,
        None => data.len(),
    }
}

/// Scan a well-formed mbox buffer (every message terminated by `MboxMsgOutputStream`'s
/// blank separator line, including the last one) into `(from_line_start, content_end)`
/// spans. `content_end` is the offset of the separator's blank line, exclusive.
fn scan_mbox(data: &[u8]) -> Result<Vec<(u64, u64)>, StoreError> {
    let len = data.len();
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < len {
        if !data[pos..].starts_with(b"From ") {
            return Err(StoreError::corrupt("mbox message does not begin with From "));
        }
        let from_start = pos;
        let mut i = pos;
        loop {
            let eol = find_eol(data, i);
            let line = &data[i..eol];
            if line == b"\r\n" || line == b"\n" {
                out.push((from_start as u64, i as u64));
                pos = eol;
                break;
            }
            if eol >= len {
                out.push((from_start as u64, len as u64));
                pos = len;
                break;
            }
            i = eol;
        }
    }
    Ok(out)
}

/// Locate a header by name within a message's raw bytes, returning it together with
/// the byte offset (within `data`) at which its raw value region begins.
fn find_header(data: &[u8], name: &str) -> Option<(Header, u64)> {
    let mut lr = LineReader::new();
    let mut hr = HeaderReader::new();
    let mut found: Option<Header> = None;
    hr.feed(data, &mut lr, |h| {
        if found.is_none() && h.name_str().eq_ignore_ascii_case(name) {
            found = Some(h);
        }
    });
    found.map(|h| {
        let pos = h.raw_value_pos;
        (h, pos)
    })
}

/// Rewrite one header's value in place at `message_offset` within `file`, padding with
/// spaces to the existing raw value width. Returns `Ok(false)` (no write performed) if
/// the header isn't present, or if `new_value` is longer than the space available.
fn rewrite_header_value_in_place(
    file: &mut File,
    message_offset: u64,
    header_name: &str,
    new_value: &str,
) -> Result<bool, StoreError> {
    let mut buf = vec![0u8; 4096];
    file.seek(SeekFrom::Start(message_offset))?;
    let n = file.read(&mut buf)?;
    buf.truncate(n);

    let mut skip = 0usize;
    if buf.starts_with(b"From ") {
        skip = find_eol(&buf, 0);
    }
    let header_region = &buf[skip..];

    let (header, rel_pos) = match find_header(header_region, header_name) {
        Some(h) => h,
        None => return Ok(false),
    };
    let raw_len = header.raw_value_length as usize;
    if new_value.len() > raw_len {
        return Ok(false);
    }
    let mut padded = new_value.as_bytes().to_vec();
    padded.resize(raw_len, b' ');
    let abs_offset = message_offset + skip as u64 + rel_pos;
    file.seek(SeekFrom::Start(abs_offset))?;
    file.write_all(&padded)?;
    Ok(true)
}

/// Pending new-message write: either direct to the live file, or staged entirely
/// in memory so `finish_new_message` can run it through quarantine before the bytes
/// ever touch the live store.
pub enum MboxPending {
    Direct(MboxMsgOutputStream<File>),
    Quarantined {
        stream: MboxMsgOutputStream<Cursor<Vec<u8>>>,
        target: File,
    },
}

/// Completed rewrite of one folder's mbox file, staged under `<name>.compact-temp/` and
/// not yet swapped into place.
pub struct MboxCompactionStaged {
    folder: PathBuf,
    scratch_dir: PathBuf,
    original_path: PathBuf,
    compacted_path: PathBuf,
    pub(crate) original_size: u64,
    pub(crate) final_size: u64,
    pub(crate) retained: Vec<RetainedMessage>,
}

/// Scratch directory and member paths a compaction of `folder` uses, derived
/// deterministically from `folder`'s name so `finalize_compaction` can recompute them
/// without needing the `Staged` value (already consumed by `commit_compaction`).
fn compaction_paths(folder: &Path) -> Result<(PathBuf, PathBuf, PathBuf, PathBuf), StoreError> {
    let dir = folder.parent().unwrap_or_else(|| Path::new("."));
    let name = folder
        .file_name()
        .ok_or_else(|| StoreError::corrupt("folder has no file name"))?
        .to_string_lossy()
        .into_owned();
    let scratch_dir = dir.join(format!("{name}.compact-temp"));
    let compacting_path = scratch_dir.join(format!("{name}.compacting"));
    let compacted_path = scratch_dir.join(format!("{name}.compacted"));
    let original_path = scratch_dir.join(format!("{name}.original"));
    Ok((scratch_dir, compacting_path, compacted_path, original_path))
}

/// mbox backend. Caches one open, append-positioned file handle per folder so repeated
/// deliveries in a batch don't reopen the file each time (§5: single-writer, so there's
/// never more than one live handle per path).
#[derive(Default)]
pub struct MboxStore {
    handles: Mutex<HashMap<PathBuf, File>>,
}

impl MboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_append_handle(&self, folder: &Path) -> Result<File, StoreError> {
        let mut handles = self.handles.lock().unwrap();
        if let Some(f) = handles.get(folder) {
            return f.try_clone().map_err(StoreError::from);
        }
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(folder)?;
        let clone = f.try_clone()?;
        handles.insert(folder.to_path_buf(), f);
        Ok(clone)
    }
}

impl Store for MboxStore {
    type Pending = MboxPending;
    type Staged = MboxCompactionStaged;

    fn discover_sub_folders(&self, folder: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let sbd = sbd_dir_for(folder);
        if !sbd.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&sbd)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_ignorable_sbd_entry(&name) || entry.path().is_dir() {
                continue;
            }
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }

    fn create_folder(&self, parent: &Path, name: &str) -> Result<PathBuf, StoreError> {
        let encoded = crate::localstorage::mailbox_name_codec::encode(name);
        let sbd = sbd_dir_for(parent);
        fs::create_dir_all(&sbd)?;
        let path = sbd.join(&encoded);
        if path.exists() {
            return Err(StoreError::new(crate::error::ErrorKind::Policy, "folder exists")
                .with_bundle_key("folderExists"));
        }
        File::create(&path)?;
        Ok(path)
    }

    fn rename_folder(&self, folder: &Path, new_name: &str) -> Result<PathBuf, StoreError> {
        let encoded = crate::localstorage::mailbox_name_codec::encode(new_name);
        let new_path = folder
            .parent()
            .ok_or_else(|| StoreError::corrupt("folder has no parent"))?
            .join(&encoded);
        fs::rename(folder, &new_path)?;
        let old_sbd = sbd_dir_for(folder);
        if old_sbd.is_dir() {
            fs::rename(&old_sbd, sbd_dir_for(&new_path))?;
        }
        Ok(new_path)
    }

    fn delete_folder(&self, folder: &Path) -> Result<(), StoreError> {
        self.handles.lock().unwrap().remove(folder);
        if folder.exists() {
            fs::remove_file(folder)?;
        }
        let sbd = sbd_dir_for(folder);
        if sbd.is_dir() {
            fs::remove_dir_all(&sbd)?;
        }
        Ok(())
    }

    fn copy_folder(&self, src: &Path, dst_parent: &Path, move_it: bool) -> Result<PathBuf, StoreError> {
        let name = src
            .file_name()
            .ok_or_else(|| StoreError::corrupt("source folder has no file name"))?;
        let sbd = sbd_dir_for(dst_parent);
        fs::create_dir_all(&sbd)?;
        let dst = sbd.join(name);
        fs::copy(src, &dst)?;
        if move_it {
            self.delete_folder(src)?;
        }
        Ok(dst)
    }

    fn has_space_available(&self, folder: &Path, additional_bytes: u64, config: &StoreConfig) -> Result<bool, StoreError> {
        if config.mbox_size_cap_enabled {
            let current = fs::metadata(folder).map(|m| m.len()).unwrap_or(0);
            if current + additional_bytes > crate::config::MBOX_SIZE_CAP_BYTES {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_summary_file_valid(&self, folder: &Path, db: &Database, config: &StoreConfig) -> Result<bool, StoreError> {
        if !db.summary_valid() {
            return Ok(false);
        }
        let meta = match fs::metadata(folder) {
            Ok(m) => m,
            Err(_) => return Ok(false),
        };
        if meta.len() != db.folder_size {
            return Ok(false);
        }
        if let (Ok(mtime), Some(cached)) = (meta.modified(), db.folder_date) {
            let drift = match mtime.duration_since(cached) {
                Ok(d) => d,
                Err(e) => e.duration(),
            };
            if drift.as_secs() as i64 > config.time_stamp_leeway_secs {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn set_summary_file_valid(&self, folder: &Path, db: &mut Database, valid: bool) -> Result<(), StoreError> {
        if valid {
            let meta = fs::metadata(folder)?;
            db.folder_size = meta.len();
            db.folder_date = meta.modified().ok();
        }
        db.set_summary_valid(valid);
        Ok(())
    }

    fn get_new_msg_output_stream(
        &self,
        folder: &Path,
        db: &mut Database,
        config: &StoreConfig,
    ) -> Result<(MsgHdr, Self::Pending), StoreError> {
        let mut file = self.open_append_handle(folder)?;
        let offset = file.seek(SeekFrom::End(0))?;
        let msg_key = db.next_msg_key();
        let mut hdr = MsgHdr::new(msg_key, offset.to_string());
        hdr.message_offset = offset;

        let pending = if config.quarantine_enabled {
            MboxPending::Quarantined {
                stream: MboxMsgOutputStream::new(Cursor::new(Vec::new())),
                target: file,
            }
        } else {
            MboxPending::Direct(MboxMsgOutputStream::new(file))
        };
        Ok((hdr, pending))
    }

    fn write_new_message(&self, pending: &mut Self::Pending, data: &[u8]) -> Result<(), StoreError> {
        match pending {
            MboxPending::Direct(s) => s.write(data),
            MboxPending::Quarantined { stream, .. } => stream.write(data),
        }
    }

    fn discard_new_message(&self, _folder: &Path, pending: Self::Pending) -> Result<(), StoreError> {
        match pending {
            MboxPending::Direct(mut s) => s.close(),
            // nothing has touched the live file yet; the in-memory buffer is simply dropped.
            MboxPending::Quarantined { mut stream, .. } => stream.close(),
        }
    }

    fn finish_new_message(&self, _folder: &Path, mut hdr: MsgHdr, pending: Self::Pending) -> Result<MsgHdr, StoreError> {
        match pending {
            MboxPending::Direct(mut s) => {
                s.finish()?;
            }
            MboxPending::Quarantined { mut stream, target } => {
                stream.finish()?;
                let escaped = stream.into_inner().into_inner();
                let mut quarantined = QuarantinedOutputStream::new(target);
                quarantined.write(&escaped)?;
                quarantined.finish()?;
            }
        }
        hdr.message_size = 0; // filled in by the caller from the header-parse pass, not the store
        Ok(hdr)
    }

    fn get_msg_input_stream(&self, folder: &Path, store_token: &str) -> Result<Box<dyn Read>, StoreError> {
        let offset: u64 = store_token
            .parse()
            .map_err(|_| StoreError::corrupt("storeToken is not a valid mbox offset"))?;
        let data = fs::read(folder)?;
        let spans = scan_mbox(&data)?;
        let (start, end) = spans
            .into_iter()
            .find(|(s, _)| *s == offset)
            .ok_or_else(|| StoreError::corrupt("storeToken does not address a message"))?;
        Ok(Box::new(Cursor::new(data[start as usize..end as usize].to_vec())))
    }

    fn delete_messages(&self, folder: &Path, hdrs: &mut [&mut MsgHdr]) -> Result<(), StoreError> {
        // Physical removal is deferred to compaction; deletion here only marks the
        // in-memory header, which the caller (the index layer) is responsible for
        // persisting.
        let _ = folder;
        for hdr in hdrs.iter_mut() {
            hdr.flags.set(Flags::EXPUNGED, true);
        }
        Ok(())
    }

    fn copy_messages(&self, _move_it: bool, _src_folder: &Path, _hdrs: &[MsgHdr], _dst_folder: &Path) -> Result<CopyOutcome, StoreError> {
        // mbox has no cheap server-side copy primitive; the caller streams the message
        // through `get_msg_input_stream` / `get_new_msg_output_stream` itself.
        Ok(CopyOutcome::CallerMustStreamCopy)
    }

    fn change_flags(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], mask: Flags, set: bool) -> Result<(), StoreError> {
        let mut file = self.open_append_handle(folder)?;
        for hdr in hdrs.iter_mut() {
            hdr.flags.set(mask, set);
            let on_disk = hdr.flags.on_disk();
            rewrite_header_value_in_place(
                &mut file,
                hdr.message_offset,
                "X-Mozilla-Status",
                &format!("{:04x}", on_disk.low16()),
            )?;
            rewrite_header_value_in_place(
                &mut file,
                hdr.message_offset,
                "X-Mozilla-Status2",
                &format!("{:08x}", on_disk.high16()),
            )?;
        }
        Ok(())
    }

    fn change_keywords(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], keywords: &[String], add: bool) -> Result<(), StoreError> {
        let mut file = self.open_append_handle(folder)?;
        for hdr in hdrs.iter_mut() {
            let mut current: Vec<String> = hdr
                .keywords
                .split_whitespace()
                .map(|s| s.to_string())
                .collect();
            if add {
                for k in keywords {
                    if !current.contains(k) {
                        current.push(k.clone());
                    }
                }
            } else {
                current.retain(|k| !keywords.contains(k));
            }
            hdr.keywords = current.join(" ");
            let fit = rewrite_header_value_in_place(
                &mut file,
                hdr.message_offset,
                "X-Mozilla-Keys",
                &hdr.keywords,
            )?;
            hdr.grow_keywords = !fit;
        }
        Ok(())
    }

    fn scan_messages(&self, folder: &Path, callback: &mut dyn FnMut(&str, &[u8]) -> bool) -> Result<(), StoreError> {
        let data = fs::read(folder)?;
        let spans = scan_mbox(&data)?;
        for (start, end) in spans {
            let keep_going = callback(&start.to_string(), &data[start as usize..end as usize]);
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    fn begin_compaction(
        &self,
        folder: &Path,
        config: &StoreConfig,
        retain: &mut dyn FnMut(&str) -> RetentionDecision,
    ) -> Result<Self::Staged, StoreError> {
        let data = fs::read(folder)?;
        let original_size = data.len() as u64;
        let spans = scan_mbox(&data)?;

        let (scratch_dir, compacting_path, compacted_path, original_path) = compaction_paths(folder)?;
        fs::create_dir_all(&scratch_dir)?;
        let mut out = File::create(&compacting_path)?;

        let mut retained = Vec::new();
        let sniff = config.compactor_sniff_window;
        for (start, end) in spans {
            let token = start.to_string();
            let Some((flags, keywords)) = retain(&token) else {
                continue;
            };
            let msg = &data[start as usize..end as usize];
            let new_offset = out.stream_position()?;
            write_patched_message(&mut out, msg, flags, &keywords, sniff)?;
            out.write_all(b"\r\n")?;
            retained.push(RetainedMessage {
                old_token: token,
                new_token: new_offset.to_string(),
                size: (end - start),
            });
        }
        out.flush()?;
        drop(out);

        fs::rename(&compacting_path, &compacted_path)?;
        let final_size = fs::metadata(&compacted_path)?.len();

        self.handles.lock().unwrap().remove(folder);
        fs::rename(folder, &original_path)?;

        Ok(MboxCompactionStaged {
            folder: folder.to_path_buf(),
            scratch_dir,
            original_path,
            compacted_path,
            original_size,
            final_size,
            retained,
        })
    }

    fn commit_compaction(&self, _folder: &Path, staged: Self::Staged) -> Result<CompactionOutcome, StoreError> {
        fs::rename(&staged.compacted_path, &staged.folder)?;
        Ok(CompactionOutcome {
            original_size: staged.original_size,
            final_size: staged.final_size,
            retained: staged.retained,
        })
    }

    fn finalize_compaction(&self, folder: &Path) -> Result<(), StoreError> {
        let (scratch_dir, _compacting_path, _compacted_path, original_path) = compaction_paths(folder)?;
        let _ = fs::remove_file(&original_path);
        let _ = fs::remove_dir(&scratch_dir);
        Ok(())
    }

    fn rollback_compaction(&self, _folder: &Path, staged: Self::Staged) -> Result<(), StoreError> {
        fs::rename(&staged.original_path, &staged.folder)?;
        let _ = fs::remove_file(&staged.compacted_path);
        let _ = fs::remove_dir(&staged.scratch_dir);
        Ok(())
    }
}

/// Reconstruct one message's bytes for compaction: drop the existing
/// `X-Mozilla-Status`/`Status2`/`Keys` headers from the sniffed prefix and emit fresh
/// ones (padded generously so later in-place rewrites have room to grow), then copy the
/// remainder of the header block and the body through unchanged.
fn write_patched_message(
    out: &mut File,
    msg: &[u8],
    flags: Flags,
    keywords: &[String],
    sniff_window: usize,
) -> Result<(), StoreError> {
    let from_end = find_eol(msg, 0);
    out.write_all(&msg[..from_end])?;

    let window_end = msg.len().min(from_end + sniff_window.max(4096));
    let mut lr = LineReader::new();
    let mut hr = HeaderReader::new();
    let mut headers = Vec::new();
    hr.feed(&msg[from_end..window_end], &mut lr, |h| headers.push(h));
    if !hr.is_complete() {
        lr.flush(|line| {
            hr.feed_line(line, |h| headers.push(h));
            true
        });
    }
    let header_block_end = from_end + hr.bytes_fed() as usize;

    let on_disk = flags.on_disk();
    let keyword_value = {
        let joined = keywords.join(" ");
        let width = joined.len().max(80);
        let mut padded = joined.into_bytes();
        padded.resize(width, b' ');
        String::from_utf8(padded).unwrap_or_default()
    };

    for h in &headers {
        let name = h.name_str();
        if name.eq_ignore_ascii_case("X-Mozilla-Status")
            || name.eq_ignore_ascii_case("X-Mozilla-Status2")
            || name.eq_ignore_ascii_case("X-Mozilla-Keys")
        {
            continue;
        }
        out.write_all(&h.name)?;
        out.write_all(b": ")?;
        out.write_all(&h.value)?;
        out.write_all(b"\r\n")?;
    }
    out.write_all(format!("X-Mozilla-Status: {:04x}\r\n", on_disk.low16()).as_bytes())?;
    out.write_all(format!("X-Mozilla-Status2: {:08x}\r\n", on_disk.high16()).as_bytes())?;
    out.write_all(format!("X-Mozilla-Keys: {}\r\n", keyword_value).as_bytes())?;

    out.write_all(&msg[header_block_end..])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn deliver(store: &MboxStore, folder: &Path, db: &mut Database, config: &StoreConfig, body: &[u8]) -> MsgHdr {
        let (hdr, mut pending) = store.get_new_msg_output_stream(folder, db, config).unwrap();
        store.write_new_message(&mut pending, body).unwrap();
        let hdr = store.finish_new_message(folder, hdr, pending).unwrap();
        db.insert(hdr.clone());
        hdr
    }

    #[test]
    fn scan_mbox_finds_both_messages_after_two_deliveries() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        deliver(&store, &folder, &mut db, &config, b"Subject: one\r\n\r\nbody one\r\n");
        deliver(&store, &folder, &mut db, &config, b"Subject: two\r\n\r\nbody two\r\n");

        let data = fs::read(&folder).unwrap();
        let spans = scan_mbox(&data).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].0, 0);
    }

    #[test]
    fn get_msg_input_stream_reads_back_exact_message() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let hdr = deliver(&store, &folder, &mut db, &config, b"Subject: hi\r\n\r\nhello\r\n");
        let mut stream = store.get_msg_input_stream(&folder, &hdr.store_token).unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert!(buf.starts_with(b"From "));
        assert!(buf.windows(5).any(|w| w == b"hello"));
    }

    #[test]
    fn discard_new_message_truncates_back_to_start() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        deliver(&store, &folder, &mut db, &config, b"Subject: kept\r\n\r\nkeep me\r\n");
        let kept_len = fs::metadata(&folder).unwrap().len();

        let (_hdr, mut pending) = store.get_new_msg_output_stream(&folder, &mut db, &config).unwrap();
        store.write_new_message(&mut pending, b"Subject: gone\r\n\r\ndiscard me\r\n").unwrap();
        store.discard_new_message(&folder, pending).unwrap();

        assert_eq!(fs::metadata(&folder).unwrap().len(), kept_len);
    }

    #[test]
    fn discover_sub_folders_ignores_metadata_files() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        File::create(&folder).unwrap();
        let sbd = sbd_dir_for(&folder);
        fs::create_dir_all(&sbd).unwrap();
        File::create(sbd.join("Work")).unwrap();
        File::create(sbd.join("Work.msf")).unwrap();
        File::create(sbd.join(".hidden")).unwrap();

        let store = MboxStore::new();
        let subs = store.discover_sub_folders(&folder).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].file_name().unwrap(), "Work");
    }

    #[test]
    fn change_flags_rewrites_status_header_in_place() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let mut hdr = deliver(
            &store,
            &folder,
            &mut db,
            &config,
            b"X-Mozilla-Status: 0000\r\nX-Mozilla-Status2: 00000000\r\n\r\nbody\r\n",
        );

        store.change_flags(&folder, &mut [&mut hdr], Flags::READ, true).unwrap();
        assert!(hdr.flags.contains(Flags::READ));

        let data = fs::read(&folder).unwrap();
        let text = String::from_utf8_lossy(&data);
        assert!(text.contains("X-Mozilla-Status: 0001"));
    }

    #[test]
    fn change_keywords_sets_grow_flag_when_value_too_wide() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let mut hdr = deliver(
            &store,
            &folder,
            &mut db,
            &config,
            b"X-Mozilla-Keys: \r\n\r\nbody\r\n",
        );

        let long_keyword = vec!["x".repeat(200)];
        store.change_keywords(&folder, &mut [&mut hdr], &long_keyword, true).unwrap();
        assert!(hdr.grow_keywords);
    }

    #[test]
    fn compaction_drops_unretained_messages() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let keep = deliver(&store, &folder, &mut db, &config, b"Subject: keep\r\n\r\nkeep\r\n");
        let _drop = deliver(&store, &folder, &mut db, &config, b"Subject: drop\r\n\r\ndrop\r\n");

        let keep_token = keep.store_token.clone();
        let mut retain = |token: &str| -> RetentionDecision {
            if token == keep_token {
                Some((Flags::default(), Vec::new()))
            } else {
                None
            }
        };
        let staged = store.begin_compaction(&folder, &config, &mut retain).unwrap();
        let outcome = store.commit_compaction(&folder, staged).unwrap();

        assert_eq!(outcome.retained.len(), 1);
        let data = fs::read(&folder).unwrap();
        let text = String::from_utf8_lossy(&data);
        assert!(text.contains("Subject: keep"));
        assert!(!text.contains("Subject: drop"));
    }

    #[test]
    fn finalize_compaction_removes_backup_after_commit() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MboxStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        deliver(&store, &folder, &mut db, &config, b"Subject: keep\r\n\r\nkeep\r\n");

        let mut retain = |_: &str| -> RetentionDecision { Some((Flags::default(), Vec::new())) };
        let staged = store.begin_compaction(&folder, &config, &mut retain).unwrap();
        let (scratch_dir, _, _, original_path) = compaction_paths(&folder).unwrap();
        assert!(original_path.exists());

        store.commit_compaction(&folder, staged).unwrap();
        assert!(fs::read(&folder).unwrap().starts_with(b"From "));
        // Live data is already correct, but the backup is still on disk until finalize.
        assert!(original_path.exists());

        store.finalize_compaction(&folder).unwrap();
        assert!(!original_path.exists());
        assert!(!scratch_dir.exists());
    }
}
