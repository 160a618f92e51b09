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

//! maildir backend: a folder is a directory with `tmp/`/`cur/` children, each message is
//! its own file, and `storeToken` is the message's filename in full (§4.6). Subfolders
//! live in a sibling `.sbd/` directory, the same convention the mbox backend uses.

pub mod filename;

use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::StoreError;
use crate::header_reader::{Header, HeaderReader};
use crate::line_reader::LineReader;
use crate::msghdr::{Flags, MsgHdr};
use crate::quarantine::QuarantinedOutputStream;
use crate::store::{CompactionOutcome, CopyOutcome, RetainedMessage, RetentionDecision, Store};
use filename::MaildirFilename;

use super::{is_ignorable_sbd_entry, sbd_dir_for};

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn tmp_dir(folder: &Path) -> PathBuf {
    folder.join("tmp")
}

fn cur_dir(folder: &Path) -> PathBuf {
    folder.join("cur")
}

fn find_header(data: &[u8], name: &str) -> Option<Header> {
    let mut lr = LineReader::new();
    let mut hr = HeaderReader::new();
    let mut found: Option<Header> = None;
    hr.feed(data, &mut lr, |h| {
        if found.is_none() && h.name_str().eq_ignore_ascii_case(name) {
            found = Some(h);
        }
    });
    found
}

/// Rewrite one header's value in place within a whole-message file, padding with spaces
/// to the existing raw value width. `Ok(false)` means the header wasn't found, or
/// `new_value` didn't fit in the space available.
fn rewrite_header_value_in_place(file: &mut File, header_name: &str, new_value: &str) -> Result<bool, StoreError> {
    let mut buf = vec![0u8; 4096];
    file.seek(SeekFrom::Start(0))?;
    let n = file.read(&mut buf)?;
    buf.truncate(n);

    let header = match find_header(&buf, header_name) {
        Some(h) => h,
        None => return Ok(false),
    };
    let raw_len = header.raw_value_length as usize;
    if new_value.len() > raw_len {
        return Ok(false);
    }
    let mut padded = new_value.as_bytes().to_vec();
    padded.resize(raw_len, b' ');
    file.seek(SeekFrom::Start(header.raw_value_pos))?;
    file.write_all(&padded)?;
    Ok(true)
}

pub enum MaildirPending {
    Direct { tmp_path: PathBuf, file: File },
    Quarantined { tmp_path: PathBuf, stream: QuarantinedOutputStream<File> },
}

/// A pending compaction: files already relocated out of `cur/` into a scratch
/// directory, waiting for the caller's database commit before they're deleted for
/// good (or restored, on rollback).
pub struct MaildirCompactionStaged {
    scratch_dir: PathBuf,
    removed: Vec<(PathBuf, PathBuf)>,
    pub(crate) original_size: u64,
    pub(crate) final_size: u64,
    pub(crate) retained: Vec<RetainedMessage>,
}

#[derive(Default)]
pub struct MaildirStore;

impl MaildirStore {
    pub fn new() -> Self {
        Self
    }

    fn folder_size(folder: &Path) -> u64 {
        fs::read_dir(cur_dir(folder))
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl Store for MaildirStore {
    type Pending = MaildirPending;
    type Staged = MaildirCompactionStaged;

    fn discover_sub_folders(&self, folder: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let sbd = sbd_dir_for(folder);
        if !sbd.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&sbd)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_ignorable_sbd_entry(&name) || !entry.path().is_dir() {
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
        let path = sbd.join(&encoded);
        if path.exists() {
            return Err(StoreError::new(crate::error::ErrorKind::Policy, "folder exists")
                .with_bundle_key("folderExists"));
        }
        fs::create_dir_all(tmp_dir(&path))?;
        fs::create_dir_all(cur_dir(&path))?;
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
        if folder.is_dir() {
            fs::remove_dir_all(folder)?;
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
        let dst = sbd.join(name);
        fs::create_dir_all(tmp_dir(&dst))?;
        fs::create_dir_all(cur_dir(&dst))?;
        for entry in fs::read_dir(cur_dir(src))? {
            let entry = entry?;
            fs::copy(entry.path(), cur_dir(&dst).join(entry.file_name()))?;
        }
        if move_it {
            self.delete_folder(src)?;
        }
        Ok(dst)
    }

    fn has_space_available(&self, _folder: &Path, _additional_bytes: u64, _config: &StoreConfig) -> Result<bool, StoreError> {
        // maildir has no single-file size ceiling; always reports space available.
        Ok(true)
    }

    fn is_summary_file_valid(&self, folder: &Path, db: &Database, config: &StoreConfig) -> Result<bool, StoreError> {
        if !db.summary_valid() {
            return Ok(false);
        }
        let size = Self::folder_size(folder);
        if size != db.folder_size {
            return Ok(false);
        }
        if let (Ok(meta), Some(cached)) = (fs::metadata(cur_dir(folder)), db.folder_date) {
            if let Ok(mtime) = meta.modified() {
                let drift = match mtime.duration_since(cached) {
                    Ok(d) => d,
                    Err(e) => e.duration(),
                };
                if drift.as_secs() as i64 > config.time_stamp_leeway_secs {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn set_summary_file_valid(&self, folder: &Path, db: &mut Database, valid: bool) -> Result<(), StoreError> {
        if valid {
            db.folder_size = Self::folder_size(folder);
            db.folder_date = fs::metadata(cur_dir(folder)).ok().and_then(|m| m.modified().ok());
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
        fs::create_dir_all(tmp_dir(folder))?;
        let name = MaildirFilename::generate().to_string();
        let tmp_path = tmp_dir(folder).join(&name);
        let file = File::create(&tmp_path)?;

        let msg_key = db.next_msg_key();
        let hdr = MsgHdr::new(msg_key, name);

        let pending = if config.quarantine_enabled {
            MaildirPending::Quarantined {
                tmp_path,
                stream: QuarantinedOutputStream::new(file),
            }
        } else {
            MaildirPending::Direct { tmp_path, file }
        };
        Ok((hdr, pending))
    }

    fn write_new_message(&self, pending: &mut Self::Pending, data: &[u8]) -> Result<(), StoreError> {
        match pending {
            MaildirPending::Direct { file, .. } => file.write_all(data).map_err(StoreError::from),
            MaildirPending::Quarantined { stream, .. } => stream.write(data),
        }
    }

    fn discard_new_message(&self, _folder: &Path, pending: Self::Pending) -> Result<(), StoreError> {
        let tmp_path = match &pending {
            MaildirPending::Direct { tmp_path, .. } => tmp_path.clone(),
            MaildirPending::Quarantined { tmp_path, .. } => tmp_path.clone(),
        };
        let _ = fs::remove_file(&tmp_path);
        Ok(())
    }

    fn finish_new_message(&self, folder: &Path, mut hdr: MsgHdr, pending: Self::Pending) -> Result<MsgHdr, StoreError> {
        let tmp_path = match pending {
            MaildirPending::Direct { tmp_path, mut file } => {
                file.flush()?;
                tmp_path
            }
            MaildirPending::Quarantined { tmp_path, mut stream } => {
                stream.finish()?;
                tmp_path
            }
        };
        fs::create_dir_all(cur_dir(folder))?;
        let cur_path = cur_dir(folder).join(&hdr.store_token);
        fs::rename(&tmp_path, &cur_path)?;
        hdr.message_size = fs::metadata(&cur_path).map(|m| m.len()).unwrap_or(0);
        Ok(hdr)
    }

    fn get_msg_input_stream(&self, folder: &Path, store_token: &str) -> Result<Box<dyn Read>, StoreError> {
        let path = cur_dir(folder).join(store_token);
        let file = File::open(&path)?;
        Ok(Box::new(file))
    }

    fn delete_messages(&self, folder: &Path, hdrs: &mut [&mut MsgHdr]) -> Result<(), StoreError> {
        for hdr in hdrs.iter_mut() {
            let path = cur_dir(folder).join(&hdr.store_token);
            let _ = fs::remove_file(path);
            hdr.flags.set(Flags::EXPUNGED, true);
        }
        Ok(())
    }

    /// Copy (and, for a move, then delete) every message's file directly, as an
    /// undo transaction: a failure partway through reverses every copy and removal
    /// already performed rather than leaving `dst_folder`/`src_folder` half done.
    fn copy_messages(&self, move_it: bool, src_folder: &Path, hdrs: &[MsgHdr], dst_folder: &Path) -> Result<CopyOutcome, StoreError> {
        fs::create_dir_all(cur_dir(dst_folder))?;

        let mut copied: Vec<PathBuf> = Vec::new();
        for hdr in hdrs {
            let src = cur_dir(src_folder).join(&hdr.store_token);
            let dst = cur_dir(dst_folder).join(&hdr.store_token);
            if let Err(e) = fs::copy(&src, &dst) {
                for path in &copied {
                    let _ = fs::remove_file(path);
                }
                return Err(StoreError::from(e));
            }
            copied.push(dst);
        }

        if move_it {
            let mut removed: Vec<(PathBuf, PathBuf)> = Vec::new();
            for hdr in hdrs {
                let src = cur_dir(src_folder).join(&hdr.store_token);
                let dst = cur_dir(dst_folder).join(&hdr.store_token);
                if let Err(e) = fs::remove_file(&src) {
                    // Undo: restore every source already removed, then drop every copy
                    // made at the destination, leaving both folders as they started.
                    for (removed_src, removed_dst) in &removed {
                        let _ = fs::copy(removed_dst, removed_src);
                    }
                    for path in &copied {
                        let _ = fs::remove_file(path);
                    }
                    return Err(StoreError::from(e));
                }
                removed.push((src, dst));
            }
        }

        Ok(CopyOutcome::Handled)
    }

    fn change_flags(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], mask: Flags, set: bool) -> Result<(), StoreError> {
        for hdr in hdrs.iter_mut() {
            hdr.flags.set(mask, set);
            let on_disk = hdr.flags.on_disk();
            let path = cur_dir(folder).join(&hdr.store_token);
            let mut file = File::options().read(true).write(true).open(&path)?;
            rewrite_header_value_in_place(&mut file, "X-Mozilla-Status", &format!("{:04x}", on_disk.low16()))?;
            rewrite_header_value_in_place(&mut file, "X-Mozilla-Status2", &format!("{:08x}", on_disk.high16()))?;
        }
        Ok(())
    }

    fn change_keywords(&self, folder: &Path, hdrs: &mut [&mut MsgHdr], keywords: &[String], add: bool) -> Result<(), StoreError> {
        for hdr in hdrs.iter_mut() {
            let mut current: Vec<String> = hdr.keywords.split_whitespace().map(|s| s.to_string()).collect();
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
            let path = cur_dir(folder).join(&hdr.store_token);
            let mut file = File::options().read(true).write(true).open(&path)?;
            let fit = rewrite_header_value_in_place(&mut file, "X-Mozilla-Keys", &hdr.keywords)?;
            hdr.grow_keywords = !fit;
        }
        Ok(())
    }

    fn scan_messages(&self, folder: &Path, callback: &mut dyn FnMut(&str, &[u8]) -> bool) -> Result<(), StoreError> {
        let dir = cur_dir(folder);
        if !dir.is_dir() {
            return Ok(());
        }
        let mut names: Vec<_> = fs::read_dir(&dir)?.filter_map(|e| e.ok()).map(|e| e.file_name()).collect();
        names.sort();
        for name in names {
            let name = name.to_string_lossy().into_owned();
            let data = fs::read(dir.join(&name))?;
            if !callback(&name, &data) {
                break;
            }
        }
        Ok(())
    }

    fn begin_compaction(
        &self,
        folder: &Path,
        _config: &StoreConfig,
        retain: &mut dyn FnMut(&str) -> RetentionDecision,
    ) -> Result<Self::Staged, StoreError> {
        let dir = cur_dir(folder);
        let scratch_dir = folder.join(".compact-temp");
        fs::create_dir_all(&scratch_dir)?;

        let original_size = Self::folder_size(folder);
        let mut removed = Vec::new();
        let mut retained = Vec::new();

        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                match retain(&name) {
                    Some((flags, keywords)) => {
                        let mut file = File::options().read(true).write(true).open(entry.path())?;
                        let on_disk = flags.on_disk();
                        rewrite_header_value_in_place(&mut file, "X-Mozilla-Status", &format!("{:04x}", on_disk.low16()))?;
                        rewrite_header_value_in_place(&mut file, "X-Mozilla-Status2", &format!("{:08x}", on_disk.high16()))?;
                        rewrite_header_value_in_place(&mut file, "X-Mozilla-Keys", &keywords.join(" "))?;
                        let size = entry.metadata()?.len();
                        retained.push(RetainedMessage {
                            old_token: name.clone(),
                            new_token: name,
                            size,
                        });
                    }
                    None => {
                        let staged = scratch_dir.join(&name);
                        fs::rename(entry.path(), &staged)?;
                        removed.push((entry.path(), staged));
                    }
                }
            }
        }

        let final_size = Self::folder_size(folder);
        Ok(MaildirCompactionStaged {
            scratch_dir,
            removed,
            original_size,
            final_size,
            retained,
        })
    }

    fn commit_compaction(&self, _folder: &Path, staged: Self::Staged) -> Result<CompactionOutcome, StoreError> {
        // The live change already happened in `begin_compaction` (retained messages were
        // patched in place in `cur/`, dropped ones relocated into the scratch backup), so
        // there is nothing left to make live here. The scratch backup is kept on disk
        // until `finalize_compaction` so a crash before the caller's database commit
        // still has it available for recovery.
        Ok(CompactionOutcome {
            original_size: staged.original_size,
            final_size: staged.final_size,
            retained: staged.retained,
        })
    }

    fn finalize_compaction(&self, folder: &Path) -> Result<(), StoreError> {
        let scratch_dir = folder.join(".compact-temp");
        let _ = fs::remove_dir_all(&scratch_dir);
        Ok(())
    }

    fn rollback_compaction(&self, _folder: &Path, staged: Self::Staged) -> Result<(), StoreError> {
        for (orig, staged_path) in &staged.removed {
            fs::rename(staged_path, orig)?;
        }
        let _ = fs::remove_dir(&staged.scratch_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn deliver(store: &MaildirStore, folder: &Path, db: &mut Database, config: &StoreConfig, body: &[u8]) -> MsgHdr {
        let (hdr, mut pending) = store.get_new_msg_output_stream(folder, db, config).unwrap();
        store.write_new_message(&mut pending, body).unwrap();
        let hdr = store.finish_new_message(folder, hdr, pending).unwrap();
        db.insert(hdr.clone());
        hdr
    }

    #[test]
    fn delivered_message_lands_in_cur() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MaildirStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let hdr = deliver(&store, &folder, &mut db, &config, b"Subject: hi\r\n\r\nbody\r\n");
        assert!(cur_dir(&folder).join(&hdr.store_token).exists());
        assert!(!tmp_dir(&folder).join(&hdr.store_token).exists());
    }

    #[test]
    fn discard_removes_tmp_file() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MaildirStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let (_hdr, mut pending) = store.get_new_msg_output_stream(&folder, &mut db, &config).unwrap();
        store.write_new_message(&mut pending, b"x").unwrap();
        let tmp_path = match &pending {
            MaildirPending::Direct { tmp_path, .. } => tmp_path.clone(),
            _ => unreachable!(),
        };
        store.discard_new_message(&folder, pending).unwrap();
        assert!(!tmp_path.exists());
    }

    #[test]
    fn change_flags_rewrites_status_header() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MaildirStore::new();
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
        let data = fs::read(cur_dir(&folder).join(&hdr.store_token)).unwrap();
        assert!(String::from_utf8_lossy(&data).contains("X-Mozilla-Status: 0001"));
    }

    #[test]
    fn compaction_moves_dropped_messages_to_scratch_then_finalize_deletes() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        let store = MaildirStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let keep = deliver(&store, &folder, &mut db, &config, b"Subject: keep\r\n\r\nbody\r\n");
        let drop = deliver(&store, &folder, &mut db, &config, b"Subject: drop\r\n\r\nbody\r\n");

        let keep_token = keep.store_token.clone();
        let mut retain = |token: &str| -> RetentionDecision {
            if token == keep_token {
                Some((Flags::default(), Vec::new()))
            } else {
                None
            }
        };
        let staged = store.begin_compaction(&folder, &config, &mut retain).unwrap();
        assert!(!cur_dir(&folder).join(&drop.store_token).exists());
        let scratch_dir = folder.join(".compact-temp");
        assert!(scratch_dir.join(&drop.store_token).exists());

        let outcome = store.commit_compaction(&folder, staged).unwrap();
        assert_eq!(outcome.retained.len(), 1);
        assert!(cur_dir(&folder).join(&keep.store_token).exists());
        // The dropped message's backup is still on disk until finalize commits it away.
        assert!(scratch_dir.join(&drop.store_token).exists());

        store.finalize_compaction(&folder).unwrap();
        assert!(!scratch_dir.exists());
    }

    #[test]
    fn copy_messages_moves_files_between_folders() {
        let dir = tempdir().unwrap();
        let src_folder = dir.path().join("INBOX");
        let dst_folder = dir.path().join("Archive");
        let store = MaildirStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let hdr = deliver(&store, &src_folder, &mut db, &config, b"Subject: hi\r\n\r\nbody\r\n");
        store.copy_messages(true, &src_folder, &[hdr.clone()], &dst_folder).unwrap();

        assert!(!cur_dir(&src_folder).join(&hdr.store_token).exists());
        assert!(cur_dir(&dst_folder).join(&hdr.store_token).exists());
    }

    #[test]
    fn copy_messages_rolls_back_partial_copy_on_error() {
        let dir = tempdir().unwrap();
        let src_folder = dir.path().join("INBOX");
        let dst_folder = dir.path().join("Archive");
        let store = MaildirStore::new();
        let mut db = Database::new();
        let config = StoreConfig::default();

        let ok = deliver(&store, &src_folder, &mut db, &config, b"Subject: ok\r\n\r\nbody\r\n");
        let mut missing = ok.clone();
        missing.store_token = "does-not-exist".to_string();

        let result = store.copy_messages(true, &src_folder, &[ok.clone(), missing], &dst_folder);
        assert!(result.is_err());

        // The first message's copy must be rolled back, and its source left untouched,
        // rather than leaving a half-moved folder pair behind.
        assert!(!cur_dir(&dst_folder).join(&ok.store_token).exists());
        assert!(cur_dir(&src_folder).join(&ok.store_token).exists());
    }

    #[test]
    fn discover_sub_folders_lists_only_directories() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("INBOX");
        fs::create_dir_all(&folder).unwrap();
        let sbd = sbd_dir_for(&folder);
        fs::create_dir_all(sbd.join("Work")).unwrap();
        File::create(sbd.join("stray.msf")).unwrap();

        let store = MaildirStore::new();
        let subs = store.discover_sub_folders(&folder).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].file_name().unwrap(), "Work");
    }
}
