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

//! On-disk backends implementing the `Store` trait, plus the filesystem conventions
//! (the `.sbd` subfolder tree, mailbox name encoding) both backends share.

pub mod mailbox_name_codec;
pub mod maildir;
pub mod mbox;

use std::path::{Path, PathBuf};

/// Sibling directory a folder's subfolders live under, e.g. `INBOX` -> `INBOX.sbd`.
pub(crate) fn sbd_dir_for(folder: &Path) -> PathBuf {
    let mut os = folder.as_os_str().to_owned();
    os.push(".sbd");
    PathBuf::from(os)
}

/// Filesystem entries a `.sbd` directory listing must never surface as a subfolder:
/// dotfiles, editor backups, and the index/metadata siblings a folder accumulates.
pub(crate) fn is_ignorable_sbd_entry(name: &str) -> bool {
    if name.starts_with('.') || name.starts_with('#') || name.ends_with('~') {
        return true;
    }
    matches!(name, "popstate.dat" | "rules.dat" | "msgFilterRules.dat")
        || name.ends_with(".msf")
        || name.ends_with(".sbd")
        || name.ends_with(".snm")
        || name.ends_with(".toc")
        || name.ends_with(".json")
        || name.ends_with(".mozmsgs")
}
