//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mailview.
//
// Mailview is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailview is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailview. If not, see <http://www.gnu.org/licenses/>.

//! The local directory backend.
//!
//! A mailbox is a maildir: a directory with `new/`, `cur/` and `tmp/`
//! subdirectories, one file per message. Flags live in the file names (see
//! `filename`), so changing a flag is a rename. Nothing else on disk is
//! interpreted, apart from the `.mailview.lock` file used to keep two syncs
//! from interleaving.
//!
//! Changes made by other processes are found by `mbox_check`, which rescans
//! both message directories whenever either one's mtime moves, and matches
//! files to messages by their unique name.

pub mod filename;
pub mod scan;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};
use nix::sys::time::{TimeVal, TimeValLike};
use nix::unistd::AccessFlags;

use self::filename::MaildirFlags;
use self::scan::Entry;
use crate::config::{
    Config, ConfigDef, ConfigError, ConfigSet, ItemFlags, Kind, ScopeId,
    Validation, Value,
};
use crate::email::Email;
use crate::mailbox::account::Account;
use crate::mailbox::backend::{Message, MxOps, MxStatus, NewMessage, OpenFlags};
use crate::mailbox::{Counts, Mailbox, MailboxType};
use crate::notify::EmailChange;
use crate::support::error::Error;
use crate::support::file_ops::{self, AdvisoryLock, IgnoreKinds};
use crate::support::interrupt;
use crate::support::progress::Progress;

const LOCK_FILE: &str = ".mailview.lock";

/// Whether `path` looks like a maildir.
pub fn probe(path: &str) -> bool {
    let root = Path::new(path);
    root.join("cur").is_dir() && root.join("new").is_dir()
}

/// Rename the file of `email`, currently at `rel` under `root`, so that its
/// name and directory match the message's flags.
///
/// If the file is not where we expected, its current name is looked up and
/// the rename retried once. Returns the new relative path, or `None` if the
/// file no longer exists at all.
pub fn rename_for_flags(
    root: &Path,
    rel: &str,
    email: &Email,
    delim: char,
) -> Result<Option<String>, Error> {
    let unique = filename::unique(rel, delim);
    let target = filename::path_for(email, unique, delim);
    if target == rel {
        return Ok(Some(target));
    }

    match fs::rename(root.join(rel), root.join(&target)) {
        Ok(()) => return Ok(Some(target)),
        Err(e) if io::ErrorKind::NotFound == e.kind() => (),
        Err(e) => return Err(e.into()),
    }

    let current = match scan::find(root, unique, delim)? {
        Some(current) => current,
        None => return Ok(None),
    };
    debug!("{} moved to {} underneath us", rel, current);
    if current != target {
        fs::rename(root.join(&current), root.join(&target))?;
    }
    Ok(Some(target))
}

/// What `sync_file` did with a message file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The file already matched the message.
    Kept,
    /// The message was purged and its file removed.
    Unlinked,
    /// The file now lives at the given relative path.
    Renamed(String),
    /// The file is gone.
    Vanished,
}

/// Write the state of `email` back to its file at `rel` under `root`.
///
/// Purged messages are unlinked, or with `trash` merely marked trashed.
/// Otherwise the file is renamed if the flags changed. `email.path` is left
/// for the caller to update.
pub fn sync_file(
    root: &Path,
    rel: &str,
    email: &mut Email,
    trash: bool,
    delim: char,
) -> Result<SyncOutcome, Error> {
    if email.purge && !trash {
        fs::remove_file(root.join(rel)).ignore_not_found()?;
        return Ok(SyncOutcome::Unlinked);
    }
    // With maildir_trash, purging only marks the file trashed
    email.purge = false;

    let trash_moved = (trash || email.trash) && email.deleted != email.trash;
    if !email.changed && !email.attach_deleted && !trash_moved {
        return Ok(SyncOutcome::Kept);
    }

    let outcome = match rename_for_flags(root, rel, email, delim)? {
        Some(ref new) if new == rel => SyncOutcome::Kept,
        Some(new) => SyncOutcome::Renamed(new),
        None => SyncOutcome::Vanished,
    };
    email.trash = email.deleted;
    email.changed = false;
    Ok(outcome)
}

/// Start writing a new message into `tmp/` of the maildir at `root`,
/// taking flags and arrival time from `template`.
pub fn open_new(
    root: &Path,
    template: Option<&Email>,
) -> Result<NewMessage, Error> {
    let tmp = root.join("tmp");
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(&tmp)?;

    let mut msg = NewMessage {
        tmp: tempfile::NamedTempFile::new_in(&tmp)?,
        read: false,
        replied: false,
        flagged: false,
        received: 0,
    };
    if let Some(e) = template {
        msg.read = e.read;
        msg.replied = e.replied;
        msg.flagged = e.flagged;
        msg.received = e.received;
    }
    Ok(msg)
}

/// Move a finished message from `tmp/` to its final name under `root`.
pub fn deliver(
    root: &Path,
    msg: NewMessage,
    delim: char,
) -> Result<Entry, Error> {
    let NewMessage {
        mut tmp,
        read,
        replied,
        flagged,
        received,
    } = msg;
    tmp.as_file().sync_all()?;

    let template = Email {
        read,
        replied,
        flagged,
        ..Email::default()
    };
    let (rel, unique) = loop {
        let unique = filename::new_unique();
        let rel = filename::path_for(&template, &unique, delim);
        match tmp.persist_noclobber(root.join(&rel)) {
            Ok(_) => break (rel, unique),
            Err(e) if io::ErrorKind::AlreadyExists == e.error.kind() => {
                tmp = e.file;
            }
            Err(e) => return Err(e.error.into()),
        }
    };

    if 0 != received {
        set_received(&root.join(&rel), received)?;
    }

    Ok(Entry {
        flags: MaildirFlags::parse(&rel, delim),
        in_cur: rel.starts_with("cur/"),
        rel,
        unique,
    })
}

pub fn register(set: &mut ConfigSet) -> Result<(), ConfigError> {
    set.register_all(vec![
        ConfigDef::new("maildir_field_delimiter", Kind::String, ":")
            .flags(ItemFlags::NOT_EMPTY | ItemFlags::ON_STARTUP)
            .validator(validate_delimiter),
        ConfigDef::new("maildir_trash", Kind::Bool, "no"),
        ConfigDef::new("maildir_check_cur", Kind::Bool, "no"),
        ConfigDef::new("mark_old", Kind::Bool, "yes"),
    ])
}

fn validate_delimiter(def: &ConfigDef, value: &Value) -> Validation {
    match *value {
        Value::Str(Some(ref s))
            if 1 == s.chars().count()
                && !s
                    .chars()
                    .any(|c| c.is_alphanumeric() || '/' == c || '.' == c) =>
        {
            Validation::Accept
        }
        _ => Validation::Reject(format!(
            "{} must be a single punctuation character",
            def.name
        )),
    }
}

#[derive(Debug)]
pub struct MaildirOps {
    delim: char,
    trash: bool,
    check_cur: bool,
    mark_old: bool,
    mtime_new: Option<SystemTime>,
    mtime_cur: Option<SystemTime>,
    stats_mtime: Option<SystemTime>,
}

impl MaildirOps {
    pub fn new() -> Self {
        MaildirOps {
            delim: ':',
            trash: false,
            check_cur: false,
            mark_old: true,
            mtime_new: None,
            mtime_cur: None,
            stats_mtime: None,
        }
    }

    fn record_mtimes(&mut self, root: &Path) -> Result<(), Error> {
        self.mtime_new = file_ops::mtime(root.join("new"))?;
        self.mtime_cur = file_ops::mtime(root.join("cur"))?;
        Ok(())
    }

    fn load_all(
        &self,
        m: &mut Mailbox,
        root: &Path,
        entries: &[&Entry],
    ) -> Result<Vec<usize>, Error> {
        let mut progress = Progress::new(
            format!("{} Reading messages", m.log_prefix),
            entries.len(),
        );
        let mut added = Vec::with_capacity(entries.len());
        for (n, entry) in entries.iter().enumerate() {
            interrupt::check()?;
            match scan::load(root, entry, self.mark_old) {
                Ok(email) => added.push(m.push(email)),
                Err(Error::Io(ref e)) if io::ErrorKind::NotFound == e.kind() => {
                    debug!(
                        "{} {} vanished during scan",
                        m.log_prefix, entry.rel
                    );
                }
                Err(e) => return Err(e),
            }
            if m.verbose {
                progress.update(n + 1);
            }
        }
        Ok(added)
    }
}

impl Default for MaildirOps {
    fn default() -> Self {
        MaildirOps::new()
    }
}

/// The flags of `email` that live on disk, for change detection.
pub fn disk_state(email: &Email) -> (bool, bool, bool, bool, bool, &str) {
    (
        email.read,
        email.old,
        email.flagged,
        email.replied,
        email.deleted,
        &email.custom_flags,
    )
}

pub fn create_maildir(root: &Path) -> Result<(), Error> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o700);
    for sub in &["new", "cur", "tmp"] {
        builder.create(root.join(sub))?;
    }
    Ok(())
}

fn set_received(path: &Path, received: i64) -> Result<(), Error> {
    let t = TimeVal::seconds(received);
    nix::sys::stat::utimes(path, &t, &t).map_err(|e| {
        Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
    })
}

impl MxOps for MaildirOps {
    fn kind(&self) -> MailboxType {
        MailboxType::Maildir
    }

    fn is_local(&self) -> bool {
        true
    }

    fn configure(&mut self, config: &Config, scope: ScopeId) {
        let delim = config
            .get_str(scope, "maildir_field_delimiter")
            .ok()
            .and_then(|s| s.and_then(|s| s.chars().next()));
        if let Some(delim) = delim {
            self.delim = delim;
        }
        if let Ok(trash) = config.get_bool(scope, "maildir_trash") {
            self.trash = trash;
        }
        if let Ok(check_cur) = config.get_bool(scope, "maildir_check_cur") {
            self.check_cur = check_cur;
        }
        if let Ok(mark_old) = config.get_bool(scope, "mark_old") {
            self.mark_old = mark_old;
        }
    }

    /// All local directories share one account.
    fn ac_owns_path(&self, _account: &Account, _path: &str) -> bool {
        true
    }

    fn mbox_open(&mut self, m: &mut Mailbox) -> Result<(), Error> {
        if !probe(&m.path) {
            return Err(Error::NotFound(format!("{} is not a maildir", m.path)));
        }

        let root = PathBuf::from(&m.path);
        // Record first so anything arriving during the scan is seen by the
        // next check
        self.record_mtimes(&root)?;
        let entries = scan::list(&root, self.delim)?;
        let refs = entries.iter().collect::<Vec<_>>();
        if let Err(e) = self.load_all(m, &root, &refs) {
            m.truncate(0);
            return Err(e);
        }

        m.mtime = self.mtime_new.max(self.mtime_cur);
        if nix::unistd::access(&root, AccessFlags::W_OK).is_err() {
            info!("{} Directory is not writable", m.log_prefix);
            m.readonly = true;
        }
        Ok(())
    }

    fn mbox_open_append(
        &mut self,
        m: &mut Mailbox,
        flags: OpenFlags,
    ) -> Result<(), Error> {
        let root = PathBuf::from(&m.path);
        if flags.contains(OpenFlags::CREATE) {
            create_maildir(&root)?;
        } else if !probe(&m.path) {
            return Err(Error::NotFound(format!("{} is not a maildir", m.path)));
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(root.join("tmp"))?;
        Ok(())
    }

    fn mbox_check(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error> {
        let root = PathBuf::from(&m.path);
        let mtime_new = file_ops::mtime(root.join("new"))?;
        let mtime_cur = file_ops::mtime(root.join("cur"))?;
        if mtime_new.is_none() || mtime_cur.is_none() {
            return Err(Error::BackendFatal(format!(
                "{} is no longer a maildir",
                m.path
            )));
        }

        let changed = mtime_new != self.mtime_new
            || mtime_cur != self.mtime_cur
            || self.check_cur;
        if !changed {
            return Ok(MxStatus::Ok);
        }

        let entries = scan::list(&root, self.delim)?;
        let mut by_unique = entries
            .iter()
            .map(|e| (e.unique.as_str(), e))
            .collect::<HashMap<_, _>>();
        let known = m
            .emails
            .iter()
            .map(|e| filename::unique(&e.path, self.delim).to_owned())
            .collect::<Vec<_>>();

        // Newcomers first: if reading them fails, the mailbox and the
        // recorded mtimes must be as they were
        let seen = known.iter().map(String::as_str).collect::<HashSet<_>>();
        let newcomers = entries
            .iter()
            .filter(|e| !seen.contains(e.unique.as_str()))
            .collect::<Vec<_>>();
        let oldcount = m.len();
        let added = match self.load_all(m, &root, &newcomers) {
            Ok(added) => added,
            Err(e) => {
                m.truncate(oldcount);
                return Err(e);
            }
        };

        self.mtime_new = mtime_new;
        self.mtime_cur = mtime_cur;
        m.mtime = mtime_new.max(mtime_cur);

        let mut occult = false;
        let mut flag_changes = Vec::new();
        for (email, unique) in m.emails[..oldcount].iter_mut().zip(&known) {
            let entry = match by_unique.remove(unique.as_str()) {
                Some(entry) => entry,
                None => {
                    // Gone from both directories
                    email.active = false;
                    occult = true;
                    continue;
                }
            };

            email.path = entry.rel.clone();
            let mut disk = Email::default();
            entry.flags.apply(&mut disk);
            disk.old = entry.in_cur && self.mark_old && !disk.read;
            if disk_state(&disk) == disk_state(email) {
                continue;
            }

            if email.changed {
                debug!(
                    "{} Keeping local flag changes to {}",
                    m.log_prefix, email.path
                );
                continue;
            }

            entry.flags.apply(email);
            email.old = disk.old;
            email.limit_visited = false;
            flag_changes.push(email.index);
        }

        let flags_changed = !flag_changes.is_empty();
        if flags_changed {
            m.post_email(EmailChange::Change, flag_changes);
        }
        if !added.is_empty() {
            m.post_email(EmailChange::Add, added.clone());
        }

        if occult {
            m.update_tables();
            Ok(MxStatus::Reopened)
        } else if !added.is_empty() {
            Ok(MxStatus::NewMail)
        } else if flags_changed {
            Ok(MxStatus::FlagsChanged)
        } else {
            Ok(MxStatus::Ok)
        }
    }

    fn mbox_check_stats(
        &mut self,
        m: &mut Mailbox,
        force: bool,
    ) -> Result<MxStatus, Error> {
        let root = PathBuf::from(&m.path);
        let mtime = file_ops::mtime(root.join("new"))?
            .max(file_ops::mtime(root.join("cur"))?);
        if !force && mtime == self.stats_mtime {
            return Ok(MxStatus::Ok);
        }
        self.stats_mtime = mtime;

        let mut counts = Counts {
            tagged: m.counts.tagged,
            ..Counts::default()
        };
        for entry in scan::list(&root, self.delim)? {
            counts.total += 1;
            if !entry.flags.read {
                counts.unread += 1;
                if !(entry.in_cur && self.mark_old) {
                    counts.new += 1;
                }
            }
            if entry.flags.flagged {
                counts.flagged += 1;
            }
            if entry.flags.trashed {
                counts.deleted += 1;
            }
        }

        let more_new = counts.new > m.counts.new;
        m.counts = counts;
        Ok(if more_new {
            MxStatus::NewMail
        } else {
            MxStatus::Ok
        })
    }

    fn mbox_sync(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error> {
        let root = PathBuf::from(&m.path);
        let _lock = AdvisoryLock::acquire(root.join(LOCK_FILE))?;

        let mut progress =
            Progress::new(format!("{} Writing messages", m.log_prefix), m.len());
        for ix in 0..m.emails.len() {
            interrupt::check()?;
            let email = &mut m.emails[ix];
            let rel = email.path.clone();
            match sync_file(&root, &rel, email, self.trash, self.delim)? {
                SyncOutcome::Kept | SyncOutcome::Unlinked => (),
                SyncOutcome::Renamed(rel) => email.path = rel,
                SyncOutcome::Vanished => {
                    warn!(
                        "{} {} was removed by someone else",
                        m.log_prefix, email.path
                    );
                    email.active = false;
                }
            }

            if m.verbose {
                progress.update(ix + 1);
            }
        }

        self.record_mtimes(&root)?;
        Ok(MxStatus::Ok)
    }

    fn msg_open(&mut self, m: &Mailbox, index: usize) -> Result<Message, Error> {
        let email = m
            .emails
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let root = Path::new(&m.path);
        match Message::open(root.join(&email.path)) {
            Err(Error::Io(ref e)) if io::ErrorKind::NotFound == e.kind() => {
                let unique = filename::unique(&email.path, self.delim);
                match scan::find(root, unique, self.delim)? {
                    Some(rel) => Message::open(root.join(rel)),
                    None => Err(Error::NotFound(email.id.clone())),
                }
            }
            r => r,
        }
    }

    fn msg_open_new(
        &mut self,
        m: &Mailbox,
        template: Option<&Email>,
    ) -> Result<NewMessage, Error> {
        open_new(Path::new(&m.path), template)
    }

    fn msg_commit(
        &mut self,
        m: &mut Mailbox,
        msg: NewMessage,
    ) -> Result<usize, Error> {
        let root = PathBuf::from(&m.path);
        let entry = deliver(&root, msg, self.delim)?;
        let email = scan::load(&root, &entry, self.mark_old)?;
        let index = m.push(email);
        m.post_email(EmailChange::Add, vec![index]);
        debug!("{} Committed {}", m.log_prefix, entry.rel);
        Ok(index)
    }

    fn path_is_empty(&self, path: &str) -> Result<bool, Error> {
        scan::is_empty(Path::new(path))
    }
}
