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

//! The operations every mailbox backend provides.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use tempfile::NamedTempFile;

use super::account::Account;
use super::{Mailbox, MailboxType};
use crate::config::{Config, ScopeId};
use crate::support::error::Error;

/// Outcome of `mbox_check` and `mbox_sync`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MxStatus {
    Ok,
    NewMail,
    /// Messages vanished or were reordered; the view must be rebuilt.
    Reopened,
    FlagsChanged,
    Locked,
    Error,
}

bitflags! {
    pub struct OpenFlags: u8 {
        /// Create the mailbox if it does not exist.
        const CREATE = 1 << 0;
        /// Open only to add messages.
        const APPEND = 1 << 1;
        const READONLY = 1 << 2;
        /// Do not report progress.
        const QUIET = 1 << 3;
    }
}

/// An open message, readable from the start of its headers.
#[derive(Debug)]
pub struct Message {
    pub path: PathBuf,
    pub file: fs::File,
}

impl Message {
    pub fn open(path: PathBuf) -> Result<Self, Error> {
        let file = fs::File::open(&path)?;
        Ok(Message { path, file })
    }

    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.file.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// A message being written, committed atomically by `msg_commit`.
#[derive(Debug)]
pub struct NewMessage {
    pub tmp: NamedTempFile,
    pub read: bool,
    pub replied: bool,
    pub flagged: bool,
    /// Arrival time to record, as a UNIX timestamp.
    pub received: i64,
}

impl Write for NewMessage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

/// A mailbox backend.
///
/// Each operation works on the caller's `Mailbox`; the backend keeps only
/// its own private state. Operations a backend cannot perform report
/// `Error::Unsupported`.
pub trait MxOps {
    fn kind(&self) -> MailboxType;

    /// Whether the backend works on local files.
    fn is_local(&self) -> bool;

    /// Refresh the backend's view of the configuration. Called before each
    /// mailbox-level operation.
    fn configure(&mut self, _config: &Config, _scope: ScopeId) {}

    /// Whether `path` belongs to `account`.
    fn ac_owns_path(&self, _account: &Account, _path: &str) -> bool {
        false
    }

    /// Attach the backend to the shared state of `account`, which `path`
    /// is joining.
    fn ac_add(
        &mut self,
        _account: &mut Account,
        _path: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Populate the message vector.
    fn mbox_open(&mut self, m: &mut Mailbox) -> Result<(), Error>;

    fn mbox_open_append(
        &mut self,
        _m: &mut Mailbox,
        _flags: OpenFlags,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Look for changes made by others.
    fn mbox_check(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error>;

    /// Refresh `m.counts` without loading messages.
    fn mbox_check_stats(
        &mut self,
        _m: &mut Mailbox,
        _force: bool,
    ) -> Result<MxStatus, Error> {
        Err(Error::Unsupported)
    }

    /// Write changed and deleted messages back to the store.
    fn mbox_sync(&mut self, m: &mut Mailbox) -> Result<MxStatus, Error>;

    fn mbox_close(&mut self, _m: &mut Mailbox) -> Result<(), Error> {
        Ok(())
    }

    fn msg_open(&mut self, m: &Mailbox, index: usize) -> Result<Message, Error>;

    fn msg_open_new(
        &mut self,
        _m: &Mailbox,
        _template: Option<&crate::email::Email>,
    ) -> Result<NewMessage, Error> {
        Err(Error::Unsupported)
    }

    /// Move a written message into the store and add it to `m`.
    fn msg_commit(
        &mut self,
        _m: &mut Mailbox,
        _msg: NewMessage,
    ) -> Result<usize, Error> {
        Err(Error::Unsupported)
    }

    fn msg_close(&mut self, _m: &Mailbox, msg: Message) -> Result<(), Error> {
        drop(msg);
        Ok(())
    }

    /// Per-message bytes not counted in the message size.
    fn msg_padding_size(&self, _m: &Mailbox) -> u64 {
        0
    }

    fn msg_save_hcache(
        &mut self,
        _m: &Mailbox,
        _index: usize,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Validate a tag edit, returning it normalised.
    fn tags_edit(&self, _m: &Mailbox, _buf: &str) -> Result<String, Error> {
        Err(Error::Unsupported)
    }

    /// Apply a validated tag edit to the message at `index`.
    fn tags_commit(
        &mut self,
        _m: &mut Mailbox,
        _index: usize,
        _buf: &str,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Whether the message at `index` still belongs in the mailbox after a
    /// change to its tags.
    fn msg_still_queried(
        &self,
        _m: &Mailbox,
        _index: usize,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    fn path_canon(&self, path: &str) -> Result<String, Error> {
        canon_local(path)
    }

    fn path_parent(&self, path: &str) -> Result<String, Error> {
        Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NotFound(format!("parent of {}", path)))
    }

    fn path_is_empty(&self, _path: &str) -> Result<bool, Error> {
        Err(Error::Unsupported)
    }
}

/// Make a local path absolute and strip trailing slashes, without
/// resolving symlinks.
pub fn canon_local(path: &str) -> Result<String, Error> {
    let p = Path::new(path);
    let abs = if p.is_absolute() {
        p.to_owned()
    } else {
        std::env::current_dir()?.join(p)
    };

    let mut out = PathBuf::new();
    for part in abs.components() {
        match part {
            std::path::Component::CurDir => (),
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out.to_string_lossy().into_owned())
}
