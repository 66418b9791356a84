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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::warn;
use nix::fcntl::{flock, FlockArg};

use crate::support::error::Error;

/// Write `data` into the file at `path`, atomically.
///
/// The file will first be staged within `tmp`.
///
/// If `overwrite` is true, this will replace anything already at `path`. If
/// false, the call will fail if `path` already exists.
pub fn spit(
    tmp: impl AsRef<Path>,
    path: impl AsRef<Path>,
    overwrite: bool,
    mode: u32,
    data: &[u8],
) -> io::Result<()> {
    let mut tf = tempfile::NamedTempFile::new_in(tmp)?;
    tf.as_file_mut().write_all(data)?;
    chmod(tf.path(), mode)?;
    tf.as_file_mut().sync_all()?;
    if overwrite {
        tf.persist(path)?;
    } else {
        tf.persist_noclobber(path)?;
    }
    Ok(())
}

pub fn chmod(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Return the modification time of `path`, or `None` if it does not exist.
pub fn mtime(path: impl AsRef<Path>) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(md) => md.modified().map(Some),
        Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(None),
        Err(e) => Err(e),
    }
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            Err(e) => Err(e),
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

/// An advisory whole-file lock, released when dropped.
///
/// The lock file is created if it does not exist. It is never deleted, since
/// deleting it would race with other processes opening it.
#[derive(Debug)]
pub struct AdvisoryLock {
    file: fs::File,
    path: PathBuf,
}

impl AdvisoryLock {
    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Error::Locked` if another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_owned();
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(AdvisoryLock { file, path }),
            Err(nix::Error::Sys(nix::errno::Errno::EAGAIN)) => {
                Err(Error::Locked)
            }
            Err(e) => Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                e.to_string(),
            ))),
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn spit_noclobber() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("target");
        spit(root.path(), &target, false, 0o600, b"one").unwrap();
        assert!(spit(root.path(), &target, false, 0o600, b"two").is_err());
        spit(root.path(), &target, true, 0o600, b"three").unwrap();
        assert_eq!(b"three".to_vec(), fs::read(&target).unwrap());
    }

    #[test]
    fn ignore_kinds() {
        let root = TempDir::new().unwrap();
        fs::remove_file(root.path().join("nx")).ignore_not_found().unwrap();
        fs::create_dir(root.path()).ignore_already_exists().unwrap();
        assert_eq!(None, mtime(root.path().join("nx")).unwrap());
        assert!(mtime(root.path()).unwrap().is_some());
    }

    #[test]
    fn lock_is_exclusive() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("lock");
        let held = AdvisoryLock::acquire(&path).unwrap();
        assert_matches!(Err(Error::Locked), AdvisoryLock::acquire(&path));
        drop(held);
        AdvisoryLock::acquire(&path).unwrap();
    }
}
