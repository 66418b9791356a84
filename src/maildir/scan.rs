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

//! Directory scanning.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

use super::filename::{self, MaildirFlags};
use crate::email::{parse::parse_envelope, synthetic_id, Email};
use crate::support::error::Error;

/// How much of a message is read to find its headers.
const HEADER_READ_LIMIT: u64 = 256 * 1024;

pub const SUBDIRS: [&str; 2] = ["new", "cur"];

/// One message file found by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the maildir, e.g. `cur/123.abc:2,S`.
    pub rel: String,
    pub unique: String,
    pub flags: MaildirFlags,
    pub in_cur: bool,
}

/// List the message files under `new/` and `cur/` in a stable order.
pub fn list(root: &Path, delim: char) -> Result<Vec<Entry>, Error> {
    let mut entries = Vec::new();
    for &subdir in &SUBDIRS {
        list_subdir(root, subdir, delim, &mut entries)?;
    }
    entries.sort_by(|a, b| a.unique.cmp(&b.unique).then(a.rel.cmp(&b.rel)));
    Ok(entries)
}

fn list_subdir(
    root: &Path,
    subdir: &'static str,
    delim: char,
    dst: &mut Vec<Entry>,
) -> Result<(), Error> {
    for entry in fs::read_dir(root.join(subdir))? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        dst.push(Entry {
            unique: filename::unique(&name, delim).to_owned(),
            flags: MaildirFlags::parse(&name, delim),
            in_cur: "cur" == subdir,
            rel: format!("{}/{}", subdir, name),
        });
    }
    Ok(())
}

/// Read the headers of the file behind `entry` into a new `Email`.
pub fn load(
    root: &Path,
    entry: &Entry,
    mark_old: bool,
) -> Result<Email, Error> {
    let path = root.join(&entry.rel);
    let file = fs::File::open(&path)?;
    let md = file.metadata()?;

    let mut data = Vec::new();
    file.take(HEADER_READ_LIMIT).read_to_end(&mut data)?;
    let (env, lines) = parse_envelope(&data);

    let id = env
        .message_id
        .clone()
        .unwrap_or_else(|| synthetic_id(&entry.unique));
    let mut email = Email::new(id, entry.rel.clone());
    email.env = env;
    email.lines = lines;
    email.size = md.len();
    email.received = md
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64);
    entry.flags.apply(&mut email);
    email.old = entry.in_cur && mark_old && !email.read;
    Ok(email)
}

/// Find the current relative path of the message named `unique`.
pub fn find(
    root: &Path,
    unique: &str,
    delim: char,
) -> Result<Option<String>, Error> {
    for &subdir in &SUBDIRS {
        let dir = match fs::read_dir(root.join(subdir)) {
            Ok(dir) => dir,
            Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if filename::unique(&name, delim) == unique {
                return Ok(Some(format!("{}/{}", subdir, name)));
            }
        }
    }
    Ok(None)
}

/// Whether neither `new/` nor `cur/` hold any message.
pub fn is_empty(root: &Path) -> Result<bool, Error> {
    for &subdir in &SUBDIRS {
        for entry in fs::read_dir(root.join(subdir))? {
            if !entry?.file_name().to_string_lossy().starts_with('.') {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn maildir() -> TempDir {
        let root = TempDir::new().unwrap();
        for d in &["new", "cur", "tmp"] {
            fs::create_dir(root.path().join(d)).unwrap();
        }
        root
    }

    #[test]
    fn list_and_load() {
        let root = maildir();
        assert!(is_empty(root.path()).unwrap());

        fs::write(
            root.path().join("new/2.b"),
            "Message-ID: <b@x>\r\nSubject: two\r\n\r\nbody\r\n",
        )
        .unwrap();
        fs::write(root.path().join("cur/1.a:2,FS"), "Subject: one\n\nx\ny\n")
            .unwrap();
        fs::write(root.path().join("cur/.hidden"), "").unwrap();

        let entries = list(root.path(), ':').unwrap();
        assert_eq!(2, entries.len());
        assert_eq!("cur/1.a:2,FS", entries[0].rel);
        assert_eq!("1.a", entries[0].unique);
        assert!(entries[0].in_cur);
        assert!(entries[0].flags.flagged);
        assert_eq!("new/2.b", entries[1].rel);

        let a = load(root.path(), &entries[0], true).unwrap();
        assert_eq!(synthetic_id("1.a"), a.id);
        assert!(a.read);
        assert!(a.flagged);
        assert!(!a.old);
        assert_eq!(2, a.lines);

        let b = load(root.path(), &entries[1], true).unwrap();
        assert_eq!("b@x", b.id);
        assert_eq!(Some("two".to_owned()), b.env.subject);
        assert!(b.is_new());

        assert_eq!(
            Some("cur/1.a:2,FS".to_owned()),
            find(root.path(), "1.a", ':').unwrap()
        );
        assert_eq!(None, find(root.path(), "3.c", ':').unwrap());
        assert!(!is_empty(root.path()).unwrap());
    }

    #[test]
    fn unread_in_cur_is_old() {
        let root = maildir();
        fs::write(root.path().join("cur/1.a:2,"), "Subject: x\n\n").unwrap();
        let entries = list(root.path(), ':').unwrap();
        assert!(load(root.path(), &entries[0], true).unwrap().old);
        assert!(!load(root.path(), &entries[0], false).unwrap().old);
    }
}
