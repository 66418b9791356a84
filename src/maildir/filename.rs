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

//! Maildir file names.
//!
//! A message file is named `<unique><delim>2,<flags>`, where `<flags>` is a
//! sorted run of single letters. Files in `new/` normally carry no info
//! part at all.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::prelude::*;
use rand::{rngs::OsRng, Rng};

use crate::email::Email;

/// The flags encoded in a file name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaildirFlags {
    pub flagged: bool,
    pub replied: bool,
    pub read: bool,
    pub trashed: bool,
    /// Letters with no meaning to us, kept sorted.
    pub custom: String,
}

impl MaildirFlags {
    /// Extract the flags from `name`.
    pub fn parse(name: &str, delim: char) -> Self {
        let mut flags = MaildirFlags::default();
        let info = match name.rfind(delim) {
            Some(ix) => &name[ix + delim.len_utf8()..],
            None => return flags,
        };
        if !info.starts_with("2,") {
            return flags;
        }

        let mut custom = Vec::new();
        for c in info[2..].chars() {
            match c {
                'F' => flags.flagged = true,
                'R' => flags.replied = true,
                'S' => flags.read = true,
                'T' => flags.trashed = true,
                c => custom.push(c),
            }
        }
        custom.sort_unstable();
        custom.dedup();
        flags.custom = custom.into_iter().collect();
        flags
    }

    /// The flags `email` should have on disk.
    pub fn of_email(email: &Email) -> Self {
        MaildirFlags {
            flagged: email.flagged,
            replied: email.replied,
            read: email.read,
            trashed: email.deleted,
            custom: email.custom_flags.clone(),
        }
    }

    /// Copy the flags onto `email`.
    ///
    /// A trashed message that is also flagged is not treated as deleted.
    pub fn apply(&self, email: &mut Email) {
        email.flagged = self.flagged;
        email.replied = self.replied;
        email.read = self.read;
        email.trash = self.trashed && !self.flagged;
        email.deleted = email.trash;
        email.custom_flags = self.custom.clone();
    }

    /// The info part, including the delimiter, or the empty string if the
    /// file carries none. `in_cur` forces an info part, since every file
    /// under `cur/` must have one.
    pub fn suffix(&self, in_cur: bool, delim: char) -> String {
        let mut letters = String::new();
        if self.flagged {
            letters.push('F');
        }
        if self.replied {
            letters.push('R');
        }
        if self.read {
            letters.push('S');
        }
        if self.trashed {
            letters.push('T');
        }
        letters.push_str(&self.custom);

        if letters.is_empty() && !in_cur {
            return String::new();
        }

        let mut sorted = letters.chars().collect::<Vec<_>>();
        sorted.sort_unstable();
        let mut suffix = String::with_capacity(sorted.len() + 3);
        suffix.push(delim);
        suffix.push_str("2,");
        suffix.extend(sorted);
        suffix
    }
}

/// The part of `name` that identifies the message regardless of its flags.
pub fn unique(name: &str, delim: char) -> &str {
    name.rsplit('/')
        .next()
        .map(|base| base.split(delim).next().unwrap_or(base))
        .unwrap_or(name)
}

/// The subdirectory a message belongs in.
pub fn subdir_for(email: &Email) -> &'static str {
    if email.read || email.old {
        "cur"
    } else {
        "new"
    }
}

/// The relative path `email` should have, given its unique name.
pub fn path_for(email: &Email, unique: &str, delim: char) -> String {
    let subdir = subdir_for(email);
    format!(
        "{}/{}{}",
        subdir,
        unique,
        MaildirFlags::of_email(email).suffix("cur" == subdir, delim)
    )
}

static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Generate a fresh unique name of the conventional
/// `<time>.<random>.<host>` form.
pub fn new_unique() -> String {
    let mut buf = [0u8; 256];
    let host = nix::unistd::gethostname(&mut buf)
        .ok()
        .and_then(|h| h.to_str().ok())
        .map(|h| h.replace('/', "\\057").replace(':', "\\072"))
        .unwrap_or_else(|| "localhost".to_owned());

    format!(
        "{}.R{:016x}Q{}P{}.{}",
        Utc::now().timestamp(),
        OsRng.gen::<u64>(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed),
        std::process::id(),
        host
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_flags() {
        let f = MaildirFlags::parse("123.abc.host:2,SRa", ':');
        assert!(f.read);
        assert!(f.replied);
        assert!(!f.flagged);
        assert_eq!("a", f.custom);

        assert_eq!(MaildirFlags::default(), MaildirFlags::parse("123.abc", ':'));
        assert_eq!(
            MaildirFlags::default(),
            MaildirFlags::parse("123.abc:1,S", ':')
        );
        assert!(MaildirFlags::parse("123.abc;2,F", ';').flagged);
    }

    #[test]
    fn suffixes_are_sorted() {
        let f = MaildirFlags {
            flagged: true,
            read: true,
            trashed: true,
            custom: "a".to_owned(),
            ..MaildirFlags::default()
        };
        assert_eq!(":2,FSTa", f.suffix(false, ':'));
        assert_eq!("", MaildirFlags::default().suffix(false, ':'));
        assert_eq!(":2,", MaildirFlags::default().suffix(true, ':'));
    }

    #[test]
    fn flagged_trash_is_not_deleted() {
        let mut e = Email::default();
        MaildirFlags::parse("x:2,FT", ':').apply(&mut e);
        assert!(!e.deleted);
        MaildirFlags::parse("x:2,T", ':').apply(&mut e);
        assert!(e.deleted);
        assert!(e.trash);
    }

    #[test]
    fn paths_follow_flags() {
        let mut e = Email::default();
        assert_eq!("new/u", path_for(&e, "u", ':'));
        e.old = true;
        assert_eq!("cur/u:2,", path_for(&e, "u", ':'));
        e.read = true;
        e.replied = true;
        assert_eq!("cur/u:2,RS", path_for(&e, "u", ':'));
        assert_eq!("u", unique("cur/u:2,RS", ':'));
    }

    #[test]
    fn unique_names_differ() {
        let a = new_unique();
        assert_ne!(a, new_unique());
        assert!(!a.contains(':'));
        assert!(!a.contains('/'));
    }
}
