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

//! The backend-agnostic mailbox.

pub mod account;
pub mod acl;
pub mod backend;
pub mod mx;
pub mod url;

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use log::{debug, warn};

use self::acl::{check_acl, AclRights};
use crate::email::{Email, Flag};
use crate::notify::{
    EmailChange, EmailEvent, Event, MailboxEvent, NotifyId, Payload, Subject,
};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MailboxType {
    Maildir,
    TagDb,
}

impl fmt::Display for MailboxType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MailboxType::Maildir => write!(f, "maildir"),
            MailboxType::TagDb => write!(f, "tagdb"),
        }
    }
}

/// Message counts, recomputed after every scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub new: usize,
    pub unread: usize,
    pub flagged: usize,
    pub tagged: usize,
    pub deleted: usize,
}

pub struct Mailbox {
    pub kind: MailboxType,
    /// The path or URL the mailbox was opened with, canonicalised.
    pub path: String,
    pub realpath: String,
    pub emails: Vec<Email>,
    /// `vnum -> index` for the messages in the view.
    pub v2r: Vec<usize>,
    pub counts: Counts,
    pub rights: AclRights,
    pub readonly: bool,
    /// Some message differs from the store.
    pub changed: bool,
    pub verbose: bool,
    pub mtime: Option<SystemTime>,
    /// Total size of the messages in the view.
    pub vsize: u64,
    pub log_prefix: LogPrefix,
    pub notify: Option<NotifyId>,
    pub subject: Subject,
    id_hash: HashMap<String, usize>,
    pending: Vec<Event>,
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("emails", &self.emails.len())
            .field("counts", &self.counts)
            .finish()
    }
}

impl Mailbox {
    pub fn new(kind: MailboxType, path: &str, subject: Subject) -> Self {
        let log_prefix = LogPrefix::new(match kind {
            MailboxType::Maildir => "maildir",
            MailboxType::TagDb => "tagdb",
        });
        log_prefix.set_mailbox(path.to_owned());

        Mailbox {
            kind,
            path: path.to_owned(),
            realpath: path.to_owned(),
            emails: Vec::new(),
            v2r: Vec::new(),
            counts: Counts::default(),
            rights: AclRights::all(),
            readonly: false,
            changed: false,
            verbose: true,
            mtime: None,
            vsize: 0,
            log_prefix,
            notify: None,
            subject,
            id_hash: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    /// Number of messages in the view.
    pub fn vcount(&self) -> usize {
        self.v2r.len()
    }

    /// The message at view position `vnum`.
    pub fn email_at(&self, vnum: usize) -> Option<&Email> {
        self.v2r.get(vnum).map(|&ix| &self.emails[ix])
    }

    /// Append a newly discovered message, returning its index. It goes at
    /// the end of the view until the view is next rebuilt.
    pub fn push(&mut self, mut email: Email) -> usize {
        let index = self.emails.len();
        email.index = index;
        if !email.id.is_empty() {
            self.id_hash.entry(email.id.clone()).or_insert(index);
        }
        email.vnum = None;
        if email.visible && !email.quasi_deleted {
            email.vnum = Some(self.v2r.len());
            self.v2r.push(index);
            self.vsize += email.size;
        }
        self.emails.push(email);
        index
    }

    /// Forget every message from `len` on, undoing `push`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.emails.len() {
            return;
        }
        for e in self.emails.drain(len..) {
            if e.vnum.is_some() {
                self.vsize -= e.size;
            }
        }
        self.v2r.retain(|&ix| ix < len);
        self.rehash();
    }

    /// Number the visible messages in index order.
    fn number_by_index(&mut self) {
        self.v2r.clear();
        self.vsize = 0;
        for e in &mut self.emails {
            e.vnum = None;
            if e.visible && !e.quasi_deleted {
                e.vnum = Some(self.v2r.len());
                self.v2r.push(e.index);
                self.vsize += e.size;
            }
        }
    }

    pub fn by_id(&self, id: &str) -> Option<usize> {
        self.id_hash.get(id).copied()
    }

    /// Rebuild `id_hash` from the message vector.
    pub fn rehash(&mut self) {
        self.id_hash.clear();
        for e in &self.emails {
            if !e.id.is_empty() {
                self.id_hash.entry(e.id.clone()).or_insert(e.index);
            }
        }
    }

    /// Remove every message matching `doomed`, renumber `index`, rebuild
    /// the id hash and forget the view. Returns the indices removed, as they
    /// were before the removal.
    pub fn remove_where(
        &mut self,
        mut doomed: impl FnMut(&Email) -> bool,
    ) -> Vec<usize> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.emails.len());
        for e in self.emails.drain(..) {
            if doomed(&e) {
                removed.push(e.index);
            } else {
                kept.push(e);
            }
        }

        for (ix, e) in kept.iter_mut().enumerate() {
            e.index = ix;
            e.thread = None;
        }
        self.emails = kept;
        // The old view order no longer applies
        self.number_by_index();
        self.rehash();
        self.update_counts();

        if !removed.is_empty() {
            self.post_email(EmailChange::Delete, removed.clone());
        }
        removed
    }

    /// Drop purged messages after a sync.
    pub fn update_tables(&mut self) -> Vec<usize> {
        let removed = self.remove_where(|e| e.purge || !e.active);
        if !removed.is_empty() {
            debug!("{} Dropped {} messages", self.log_prefix, removed.len());
        }
        self.changed = self.emails.iter().any(|e| e.changed);
        removed
    }

    pub fn update_counts(&mut self) {
        let mut c = Counts::default();
        for e in &self.emails {
            if e.quasi_deleted {
                continue;
            }
            c.total += 1;
            if !e.read {
                c.unread += 1;
                if !e.old {
                    c.new += 1;
                }
            }
            if e.flagged {
                c.flagged += 1;
            }
            if e.tagged {
                c.tagged += 1;
            }
            if e.deleted {
                c.deleted += 1;
            }
        }
        self.counts = c;
    }

    /// Set or clear a flag on the message at `index`, subject to the
    /// mailbox rights. Returns whether anything changed.
    pub fn set_flag(
        &mut self,
        index: usize,
        flag: Flag,
        on: bool,
    ) -> Result<bool, Error> {
        let needed = match flag {
            Flag::Read | Flag::Old | Flag::New => AclRights::SEEN,
            Flag::Deleted | Flag::Purge => AclRights::DELETE,
            Flag::Replied | Flag::Flagged => AclRights::WRITE,
            Flag::Tagged => AclRights::empty(),
        };
        check_acl(self.rights, needed, "Changing flags")?;
        if needed != AclRights::empty() && self.readonly {
            return Err(Error::AclDenied);
        }

        let e = self
            .emails
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("message {}", index)))?;
        let before = (
            e.read, e.old, e.replied, e.flagged, e.tagged, e.deleted, e.purge,
        );
        match flag {
            Flag::Read => {
                e.read = on;
                if on {
                    e.old = false;
                }
            }
            Flag::Old => e.old = on,
            Flag::New => {
                if on {
                    e.read = false;
                    e.old = false;
                } else {
                    e.read = true;
                }
            }
            Flag::Replied => {
                e.replied = on;
                if on {
                    e.read = true;
                    e.old = false;
                }
            }
            Flag::Flagged => e.flagged = on,
            Flag::Tagged => e.tagged = on,
            Flag::Deleted => {
                e.deleted = on;
                if !on {
                    e.purge = false;
                }
            }
            Flag::Purge => {
                e.purge = on;
                if on {
                    e.deleted = true;
                }
            }
        }

        let after = (
            e.read, e.old, e.replied, e.flagged, e.tagged, e.deleted, e.purge,
        );
        if before == after {
            return Ok(false);
        }

        // Tagging is a view-only selection
        if Flag::Tagged != flag {
            e.changed = true;
            self.changed = true;
        }
        self.update_counts();
        self.post_email(EmailChange::Change, vec![index]);
        Ok(true)
    }

    /// Queue a mailbox event for delivery by the owner.
    pub fn post(&mut self, event: MailboxEvent) {
        self.pending
            .push(Event::new(Some(self.subject), Payload::Mailbox(event)));
    }

    pub fn post_email(&mut self, change: EmailChange, indices: Vec<usize>) {
        self.pending.push(Event::new(
            Some(self.subject),
            Payload::Email(EmailEvent { change, indices }),
        ));
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    /// Check the structural invariants of the message vector and view,
    /// logging any violation. Returns whether all hold.
    pub fn verify(&self) -> bool {
        let mut ok = true;
        for (ix, e) in self.emails.iter().enumerate() {
            if e.index != ix {
                warn!("{} message {} has index {}", self.log_prefix, ix, e.index);
                ok = false;
            }
            let should_show = e.visible && !e.quasi_deleted;
            if e.vnum.is_some() != should_show {
                warn!(
                    "{} message {} vnum {:?} visible {}",
                    self.log_prefix, ix, e.vnum, should_show
                );
                ok = false;
            }
            if let Some(vnum) = e.vnum {
                if self.v2r.get(vnum) != Some(&ix) {
                    warn!("{} v2r[{}] is not {}", self.log_prefix, vnum, ix);
                    ok = false;
                }
            }
            if !e.id.is_empty() && self.by_id(&e.id).is_none() {
                warn!("{} {} missing from id hash", self.log_prefix, e.id);
                ok = false;
            }
        }
        ok && self.v2r.len()
            == self.emails.iter().filter(|e| e.vnum.is_some()).count()
    }
}
