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

//! Dispatch from generic mailbox operations to the right backend.

use std::fmt;

use log::{debug, info, warn};

use super::account::Accounts;
use super::acl::{check_acl, AclRights};
use super::backend::{Message, MxOps, MxStatus, NewMessage, OpenFlags};
use super::{Mailbox, MailboxType};
use crate::config::ScopeId;
use crate::context::Context;
use crate::email::tags::parse_tag_edit;
use crate::maildir::MaildirOps;
use crate::notify::{MailboxEvent, NotifyId};
use crate::support::error::Error;
use crate::tagdb::TagDbOps;

/// Work out which backend handles `path`.
pub fn path_probe(path: &str) -> Option<MailboxType> {
    if crate::tagdb::probe(path) {
        Some(MailboxType::TagDb)
    } else if crate::maildir::probe(path) {
        Some(MailboxType::Maildir)
    } else {
        None
    }
}

fn new_ops(kind: MailboxType) -> Box<dyn MxOps> {
    match kind {
        MailboxType::Maildir => Box::new(MaildirOps::new()),
        MailboxType::TagDb => Box::new(TagDbOps::new()),
    }
}

/// An open mailbox together with its backend.
pub struct Mx {
    pub mailbox: Mailbox,
    ops: Box<dyn MxOps>,
    scope: ScopeId,
    append: bool,
}

impl fmt::Debug for Mx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mx")
            .field("kind", &self.mailbox.kind)
            .field("path", &self.mailbox.path)
            .field("messages", &self.mailbox.len())
            .field("append", &self.append)
            .finish()
    }
}

impl Mx {
    /// Open the mailbox at `path`, which may be a directory or a URL.
    pub fn open(
        ctx: &mut Context,
        accounts: &mut Accounts,
        path: &str,
        flags: OpenFlags,
    ) -> Result<Self, Error> {
        let kind = match path_probe(path) {
            Some(kind) => kind,
            None if flags.contains(OpenFlags::CREATE) => MailboxType::Maildir,
            None => {
                return Err(Error::NotFound(format!(
                    "{} is not a mailbox",
                    path
                )))
            }
        };

        let mut ops = new_ops(kind);
        let canon = ops.path_canon(path)?;
        let scope = ctx.root();
        ops.configure(&ctx.config, scope);

        let subject = ctx.next_subject();
        let mut mailbox = Mailbox::new(kind, &canon, subject);
        mailbox.verbose = !flags.contains(OpenFlags::QUIET);

        let account = accounts.attach(&mut ctx.bus, &mut *ops, &canon)?;
        let node = ctx.bus.node_new(Some(accounts.get(account).notify));
        mailbox.notify = Some(node);

        let append = flags.contains(OpenFlags::APPEND);
        let result = if append {
            ops.mbox_open_append(&mut mailbox, flags)
        } else {
            ops.mbox_open(&mut mailbox)
        };
        if let Err(e) = result {
            accounts.detach(&mut ctx.bus, &canon);
            ctx.bus.node_free(node);
            return Err(e);
        }

        if flags.contains(OpenFlags::READONLY) {
            mailbox.readonly = true;
        }
        if mailbox.readonly {
            mailbox.rights &= AclRights::read_only();
        }
        mailbox.update_counts();
        mailbox.post(MailboxEvent::Add);

        let mut mx = Mx {
            mailbox,
            ops,
            scope,
            append,
        };
        mx.flush(ctx);
        info!(
            "{} Opened with {} messages",
            mx.mailbox.log_prefix,
            mx.mailbox.len()
        );
        Ok(mx)
    }

    pub fn kind(&self) -> MailboxType {
        self.mailbox.kind
    }

    pub fn is_local(&self) -> bool {
        self.ops.is_local()
    }

    pub fn notify_node(&self) -> Option<NotifyId> {
        self.mailbox.notify
    }

    /// Use the variables of `scope` for this mailbox from now on.
    pub fn set_scope(&mut self, scope: ScopeId) {
        self.scope = scope;
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Deliver the mailbox's queued events.
    pub fn flush(&mut self, ctx: &mut Context) {
        let events = self.mailbox.take_events();
        if let Some(node) = self.mailbox.notify {
            for event in &events {
                ctx.bus.send(node, event);
            }
        }
    }

    /// Look for changes made by others.
    pub fn check(&mut self, ctx: &mut Context) -> Result<MxStatus, Error> {
        if self.append {
            return Ok(MxStatus::Ok);
        }

        self.ops.configure(&ctx.config, self.scope);
        let status = match self.ops.mbox_check(&mut self.mailbox) {
            Ok(status) => status,
            Err(Error::Locked) => MxStatus::Locked,
            Err(e) => {
                self.flush(ctx);
                return Err(e);
            }
        };

        match status {
            MxStatus::NewMail => self.mailbox.post(MailboxEvent::NewMail),
            MxStatus::Reopened => self.mailbox.post(MailboxEvent::Invalid),
            MxStatus::FlagsChanged => self.mailbox.post(MailboxEvent::Change),
            _ => (),
        }
        self.mailbox.update_counts();
        self.flush(ctx);
        if MxStatus::Ok != status {
            debug!("{} check: {:?}", self.mailbox.log_prefix, status);
        }
        Ok(status)
    }

    /// Refresh the counts without loading messages.
    pub fn check_stats(
        &mut self,
        ctx: &mut Context,
        force: bool,
    ) -> Result<MxStatus, Error> {
        self.ops.configure(&ctx.config, self.scope);
        self.ops.mbox_check_stats(&mut self.mailbox, force)
    }

    /// Write changes back. With `purge`, deleted messages are removed;
    /// otherwise their deleted marks are dropped.
    pub fn sync(
        &mut self,
        ctx: &mut Context,
        purge: bool,
    ) -> Result<MxStatus, Error> {
        if self.mailbox.readonly {
            return Err(Error::AclDenied);
        }

        let deleted = self.mailbox.counts.deleted;
        if !self.mailbox.changed && 0 == deleted {
            debug!("{} Mailbox is unchanged", self.mailbox.log_prefix);
            return Ok(MxStatus::Ok);
        }

        if deleted > 0 {
            if purge {
                check_acl(
                    self.mailbox.rights,
                    AclRights::DELETE | AclRights::EXPUNGE,
                    "Purging deleted messages",
                )?;
                for e in &mut self.mailbox.emails {
                    if e.deleted {
                        e.purge = true;
                    }
                }
            } else {
                if !self.mailbox.changed {
                    return Ok(MxStatus::Ok);
                }
                for e in &mut self.mailbox.emails {
                    e.deleted = false;
                    e.purge = false;
                }
                self.mailbox.update_counts();
            }
            self.mailbox.post(MailboxEvent::Untag);
        }

        self.ops.configure(&ctx.config, self.scope);
        let status = match self.ops.mbox_sync(&mut self.mailbox) {
            Ok(status) => status,
            Err(e) => {
                self.flush(ctx);
                return Err(e);
            }
        };

        let total = self.mailbox.len();
        let removed = self.mailbox.update_tables();
        info!(
            "{} {} kept, {} deleted",
            self.mailbox.log_prefix,
            total - removed.len(),
            removed.len()
        );
        self.mailbox.post(MailboxEvent::Update);
        self.flush(ctx);
        Ok(status)
    }

    /// Close the mailbox, detaching it from its account. Nothing is
    /// written back.
    pub fn close(
        mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
    ) -> Result<(), Error> {
        let result = self.ops.mbox_close(&mut self.mailbox);
        self.mailbox.post(MailboxEvent::Delete);
        self.flush(ctx);
        if let Some(node) = self.mailbox.notify {
            ctx.bus.node_free(node);
        }
        accounts.detach(&mut ctx.bus, &self.mailbox.path);
        result
    }

    pub fn msg_open(&mut self, index: usize) -> Result<Message, Error> {
        check_acl(self.mailbox.rights, AclRights::READ, "Reading a message")?;
        if index >= self.mailbox.len() {
            return Err(Error::NotFound(format!("message {}", index)));
        }
        self.ops.msg_open(&self.mailbox, index)
    }

    pub fn msg_close(&mut self, msg: Message) -> Result<(), Error> {
        self.ops.msg_close(&self.mailbox, msg)
    }

    pub fn msg_open_new(&mut self) -> Result<NewMessage, Error> {
        check_acl(self.mailbox.rights, AclRights::INSERT, "Adding a message")?;
        self.ops.msg_open_new(&self.mailbox, None)
    }

    pub fn msg_commit(
        &mut self,
        ctx: &mut Context,
        msg: NewMessage,
    ) -> Result<usize, Error> {
        let index = self.ops.msg_commit(&mut self.mailbox, msg)?;
        self.mailbox.update_counts();
        self.flush(ctx);
        Ok(index)
    }

    pub fn msg_padding_size(&self) -> u64 {
        self.ops.msg_padding_size(&self.mailbox)
    }

    pub fn msg_save_hcache(&mut self, index: usize) -> Result<(), Error> {
        self.ops.msg_save_hcache(&self.mailbox, index)
    }

    pub fn supports_tags(&self) -> bool {
        self.ops.tags_edit(&self.mailbox, "").is_ok()
    }

    /// Validate and normalise a tag edit.
    pub fn tags_edit(&self, buf: &str) -> Result<String, Error> {
        self.ops.tags_edit(&self.mailbox, buf)
    }

    /// Apply a tag edit to the message at `index`.
    pub fn tags_commit(
        &mut self,
        ctx: &mut Context,
        index: usize,
        buf: &str,
    ) -> Result<(), Error> {
        check_acl(self.mailbox.rights, AclRights::WRITE, "Changing tags")?;
        parse_tag_edit(buf).map_err(Error::InvalidValue)?;
        self.ops.configure(&ctx.config, self.scope);
        let result = self.ops.tags_commit(&mut self.mailbox, index, buf);
        if result.is_ok() {
            self.mailbox.update_counts();
        }
        self.flush(ctx);
        result
    }

    /// Whether the message at `index` still matches what the mailbox
    /// shows, e.g. the query of a tag-database mailbox.
    pub fn msg_still_queried(&self, index: usize) -> Result<bool, Error> {
        self.ops.msg_still_queried(&self.mailbox, index)
    }

    pub fn path_parent(&self) -> Result<String, Error> {
        self.ops.path_parent(&self.mailbox.path)
    }

    pub fn path_is_empty(&self) -> Result<bool, Error> {
        self.ops.path_is_empty(&self.mailbox.path)
    }
}

impl Drop for Mx {
    fn drop(&mut self) {
        if self.mailbox.changed {
            warn!(
                "{} Closed with unsynced changes",
                self.mailbox.log_prefix
            );
        }
    }
}
