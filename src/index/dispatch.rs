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

//! Index operations.
//!
//! Every operation has one entry in `OPS` giving its name, what must hold
//! before it may run, and where the cursor goes afterwards when `resolve`
//! is set. `Controller::dispatch` checks the former, runs the operation and
//! applies the latter.

use bitflags::bitflags;
use log::debug;
use regex::Regex;

use super::pattern::Pattern;
use super::state::{position_of, Controller};
use super::{Limit, MailboxView};
use crate::context::Context;
use crate::email::Flag;
use crate::mailbox::account::Accounts;
use crate::mailbox::backend::OpenFlags;
use crate::support::error::Error;
use crate::tagdb::tags::QueryType;
use crate::tagdb::window;
use crate::thread::link_threads;

bitflags! {
    /// What must hold before an operation may run.
    pub struct Needs: u8 {
        const MAILBOX = 1 << 0;
        const MESSAGES = 1 << 1;
        const VISIBLE = 1 << 2;
        const WRITABLE = 1 << 3;
        const NOT_ATTACH = 1 << 4;
        const TAGS = 1 << 5;
        /// The mailbox is not a local directory.
        const NETWORK = 1 << 6;

        /// A message is selected.
        const VIEW = Self::MAILBOX.bits | Self::MESSAGES.bits
            | Self::VISIBLE.bits;
        /// A message is selected and may be changed.
        const EDIT = Self::VIEW.bits | Self::WRITABLE.bits
            | Self::NOT_ATTACH.bits;
        /// A message is selected and its tags may be changed.
        const RETAG = Self::EDIT.bits | Self::TAGS.bits;
        const REMOTE = Self::MAILBOX.bits | Self::NETWORK.bits;
    }
}

/// Where the cursor goes after an operation changed the selected message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolve {
    NextEmail,
    NextUndeleted,
    NextThread,
    NextSubthread,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    ChangeFolder,
    Quit,
    Sync,
    TagPrefix,
    Limit,
    LimitThread,
    Search,
    SearchReverse,
    SearchNext,
    SearchOpposite,
    CollapseThread,
    CollapseAll,
    LinkThreads,
    BreakThread,
    Jump,
    FirstEntry,
    LastEntry,
    NextEntry,
    PreviousEntry,
    NextNew,
    PreviousNew,
    NextUnread,
    PreviousUnread,
    NextUndeleted,
    PreviousUndeleted,
    NextThread,
    PreviousThread,
    NextSubthread,
    PreviousSubthread,
    ParentMessage,
    RootMessage,
    Delete,
    DeleteThread,
    DeleteSubthread,
    Undelete,
    UndeleteThread,
    UndeleteSubthread,
    DeletePattern,
    UndeletePattern,
    TagPattern,
    UntagPattern,
    Tag,
    Flag,
    ToggleNew,
    ReadThread,
    ReadSubthread,
    ModifyTags,
    ModifyTagsThenHide,
    VfolderFromQuery,
    WindowBackward,
    WindowForward,
    WindowReset,
}

struct OpDef {
    op: Op,
    name: &'static str,
    needs: Needs,
    resolve: Option<Resolve>,
}

macro_rules! op {
    ($op:ident, $name:expr, $needs:expr) => {
        OpDef {
            op: Op::$op,
            name: $name,
            needs: $needs,
            resolve: None,
        }
    };
    ($op:ident, $name:expr, $needs:expr, $resolve:ident) => {
        OpDef {
            op: Op::$op,
            name: $name,
            needs: $needs,
            resolve: Some(Resolve::$resolve),
        }
    };
}

#[rustfmt::skip]
static OPS: &[OpDef] = &[
    op!(ChangeFolder, "change-folder", Needs::empty()),
    op!(Quit, "quit", Needs::empty()),
    op!(Sync, "sync-mailbox", Needs::MAILBOX),
    op!(TagPrefix, "tag-prefix", Needs::MAILBOX),
    op!(Limit, "limit", Needs::MAILBOX),
    op!(LimitThread, "limit-current-thread", Needs::VIEW),
    op!(Search, "search", Needs::VIEW),
    op!(SearchReverse, "search-reverse", Needs::VIEW),
    op!(SearchNext, "search-next", Needs::VIEW),
    op!(SearchOpposite, "search-opposite", Needs::VIEW),
    op!(CollapseThread, "collapse-thread", Needs::VIEW),
    op!(CollapseAll, "collapse-all", Needs::VIEW),
    op!(LinkThreads, "link-threads", Needs::EDIT),
    op!(BreakThread, "break-thread", Needs::EDIT),
    op!(Jump, "jump", Needs::MAILBOX),
    op!(FirstEntry, "first-entry", Needs::VIEW),
    op!(LastEntry, "last-entry", Needs::VIEW),
    op!(NextEntry, "next-entry", Needs::VIEW),
    op!(PreviousEntry, "previous-entry", Needs::VIEW),
    op!(NextNew, "next-new", Needs::VIEW),
    op!(PreviousNew, "previous-new", Needs::VIEW),
    op!(NextUnread, "next-unread", Needs::VIEW),
    op!(PreviousUnread, "previous-unread", Needs::VIEW),
    op!(NextUndeleted, "next-undeleted", Needs::VIEW),
    op!(PreviousUndeleted, "previous-undeleted", Needs::VIEW),
    op!(NextThread, "next-thread", Needs::VIEW),
    op!(PreviousThread, "previous-thread", Needs::VIEW),
    op!(NextSubthread, "next-subthread", Needs::VIEW),
    op!(PreviousSubthread, "previous-subthread", Needs::VIEW),
    op!(ParentMessage, "parent-message", Needs::VIEW),
    op!(RootMessage, "root-message", Needs::VIEW),
    op!(Delete, "delete-message", Needs::EDIT, NextUndeleted),
    op!(DeleteThread, "delete-thread", Needs::EDIT, NextUndeleted),
    op!(DeleteSubthread, "delete-subthread", Needs::EDIT, NextUndeleted),
    op!(Undelete, "undelete-message", Needs::EDIT, NextEmail),
    op!(UndeleteThread, "undelete-thread", Needs::EDIT, NextThread),
    op!(UndeleteSubthread, "undelete-subthread", Needs::EDIT, NextSubthread),
    op!(DeletePattern, "delete-pattern", Needs::EDIT),
    op!(UndeletePattern, "undelete-pattern", Needs::EDIT),
    op!(TagPattern, "tag-pattern", Needs::VIEW),
    op!(UntagPattern, "untag-pattern", Needs::VIEW),
    op!(Tag, "tag-entry", Needs::VIEW, NextEmail),
    op!(Flag, "flag-message", Needs::EDIT, NextUndeleted),
    op!(ToggleNew, "toggle-new", Needs::EDIT, NextUndeleted),
    op!(ReadThread, "read-thread", Needs::EDIT, NextThread),
    op!(ReadSubthread, "read-subthread", Needs::EDIT, NextSubthread),
    op!(ModifyTags, "modify-labels", Needs::RETAG),
    op!(ModifyTagsThenHide, "modify-labels-then-hide", Needs::RETAG,
        NextUndeleted),
    op!(VfolderFromQuery, "vfolder-from-query", Needs::empty()),
    op!(WindowBackward, "vfolder-window-backward", Needs::REMOTE),
    op!(WindowForward, "vfolder-window-forward", Needs::REMOTE),
    op!(WindowReset, "vfolder-window-reset", Needs::REMOTE),
];

impl Op {
    fn def(self) -> Option<&'static OpDef> {
        OPS.iter().find(|d| d.op == self)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        OPS.iter().find(|d| d.name == name).map(|d| d.op)
    }

    pub fn name(self) -> &'static str {
        self.def().map_or("", |d| d.name)
    }

    pub fn needs(self) -> Needs {
        self.def().map_or(Needs::empty(), |d| d.needs)
    }

    pub fn resolve(self) -> Option<Resolve> {
        self.def().and_then(|d| d.resolve)
    }

    /// Whether the operation applies to the tagged messages when preceded
    /// by `tag-prefix`.
    fn takes_prefix(self) -> bool {
        match self {
            Op::Delete
            | Op::Undelete
            | Op::Flag
            | Op::ToggleNew
            | Op::Tag
            | Op::ModifyTags
            | Op::ModifyTagsThenHide => true,
            _ => false,
        }
    }
}

fn no_mailbox() -> Error {
    Error::Precondition("No mailbox is open")
}

fn needs_arg(op: Op, arg: Option<&str>) -> Result<&str, Error> {
    arg.ok_or_else(|| {
        Error::InvalidValue(format!("{} needs an argument", op.name()))
    })
}

impl Controller {
    /// Check that `needs` holds.
    pub fn check_needs(&self, needs: Needs) -> Result<(), Error> {
        let view = match self.view {
            Some(ref view) => view,
            None if needs.contains(Needs::MAILBOX) => {
                return Err(no_mailbox())
            }
            None => return Ok(()),
        };
        let m = view.mailbox();

        if needs.contains(Needs::MESSAGES) && m.is_empty() {
            return Err(Error::Precondition("There are no messages"));
        }
        if needs.contains(Needs::VISIBLE) && self.current().is_none() {
            return Err(Error::Precondition("No visible messages"));
        }
        if needs.contains(Needs::WRITABLE) && m.readonly {
            return Err(Error::Precondition("Mailbox is read-only"));
        }
        if needs.contains(Needs::NOT_ATTACH) && self.attach_mode {
            return Err(Error::Precondition(
                "Function not permitted in attach-message mode",
            ));
        }
        if needs.contains(Needs::TAGS) && !view.mx.supports_tags() {
            return Err(Error::Precondition("Mailbox does not support tags"));
        }
        if needs.contains(Needs::NETWORK) && view.mx.is_local() {
            return Err(Error::Precondition(
                "Only available for tag-database mailboxes",
            ));
        }
        Ok(())
    }

    fn view_mut_or_err(&mut self) -> Result<&mut MailboxView, Error> {
        self.view.as_mut().ok_or_else(no_mailbox)
    }

    fn current_or_err(&self) -> Result<usize, Error> {
        self.current()
            .ok_or(Error::Precondition("No visible messages"))
    }

    /// Run `op`. `arg` is what the user was prompted for, where the
    /// operation needs something.
    pub fn dispatch(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
        op: Op,
        arg: Option<&str>,
    ) -> Result<(), Error> {
        self.check_needs(op.needs())?;

        let prefixed = self.tag_prefix && op.takes_prefix();
        if Op::TagPrefix != op {
            self.tag_prefix = false;
        }

        debug!("Dispatching {}", op.name());
        let result = self.run(ctx, accounts, op, arg, prefixed);
        if let Some(ref mut view) = self.view {
            view.mx.flush(ctx);
        }
        result?;

        if !prefixed && ctx.config.get_bool(ctx.root(), "resolve")? {
            if let Some(policy) = op.resolve() {
                self.resolve(policy);
            }
        }
        Ok(())
    }

    fn run(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
        op: Op,
        arg: Option<&str>,
        prefixed: bool,
    ) -> Result<(), Error> {
        match op {
            Op::ChangeFolder => {
                let path = needs_arg(op, arg)?;
                self.open(ctx, accounts, path, OpenFlags::empty())
            }
            Op::Quit => self.quit(ctx, accounts),
            Op::Sync => {
                let scope = self.view_mut_or_err()?.scope();
                let purge = ctx.config.get_quad(scope, "delete")?;
                self.sync(ctx, purge.default_answer())
            }
            Op::TagPrefix => {
                let tagged = self
                    .view
                    .as_ref()
                    .map_or(0, |v| v.mailbox().counts.tagged);
                if 0 == tagged {
                    return Err(Error::Precondition("No tagged messages"));
                }
                self.tag_prefix = !self.tag_prefix;
                Ok(())
            }

            Op::Limit => {
                let text = needs_arg(op, arg)?;
                let limit = if Pattern::is_all(text) {
                    None
                } else {
                    Some(self.view_mut_or_err()?.compile(ctx, text)?)
                };
                self.set_limit(limit)
            }
            Op::LimitThread => self.limit_thread(),
            Op::Search | Op::SearchReverse => {
                let text = needs_arg(op, arg)?;
                let view = self.view_mut_or_err()?;
                view.search.last = Some(view.compile(ctx, text)?);
                view.search.reverse = Op::SearchReverse == op;
                self.search(false)
            }
            Op::SearchNext => self.search(false),
            Op::SearchOpposite => self.search(true),

            Op::CollapseThread => self.collapse_thread(),
            Op::CollapseAll => self.collapse_all(),
            Op::LinkThreads => self.link_tagged(ctx),
            Op::BreakThread => {
                let ix = self.current_or_err()?;
                let identity = self.selected();
                let view = self.view_mut_or_err()?;
                view.threads.break_thread(&mut view.mx.mailbox, ix)?;
                view.sort_headers(ctx, false)?;
                self.restore_cursor(identity.as_ref(), None);
                Ok(())
            }

            Op::Jump => self.jump(ctx, needs_arg(op, arg)?),
            Op::FirstEntry => self.move_to(Some(0), "There are no messages"),
            Op::LastEntry => {
                let last = self.vcount().checked_sub(1);
                self.move_to(last, "There are no messages")
            }
            Op::NextEntry => {
                let next = self.cursor.map(|c| c + 1);
                let next = next.filter(|&c| c < self.vcount());
                self.move_to(next, "You are on the last message")
            }
            Op::PreviousEntry => {
                let prev = self.cursor.and_then(|c| c.checked_sub(1));
                self.move_to(prev, "You are on the first message")
            }
            Op::NextNew | Op::PreviousNew => {
                let forward = Op::NextNew == op;
                let found = self.find_unread(forward, true);
                self.move_to(found, "No new messages")
            }
            Op::NextUnread | Op::PreviousUnread => {
                let forward = Op::NextUnread == op;
                let found = self.find_unread(forward, false);
                self.move_to(found, "No unread messages")
            }
            Op::NextUndeleted => {
                let found = self.find_next_undeleted(false);
                self.move_to(found, "You are on the last message")
            }
            Op::PreviousUndeleted => {
                let found = self.find_previous_undeleted(false);
                self.move_to(found, "You are on the first message")
            }
            Op::NextThread
            | Op::PreviousThread
            | Op::NextSubthread
            | Op::PreviousSubthread => {
                let forward = Op::NextThread == op || Op::NextSubthread == op;
                let subthreads =
                    Op::NextSubthread == op || Op::PreviousSubthread == op;
                self.require_threads()?;
                let found = self.aside(forward, subthreads);
                self.move_to(
                    found,
                    match (forward, subthreads) {
                        (true, false) => "No more threads",
                        (false, false) => "You are on the first thread",
                        (true, true) => "No more subthreads",
                        (false, true) => "You are on the first subthread",
                    },
                )
            }
            Op::ParentMessage | Op::RootMessage => {
                self.parent_message(Op::RootMessage == op)
            }

            Op::Delete | Op::Undelete => {
                let targets = self.targets(prefixed)?;
                self.set_flags(&targets, Flag::Deleted, Op::Delete == op)
            }
            Op::DeleteThread | Op::UndeleteThread => {
                let targets = self.thread_targets(false)?;
                self.set_flags(&targets, Flag::Deleted, Op::DeleteThread == op)
            }
            Op::DeleteSubthread | Op::UndeleteSubthread => {
                let targets = self.thread_targets(true)?;
                let on = Op::DeleteSubthread == op;
                self.set_flags(&targets, Flag::Deleted, on)
            }
            Op::DeletePattern
            | Op::UndeletePattern
            | Op::TagPattern
            | Op::UntagPattern => {
                let text = needs_arg(op, arg)?;
                let (flag, on) = match op {
                    Op::DeletePattern => (Flag::Deleted, true),
                    Op::UndeletePattern => (Flag::Deleted, false),
                    Op::TagPattern => (Flag::Tagged, true),
                    _ => (Flag::Tagged, false),
                };
                self.flag_pattern(ctx, text, flag, on)
            }
            Op::Tag => {
                let targets = self.targets(prefixed)?;
                let on = if prefixed {
                    false
                } else {
                    !self.current_email_flag(|e| e.tagged)?
                };
                self.set_flags(&targets, Flag::Tagged, on)
            }
            Op::Flag => {
                let targets = self.targets(prefixed)?;
                let on = !self.current_email_flag(|e| e.flagged)?;
                self.set_flags(&targets, Flag::Flagged, on)
            }
            Op::ToggleNew => {
                let targets = self.targets(prefixed)?;
                let view = self.view_mut_or_err()?;
                let m = &mut view.mx.mailbox;
                for ix in targets {
                    if m.emails[ix].read || m.emails[ix].old {
                        m.set_flag(ix, Flag::New, true)?;
                    } else {
                        m.set_flag(ix, Flag::Read, true)?;
                    }
                }
                Ok(())
            }
            Op::ReadThread | Op::ReadSubthread => {
                let targets = self.thread_targets(Op::ReadSubthread == op)?;
                self.set_flags(&targets, Flag::Read, true)
            }
            Op::ModifyTags | Op::ModifyTagsThenHide => {
                let edit = needs_arg(op, arg)?;
                let targets = self.targets(prefixed)?;
                self.modify_tags(
                    ctx,
                    &targets,
                    edit,
                    Op::ModifyTagsThenHide == op,
                )
            }

            Op::VfolderFromQuery => {
                let query = needs_arg(op, arg)?;
                self.vfolder_from_query(ctx, accounts, query)
            }
            Op::WindowBackward | Op::WindowForward | Op::WindowReset => {
                let view = self.view_mut_or_err()?;
                let scope = view.scope();
                let path = view.mailbox().path.clone();
                match op {
                    Op::WindowBackward => window::backward(ctx, scope)?,
                    Op::WindowForward => window::forward(ctx, scope)?,
                    _ => window::reset(ctx, scope)?,
                }
                self.open(ctx, accounts, &path, OpenFlags::empty())
            }
        }
    }

    fn vcount(&self) -> usize {
        self.view.as_ref().map_or(0, |v| v.mailbox().vcount())
    }

    fn move_to(
        &mut self,
        vnum: Option<usize>,
        otherwise: &'static str,
    ) -> Result<(), Error> {
        match vnum.filter(|&v| v < self.vcount()) {
            Some(v) => {
                self.cursor = Some(v);
                Ok(())
            }
            None => Err(Error::Precondition(otherwise)),
        }
    }

    fn require_threads(&self) -> Result<(), Error> {
        match self.view {
            Some(ref view) if view.threads.is_threaded() => Ok(()),
            Some(_) => Err(Error::Precondition("Threading is not enabled")),
            None => Err(no_mailbox()),
        }
    }

    fn current_email_flag(
        &self,
        f: impl Fn(&crate::email::Email) -> bool,
    ) -> Result<bool, Error> {
        let ix = self.current_or_err()?;
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        Ok(f(&view.mailbox().emails[ix]))
    }

    /// The tagged messages with a prefix, else the selected one.
    fn targets(&self, prefixed: bool) -> Result<Vec<usize>, Error> {
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        if prefixed {
            let m = view.mailbox();
            Ok(m.v2r.iter().copied().filter(|&ix| m.emails[ix].tagged).collect())
        } else {
            Ok(vec![self.current_or_err()?])
        }
    }

    /// The selected message with its whole thread, or with `subthread` with
    /// the replies below it.
    fn thread_targets(&self, subthread: bool) -> Result<Vec<usize>, Error> {
        self.require_threads()?;
        let ix = self.current_or_err()?;
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        let m = view.mailbox();
        if subthread {
            let mut targets = vec![ix];
            targets.extend(view.threads.descendants(m, ix));
            Ok(targets)
        } else {
            Ok(view.threads.thread_of(m, ix))
        }
    }

    fn set_flags(
        &mut self,
        targets: &[usize],
        flag: Flag,
        on: bool,
    ) -> Result<(), Error> {
        let view = self.view_mut_or_err()?;
        let mut changed = 0;
        for &ix in targets {
            if view.mx.mailbox.set_flag(ix, flag, on)? {
                changed += 1;
            }
        }
        debug!(
            "{} {:?} {} on {} of {} messages",
            view.mailbox().log_prefix,
            flag,
            on,
            changed,
            targets.len()
        );
        Ok(())
    }

    fn flag_pattern(
        &mut self,
        ctx: &Context,
        text: &str,
        flag: Flag,
        on: bool,
    ) -> Result<(), Error> {
        let view = self.view_mut_or_err()?;
        let targets: Vec<usize> = if Pattern::is_all(text) {
            view.mailbox().v2r.clone()
        } else {
            let limit = view.compile(ctx, text)?;
            let m = view.mailbox();
            m.v2r
                .iter()
                .copied()
                .filter(|&ix| limit.pattern.matches(m, &m.emails[ix]))
                .collect()
        };
        self.set_flags(&targets, flag, on)
    }

    fn set_limit(&mut self, limit: Option<Limit>) -> Result<(), Error> {
        let identity = self.selected();
        self.view_mut_or_err()?.set_limit(limit)?;
        self.restore_cursor(identity.as_ref(), None);
        Ok(())
    }

    /// Limit the view to the thread of the selected message.
    fn limit_thread(&mut self) -> Result<(), Error> {
        let ix = self.current_or_err()?;
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        let m = view.mailbox();
        let mut ids = Vec::new();
        for i in view.threads.thread_of(m, ix) {
            let id = &m.emails[i].id;
            if !id.is_empty() {
                ids.push(Pattern::Id(Regex::new(&format!(
                    "^{}$",
                    regex::escape(id)
                ))?));
            }
        }
        if ids.is_empty() {
            return Err(Error::Precondition("Message has no Message-ID"));
        }

        let text = format!("~i {}", m.emails[ix].id);
        self.set_limit(Some(Limit {
            text,
            pattern: Pattern::Or(ids),
        }))
    }

    /// Move to the next match of the last search, towards the top if it
    /// ran that way, flipped with `opposite`. Wraps around.
    fn search(&mut self, opposite: bool) -> Result<(), Error> {
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        let limit = view
            .search
            .last
            .as_ref()
            .ok_or(Error::Precondition("No search pattern"))?;
        let backward = view.search.reverse != opposite;
        let m = view.mailbox();
        let n = m.vcount();
        let start = self.cursor.unwrap_or(0);

        let found = (1..=n)
            .map(|step| {
                if backward {
                    (start + n - step % n) % n
                } else {
                    (start + step) % n
                }
            })
            .find(|&v| {
                let e = &m.emails[m.v2r[v]];
                limit.pattern.matches(m, e)
            });
        self.move_to(found, "Not found")
    }

    fn collapse_thread(&mut self) -> Result<(), Error> {
        self.require_threads()?;
        let ix = self.current_or_err()?;
        let view = self.view_mut_or_err()?;
        let m = &mut view.mx.mailbox;
        let shown = if view.threads.is_collapsed(m, ix) {
            view.threads.uncollapse_thread(m, ix)
        } else if view.threads.can_collapse(m, ix) {
            view.threads.collapse_thread(m, ix)
        } else {
            return Err(Error::Precondition(
                "Thread contains unread or flagged messages",
            ));
        };
        let vnum = shown.and_then(|s| m.emails[s].vnum);
        self.cursor = vnum;
        Ok(())
    }

    /// Collapse every thread, or expand them all if collapsed. Expanding
    /// returns to the message selected before collapsing.
    fn collapse_all(&mut self) -> Result<(), Error> {
        self.require_threads()?;
        let selected = self.selected();
        let view = self.view_mut_or_err()?;
        let collapse = !view.collapsed;
        view.collapsed = collapse;
        view.threads.collapse_all(&mut view.mx.mailbox, collapse);

        let target = if collapse {
            self.collapse_anchor = selected.clone();
            selected
        } else {
            self.collapse_anchor.take().or(selected)
        };
        self.restore_cursor(target.as_ref(), None);
        Ok(())
    }

    /// Make the tagged messages replies to the selected one.
    fn link_tagged(&mut self, ctx: &Context) -> Result<(), Error> {
        let parent = self.current_or_err()?;
        let identity = self.selected();
        let view = self.view_mut_or_err()?;
        let children: Vec<usize> = view
            .mailbox()
            .emails
            .iter()
            .filter(|e| e.tagged && e.index != parent)
            .map(|e| e.index)
            .collect();
        if children.is_empty() {
            return Err(Error::Precondition(
                "First, please tag a message to be linked here",
            ));
        }

        if link_threads(&mut view.mx.mailbox, parent, &children)? {
            view.sort_headers(ctx, false)?;
        }
        self.restore_cursor(identity.as_ref(), None);
        Ok(())
    }

    /// Go to message number `target`, counting from 1 in arrival order.
    fn jump(&mut self, ctx: &Context, target: &str) -> Result<(), Error> {
        let view = self.view_mut_or_err()?;
        let uncollapse =
            ctx.config.get_bool(view.scope(), "uncollapse_jump")?;
        let m = &mut view.mx.mailbox;
        let ix = target
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .filter(|&ix| ix < m.len())
            .ok_or_else(|| {
                Error::InvalidValue("Invalid message number".to_owned())
            })?;

        if uncollapse
            && m.emails[ix].vnum.is_none()
            && view.threads.is_collapsed(m, ix)
        {
            view.threads.uncollapse_thread(m, ix);
        }
        let vnum = m.emails[ix].vnum;
        match vnum {
            Some(v) => {
                self.cursor = Some(v);
                Ok(())
            }
            None => Err(Error::Precondition("That message is not visible")),
        }
    }

    /// The view position of the next (or previous) unread message, or with
    /// `new_only` new message, wrapping around. A collapsed thread counts
    /// if anything inside it qualifies.
    fn find_unread(&self, forward: bool, new_only: bool) -> Option<usize> {
        let view = self.view.as_ref()?;
        let m = view.mailbox();
        let n = m.vcount();
        let start = self.cursor?;
        let wanted = if new_only { 2 } else { 1 };

        (1..n).map(|step| {
            if forward {
                (start + step) % n
            } else {
                (start + n - step) % n
            }
        })
        .find(|&v| {
            let ix = m.v2r[v];
            let e = &m.emails[ix];
            let own = if new_only { e.is_new() } else { !e.read };
            own || (e.num_hidden > 0
                && view.threads.is_collapsed(m, ix)
                && view.threads.contains_unread(m, ix) >= wanted)
        })
    }

    /// The next undeleted message below the cursor. With `uncollapse`,
    /// collapsed threads passed over are expanded so that undeleted
    /// messages hidden in them can be found.
    pub fn find_next_undeleted(&mut self, uncollapse: bool) -> Option<usize> {
        let start = self.cursor?;
        let view = self.view.as_mut()?;
        let mut v = start + 1;
        while v < view.mailbox().vcount() {
            let ix = view.mailbox().v2r[v];
            let e = &view.mailbox().emails[ix];
            if !e.deleted {
                return Some(v);
            }
            if uncollapse
                && e.num_hidden > 0
                && view.threads.is_collapsed(view.mailbox(), ix)
            {
                view.threads.uncollapse_thread(&mut view.mx.mailbox, ix);
            }
            v += 1;
        }
        None
    }

    /// The previous undeleted message above the cursor, expanding collapsed
    /// threads on the way with `uncollapse`.
    pub fn find_previous_undeleted(
        &mut self,
        uncollapse: bool,
    ) -> Option<usize> {
        let start = self.cursor?;
        let view = self.view.as_mut()?;
        let mut v = start;
        let mut revealed = 0;
        let mut found = None;
        while v > 0 {
            v -= 1;
            let ix = view.mailbox().v2r[v];
            let e = &view.mailbox().emails[ix];
            if uncollapse
                && e.num_hidden > 0
                && view.threads.is_collapsed(view.mailbox(), ix)
            {
                // The thread opens below `v`; look at what it revealed
                let before = view.mailbox().vcount();
                view.threads.uncollapse_thread(&mut view.mx.mailbox, ix);
                let opened = view.mailbox().vcount() - before;
                revealed += opened;
                v += 1 + opened;
                continue;
            }
            if !e.deleted {
                found = Some(v);
                break;
            }
        }

        // Everything at and below the cursor moved down
        self.cursor = Some(start + revealed);
        found
    }

    fn aside(&self, forward: bool, subthreads: bool) -> Option<usize> {
        let ix = self.current()?;
        let view = self.view.as_ref()?;
        view.threads.aside(view.mailbox(), ix, forward, subthreads)
    }

    fn parent_message(&mut self, root: bool) -> Result<(), Error> {
        self.require_threads()?;
        let ix = self.current_or_err()?;
        let view = self.view.as_ref().ok_or_else(no_mailbox)?;
        let m = view.mailbox();
        let target = view
            .threads
            .parent_message(m, ix, root)
            .ok_or(Error::Precondition("Parent message is not available"))?;
        match position_of(view, target) {
            Some(v) => {
                self.cursor = Some(v);
                Ok(())
            }
            None if root => Err(Error::Precondition(
                "Root message is not visible in this limited view",
            )),
            None => Err(Error::Precondition(
                "Parent message is not visible in this limited view",
            )),
        }
    }

    fn modify_tags(
        &mut self,
        ctx: &mut Context,
        targets: &[usize],
        edit: &str,
        hide: bool,
    ) -> Result<(), Error> {
        let view = self.view_mut_or_err()?;
        let edit = view.mx.tags_edit(edit)?;
        let mut hidden = false;
        for &ix in targets {
            view.mx.tags_commit(ctx, ix, &edit)?;
            if hide && !view.mx.msg_still_queried(ix)? {
                view.mx.mailbox.emails[ix].quasi_deleted = true;
                hidden = true;
            }
        }

        if hidden {
            let identity = self.selected();
            let old_vnum = self.cursor;
            if let Some(ref mut view) = self.view {
                view.mx.mailbox.update_counts();
                view.threads.set_vnum(&mut view.mx.mailbox);
            }
            // The selection itself may have gone
            self.restore_cursor(identity.as_ref(), old_vnum);
        }
        Ok(())
    }

    /// Open a tag-database mailbox for `query`, restarting the query window
    /// from the present.
    fn vfolder_from_query(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
        query: &str,
    ) -> Result<(), Error> {
        let scope = self.view.as_ref().map_or(ctx.root(), |v| v.scope());
        let base = match self.view {
            Some(ref view) if !view.mx.is_local() => {
                Some(view.mailbox().path.clone())
            }
            _ => ctx
                .config
                .get_str(scope, "nm_default_url")?
                .filter(|url| !url.is_empty()),
        }
        .ok_or(Error::Precondition("No tag database is configured"))?;

        let default_type = ctx
            .config
            .get_str(scope, "nm_query_type")?
            .and_then(|t| QueryType::parse(&t))
            .unwrap_or(QueryType::Messages);
        let db_limit = ctx.config.get_number(scope, "nm_db_limit")?.max(0);
        let url = crate::tagdb::url_from_query(
            &base,
            query,
            default_type,
            db_limit as usize,
        )?;
        window::select_search(ctx, scope, query)?;
        self.open(ctx, accounts, &url, OpenFlags::empty())
    }

    fn resolve(&mut self, policy: Resolve) {
        let next = match policy {
            Resolve::NextEmail => {
                self.cursor.map(|c| c + 1).filter(|&c| c < self.vcount())
            }
            Resolve::NextUndeleted => {
                let uncollapse = !self.focused;
                self.find_next_undeleted(uncollapse)
            }
            Resolve::NextThread => self.aside(true, false),
            Resolve::NextSubthread => self.aside(true, true),
        };
        if next.is_some() {
            self.cursor = next;
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::super::test_support::*;
    use super::*;

    struct Harness {
        fx: Fixture,
        c: Controller,
    }

    impl Harness {
        fn new(parents: &[Option<usize>]) -> Self {
            let mut fx = Fixture::new(parents);
            let mut c = Controller::new();
            let path = fx.path();
            c.open(&mut fx.ctx, &mut fx.accounts, &path, OpenFlags::QUIET)
                .unwrap();
            Harness { fx, c }
        }

        fn run(&mut self, op: Op) -> Result<(), Error> {
            self.c.dispatch(&mut self.fx.ctx, &mut self.fx.accounts, op, None)
        }

        fn run_with(&mut self, op: Op, arg: &str) -> Result<(), Error> {
            self.c.dispatch(
                &mut self.fx.ctx,
                &mut self.fx.accounts,
                op,
                Some(arg),
            )
        }

        fn view(&self) -> &MailboxView {
            self.c.view().unwrap()
        }

        /// The id of the selected message.
        fn at(&self) -> &str {
            let ix = self.c.current().unwrap();
            &self.view().mailbox().emails[ix].id
        }

        fn select(&mut self, index: usize) {
            self.c.cursor = self.view().mailbox().emails[index].vnum;
            assert!(self.c.cursor.is_some());
        }
    }

    #[test]
    fn table_is_consistent() {
        let mut names = HashSet::new();
        let mut ops = HashSet::new();
        for def in OPS {
            assert!(names.insert(def.name), "{}", def.name);
            assert!(ops.insert(def.op), "{:?}", def.op);
            assert_eq!(Some(def.op), Op::from_name(def.name));
        }
        assert_eq!(Some(Resolve::NextUndeleted), Op::Delete.resolve());
        assert_eq!(Some(Resolve::NextEmail), Op::Undelete.resolve());
        assert_eq!(Some(Resolve::NextThread), Op::UndeleteThread.resolve());
        assert_eq!(
            Some(Resolve::NextSubthread),
            Op::ReadSubthread.resolve()
        );
        assert_eq!(None, Op::Limit.resolve());
        assert!(Op::LinkThreads.needs().contains(Needs::WRITABLE));
    }

    #[test]
    fn preconditions() {
        let mut fx = Fixture::new(&[]);
        let mut c = Controller::new();
        assert_matches!(
            Err(Error::Precondition("No mailbox is open")),
            c.dispatch(&mut fx.ctx, &mut fx.accounts, Op::Delete, None)
        );

        let path = fx.path();
        c.open(&mut fx.ctx, &mut fx.accounts, &path, OpenFlags::QUIET)
            .unwrap();
        assert_matches!(
            Err(Error::Precondition("There are no messages")),
            c.dispatch(&mut fx.ctx, &mut fx.accounts, Op::NextEntry, None)
        );
        assert_matches!(
            Err(Error::Precondition("Only available for tag-database mailboxes")),
            c.dispatch(&mut fx.ctx, &mut fx.accounts, Op::WindowReset, None)
        );

        let mut h = Harness::new(&[None, None]);
        h.c.view_mut().unwrap().mx.mailbox.readonly = true;
        assert_matches!(
            Err(Error::Precondition("Mailbox is read-only")),
            h.run(Op::Delete)
        );
        h.c.view_mut().unwrap().mx.mailbox.readonly = false;
        h.c.attach_mode = true;
        assert_matches!(
            Err(Error::Precondition(
                "Function not permitted in attach-message mode"
            )),
            h.run(Op::Delete)
        );
        h.c.attach_mode = false;
        assert_matches!(
            Err(Error::Precondition("Mailbox does not support tags")),
            h.run_with(Op::ModifyTags, "+x")
        );

        let limit = h.view().compile(&h.fx.ctx, "~F").unwrap();
        h.c.view_mut().unwrap().set_limit(Some(limit)).unwrap();
        h.c.cursor = None;
        assert_matches!(
            Err(Error::Precondition("No visible messages")),
            h.run(Op::Delete)
        );
        // Still not deleted
        assert!(h.view().mailbox().emails.iter().all(|e| !e.deleted));
    }

    #[test]
    fn delete_resolves_to_next_undeleted() {
        let mut h = Harness::new(&[None, None, None, None]);
        h.select(2);
        h.run(Op::Delete).unwrap();
        h.select(0);
        h.run(Op::Delete).unwrap();
        assert!(h.view().mailbox().emails[0].deleted);
        assert_eq!("1@test", h.at());

        h.run(Op::Delete).unwrap();
        assert_eq!("3@test", h.at());

        h.run(Op::PreviousUndeleted).unwrap_err();
        h.select(1);
        h.run(Op::Undelete).unwrap();
        assert_eq!("2@test", h.at());

        h.fx.ctx.set("resolve", "no").unwrap();
        h.run(Op::Undelete).unwrap();
        assert_eq!("2@test", h.at());
    }

    #[test]
    fn thread_operations_resolve_to_next_thread() {
        // A(0) { B(1) { C(2) } }, D(3) { E(4) }
        let mut h = Harness::new(&[None, Some(0), Some(1), None, Some(3)]);
        h.select(1);
        h.run(Op::ReadThread).unwrap();
        let m = h.view().mailbox();
        assert!(m.emails[0].read && m.emails[1].read && m.emails[2].read);
        assert!(!m.emails[3].read);
        assert_eq!("3@test", h.at());

        h.select(1);
        h.run(Op::DeleteSubthread).unwrap();
        let m = h.view().mailbox();
        assert!(!m.emails[0].deleted);
        assert!(m.emails[1].deleted && m.emails[2].deleted);
        assert_eq!("3@test", h.at());

        h.select(2);
        h.run(Op::UndeleteSubthread).unwrap();
        assert!(!h.view().mailbox().emails[2].deleted);
        assert!(h.view().mailbox().emails[1].deleted);
    }

    #[test]
    fn collapse_all_keeps_selection() {
        // A(0) { B(1) { C(2) } }, D(3)
        let mut h = Harness::new(&[None, Some(0), Some(1), None]);
        h.fx.ctx.set("collapse_unread", "yes").unwrap();
        h.select(2);
        assert_eq!(2, h.view().mailbox().emails[2].depth);

        h.run(Op::CollapseAll).unwrap();
        assert_eq!(vec![0, 3], h.view().mailbox().v2r);
        assert_eq!("0@test", h.at());
        assert_eq!(2, h.view().mailbox().emails[0].num_hidden);

        h.run(Op::CollapseAll).unwrap();
        assert_eq!(vec![0, 1, 2, 3], h.view().mailbox().v2r);
        assert_eq!("2@test", h.at());
    }

    #[test]
    fn collapse_thread_toggles() {
        let mut h = Harness::new(&[None, Some(0), None]);
        h.select(1);
        h.run(Op::CollapseThread).unwrap();
        assert_eq!("0@test", h.at());
        assert_eq!(2, h.view().mailbox().vcount());
        h.run(Op::CollapseThread).unwrap();
        assert_eq!(3, h.view().mailbox().vcount());
        assert_eq!("0@test", h.at());

        h.fx.ctx.set("collapse_unread", "no").unwrap();
        h.c.resort(&h.fx.ctx).unwrap();
        assert_matches!(Err(Error::Precondition(_)), h.run(Op::CollapseThread));

        h.fx.ctx.set("use_threads", "flat").unwrap();
        h.c.resort(&h.fx.ctx).unwrap();
        assert_matches!(
            Err(Error::Precondition("Threading is not enabled")),
            h.run(Op::CollapseThread)
        );
    }

    #[test]
    fn moving_by_thread_and_parent() {
        // A(0) { B(1) { C(2) }, E(4) }, D(3)
        let mut h =
            Harness::new(&[None, Some(0), Some(1), None, Some(0)]);
        assert_eq!(vec![0, 1, 2, 4, 3], h.view().mailbox().v2r);
        h.select(2);
        h.run(Op::NextSubthread).unwrap();
        assert_eq!("4@test", h.at());
        h.run(Op::NextThread).unwrap();
        assert_eq!("3@test", h.at());
        assert_matches!(
            Err(Error::Precondition("No more threads")),
            h.run(Op::NextThread)
        );
        h.run(Op::PreviousThread).unwrap();
        assert_eq!("0@test", h.at());

        h.select(2);
        h.run(Op::ParentMessage).unwrap();
        assert_eq!("1@test", h.at());
        h.select(2);
        h.run(Op::RootMessage).unwrap();
        assert_eq!("0@test", h.at());
        assert_matches!(Err(_), h.run(Op::ParentMessage));
    }

    #[test]
    fn entries_and_jumps() {
        let mut h = Harness::new(&[None, Some(0), None]);
        h.run(Op::LastEntry).unwrap();
        assert_eq!("2@test", h.at());
        assert_matches!(
            Err(Error::Precondition("You are on the last message")),
            h.run(Op::NextEntry)
        );
        h.run(Op::FirstEntry).unwrap();
        assert_matches!(Err(_), h.run(Op::PreviousEntry));

        h.run_with(Op::Jump, "3").unwrap();
        assert_eq!("2@test", h.at());
        assert_matches!(Err(Error::InvalidValue(_)), h.run_with(Op::Jump, "0"));
        assert_matches!(Err(Error::InvalidValue(_)), h.run_with(Op::Jump, "9"));

        h.select(0);
        h.run(Op::CollapseThread).unwrap();
        assert_matches!(
            Err(Error::Precondition("That message is not visible")),
            h.run_with(Op::Jump, "2")
        );
        h.fx.ctx.set("uncollapse_jump", "yes").unwrap();
        h.run_with(Op::Jump, "2").unwrap();
        assert_eq!("1@test", h.at());
    }

    #[test]
    fn unread_navigation_wraps() {
        let mut h = Harness::new(&[None, None, None, None]);
        {
            let m = &mut h.c.view_mut().unwrap().mx.mailbox;
            m.set_flag(0, Flag::Read, true).unwrap();
            m.set_flag(1, Flag::Old, true).unwrap();
            m.set_flag(3, Flag::Read, true).unwrap();
        }
        h.select(2);
        h.run(Op::NextUnread).unwrap();
        assert_eq!("1@test", h.at());
        h.run(Op::NextNew).unwrap();
        assert_eq!("2@test", h.at());
        assert_matches!(
            Err(Error::Precondition("No new messages")),
            h.run(Op::NextNew)
        );
        h.run(Op::PreviousUnread).unwrap();
        assert_eq!("1@test", h.at());
    }

    #[test]
    fn limits_and_searches() {
        let mut h = Harness::new(&[None, Some(0), None, Some(2)]);
        h.select(3);
        h.run(Op::LimitThread).unwrap();
        assert_eq!(vec![2, 3], h.view().mailbox().v2r);
        assert_eq!("3@test", h.at());

        h.run_with(Op::Limit, "all").unwrap();
        assert_eq!(4, h.view().mailbox().vcount());
        assert!(h.view().limit().is_none());

        h.run_with(Op::Limit, "~s 'message [02]'").unwrap();
        assert_eq!(vec![0, 2], h.view().mailbox().v2r);
        assert_matches!(Err(_), h.run_with(Op::Limit, "~s (unclosed"));
        assert_eq!(vec![0, 2], h.view().mailbox().v2r);
        h.run_with(Op::Limit, "").unwrap();

        h.select(0);
        assert_matches!(
            Err(Error::Precondition("No search pattern")),
            h.run(Op::SearchNext)
        );
        h.run_with(Op::Search, "~s 'message [13]'").unwrap();
        assert_eq!("1@test", h.at());
        h.run(Op::SearchNext).unwrap();
        assert_eq!("3@test", h.at());
        h.run(Op::SearchNext).unwrap();
        assert_eq!("1@test", h.at());
        h.run(Op::SearchOpposite).unwrap();
        assert_eq!("3@test", h.at());
        assert_matches!(
            Err(Error::Precondition("Not found")),
            h.run_with(Op::SearchReverse, "~s nothing-like-this")
        );
    }

    #[test]
    fn patterns_flag_what_is_in_view() {
        let mut h = Harness::new(&[None, None, None]);
        h.run_with(Op::Limit, "~s 'message [01]'").unwrap();
        h.run_with(Op::TagPattern, "~A").unwrap();
        let tagged: Vec<bool> =
            h.view().mailbox().emails.iter().map(|e| e.tagged).collect();
        assert_eq!(vec![true, true, false], tagged);

        h.run_with(Op::DeletePattern, "~s 'message 1'").unwrap();
        assert!(h.view().mailbox().emails[1].deleted);
        h.run_with(Op::UndeletePattern, "~D").unwrap();
        assert!(!h.view().mailbox().emails[1].deleted);
        h.run_with(Op::UntagPattern, "~T").unwrap();
        assert_eq!(0, h.view().mailbox().counts.tagged);
    }

    #[test]
    fn tag_prefix_applies_to_tagged() {
        let mut h = Harness::new(&[None, None, None]);
        assert_matches!(
            Err(Error::Precondition("No tagged messages")),
            h.run(Op::TagPrefix)
        );
        h.select(0);
        h.run(Op::Tag).unwrap();
        assert_eq!("1@test", h.at());
        h.run(Op::NextEntry).unwrap();
        h.run(Op::Tag).unwrap();

        h.run(Op::TagPrefix).unwrap();
        assert!(h.c.tag_prefix);
        h.run(Op::Flag).unwrap();
        assert!(!h.c.tag_prefix);
        let flagged: Vec<bool> =
            h.view().mailbox().emails.iter().map(|e| e.flagged).collect();
        assert_eq!(vec![true, false, true], flagged);

        // Without the prefix only the selection changes
        h.run(Op::ToggleNew).unwrap();
        assert!(h.view().mailbox().emails[2].read);
        assert!(!h.view().mailbox().emails[0].read);
    }

    #[test]
    fn link_and_break() {
        let mut h = Harness::new(&[None, None, None]);
        h.select(2);
        assert_matches!(Err(Error::Precondition(_)), h.run(Op::LinkThreads));
        h.select(1);
        h.run(Op::Tag).unwrap();
        h.select(2);
        h.run(Op::Tag).unwrap();
        h.select(0);
        h.run(Op::LinkThreads).unwrap();
        assert_eq!("0@test", h.at());
        let m = h.view().mailbox();
        assert_eq!(vec![0, 1, 1], vec![
            m.emails[0].depth,
            m.emails[1].depth,
            m.emails[2].depth
        ]);

        h.select(2);
        h.run(Op::BreakThread).unwrap();
        assert_eq!("2@test", h.at());
        assert_eq!(0, h.view().mailbox().emails[2].depth);
        assert!(h.view().mailbox().changed);
    }

    #[test]
    fn find_undeleted_can_uncollapse() {
        // A(0), B(1) { C(2) }
        let mut h = Harness::new(&[None, None, Some(1)]);
        h.select(1);
        h.run(Op::CollapseThread).unwrap();
        h.c.view_mut()
            .unwrap()
            .mx
            .mailbox
            .set_flag(1, Flag::Deleted, true)
            .unwrap();
        assert_eq!(vec![0, 1], h.view().mailbox().v2r);

        h.c.cursor = None;
        assert_eq!(None, h.c.find_next_undeleted(true));

        h.select(0);
        assert_eq!(None, h.c.find_next_undeleted(false));
        assert_eq!(vec![0, 1], h.view().mailbox().v2r);
        assert_eq!(Some(2), h.c.find_next_undeleted(true));
        assert_eq!(vec![0, 1, 2], h.view().mailbox().v2r);

        h.c.cursor = Some(2);
        assert_eq!(Some(0), h.c.find_previous_undeleted(false));
    }

    #[test]
    fn find_previous_undeleted_looks_inside_threads() {
        // A(0) { B(1) }, C(2)
        let mut h = Harness::new(&[None, Some(0), None]);
        h.select(0);
        h.run(Op::CollapseThread).unwrap();
        h.c.view_mut()
            .unwrap()
            .mx
            .mailbox
            .set_flag(0, Flag::Deleted, true)
            .unwrap();
        h.select(2);
        assert_eq!(Some(1), h.c.cursor());

        assert_eq!(None, h.c.find_previous_undeleted(false));
        assert_eq!(Some(1), h.c.cursor());
        assert_eq!(Some(1), h.c.find_previous_undeleted(true));
        assert_eq!(vec![0, 1, 2], h.view().mailbox().v2r);
        assert_eq!(Some(2), h.c.cursor());
    }

    #[test]
    fn unfocused_delete_resolves_into_collapsed_threads() {
        // A(0), B(1) { C(2) }
        let mut h = Harness::new(&[None, None, Some(1)]);
        h.select(1);
        h.run(Op::CollapseThread).unwrap();
        h.c.view_mut()
            .unwrap()
            .mx
            .mailbox
            .set_flag(1, Flag::Deleted, true)
            .unwrap();

        h.select(0);
        h.run(Op::Delete).unwrap();
        // Nothing undeleted is visible below
        assert_eq!("0@test", h.at());

        h.run(Op::Undelete).unwrap();
        h.c.focused = false;
        h.select(0);
        h.run(Op::Delete).unwrap();
        assert_eq!("2@test", h.at());
    }
}
