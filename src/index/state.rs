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

//! The controller: a cursor over a `MailboxView` and the cycle that keeps
//! the view in step with the store.
//!
//! The controller is always in one of the states of `State`. Between calls
//! it is `Idle`; `tick`, `sync` and `quit` walk it through the others with
//! `transition`, which is the only place the allowed moves are spelled out.

use log::{debug, info, warn};

use super::MailboxView;
use crate::context::Context;
use crate::mailbox::account::Accounts;
use crate::mailbox::backend::{MxStatus, OpenFlags};
use crate::mailbox::mx::Mx;
use crate::mailbox::{Counts, Mailbox};
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    /// Asking the backend for outside changes.
    Checking,
    /// Folding reported changes into the view.
    Updating,
    /// Writing changes back.
    Syncing,
    /// The view is being dropped.
    Closing,
}

/// What moves the controller from one state to the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// The UI is ready for the next round.
    Tick,
    /// The backend answered a check or sync.
    Status(MxStatus),
    Sync,
    Quit,
    /// The mailbox can no longer be used.
    Fatal,
    /// The view has absorbed the last status.
    Done,
}

pub fn transition(state: State, input: Input) -> State {
    match (state, input) {
        (State::Closing, _) => State::Closing,
        (_, Input::Fatal) => State::Closing,
        (State::Idle, Input::Tick) => State::Checking,
        (State::Idle, Input::Sync) => State::Syncing,
        (State::Idle, Input::Quit) => State::Closing,
        (State::Checking, Input::Status(MxStatus::Error)) => State::Closing,
        (State::Checking, Input::Status(status))
        | (State::Syncing, Input::Status(status)) => match status {
            MxStatus::NewMail
            | MxStatus::Reopened
            | MxStatus::FlagsChanged => State::Updating,
            _ => State::Idle,
        },
        (State::Updating, Input::Done) => State::Idle,
        (state, _) => state,
    }
}

/// What a tick found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tick {
    pub status: Option<MxStatus>,
    /// New mail arrived; signal the user.
    pub new_mail: bool,
    /// The mailbox had to be closed.
    pub closed: bool,
    /// Something to show the user.
    pub message: Option<String>,
}

/// A message, recognisable again after the mailbox is renumbered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    index: usize,
    id: String,
}

impl Identity {
    pub fn of(m: &Mailbox, index: usize) -> Option<Self> {
        m.emails.get(index).map(|e| Identity {
            index,
            id: e.id.clone(),
        })
    }

    /// The current index of the message.
    pub fn find(&self, m: &Mailbox) -> Option<usize> {
        match m.emails.get(self.index) {
            Some(e) if e.id == self.id => Some(self.index),
            _ if self.id.is_empty() => None,
            _ => m.by_id(&self.id),
        }
    }
}

pub struct Controller {
    pub(super) view: Option<MailboxView>,
    /// View position of the selected message.
    pub(super) cursor: Option<usize>,
    pub tag_prefix: bool,
    /// The sort variables changed; resort on the next tick.
    pub resort_pending: bool,
    /// Raised when new mail arrives, until taken by `take_new_mail`.
    pub(super) notify: bool,
    /// Whether the index is what the user is looking at. Moving past
    /// deleted messages expands collapsed threads when it is not.
    pub focused: bool,
    /// The index was entered to pick a message to attach.
    pub attach_mode: bool,
    /// The selection from before `collapse-all`, restored when expanding.
    pub(super) collapse_anchor: Option<Identity>,
    last_counts: Counts,
    state: State,
}

impl Default for Controller {
    fn default() -> Self {
        Controller::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Controller {
            view: None,
            cursor: None,
            tag_prefix: false,
            resort_pending: false,
            notify: false,
            focused: true,
            attach_mode: false,
            collapse_anchor: None,
            last_counts: Counts::default(),
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn view(&self) -> Option<&MailboxView> {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> Option<&mut MailboxView> {
        self.view.as_mut()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The counts as of the last tick.
    pub fn last_counts(&self) -> Counts {
        self.last_counts
    }

    /// The index of the selected message.
    pub fn current(&self) -> Option<usize> {
        let view = self.view.as_ref()?;
        view.index_at(self.cursor?)
    }

    pub(super) fn selected(&self) -> Option<Identity> {
        let view = self.view.as_ref()?;
        Identity::of(view.mailbox(), self.current()?)
    }

    pub fn take_new_mail(&mut self) -> bool {
        std::mem::replace(&mut self.notify, false)
    }

    fn enter(&mut self, input: Input) {
        let next = transition(self.state, input);
        if next != self.state {
            debug!("{:?} --{:?}--> {:?}", self.state, input, next);
        }
        self.state = next;
    }

    /// Open `path` and make it the current mailbox, closing any other
    /// first.
    pub fn open(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
        path: &str,
        flags: OpenFlags,
    ) -> Result<(), Error> {
        if self.view.is_some() {
            self.quit(ctx, accounts)?;
        }

        let mx = Mx::open(ctx, accounts, path, flags)?;
        let view = MailboxView::new(ctx, mx)?;
        self.cursor = view.first_interesting();
        self.last_counts = view.mailbox().counts;
        self.view = Some(view);
        self.collapse_anchor = None;
        self.tag_prefix = false;
        self.state = State::Idle;
        Ok(())
    }

    /// Put the cursor back on `identity` if it is still around, else on
    /// `old_vnum` if that is still in the view, else on the first
    /// interesting message.
    pub(super) fn restore_cursor(
        &mut self,
        identity: Option<&Identity>,
        old_vnum: Option<usize>,
    ) {
        let view = match self.view {
            Some(ref view) => view,
            None => {
                self.cursor = None;
                return;
            }
        };
        let m = view.mailbox();
        self.cursor = identity
            .and_then(|id| id.find(m))
            .and_then(|ix| position_of(view, ix))
            .or_else(|| old_vnum.filter(|&v| v < m.vcount()))
            .or_else(|| view.first_interesting());
    }

    /// One round of the main loop: resort if asked to, look for outside
    /// changes, fold them into the view and keep the cursor on the same
    /// message.
    pub fn tick(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
    ) -> Result<Tick, Error> {
        let mut report = Tick::default();
        if self.view.is_none() {
            return Ok(report);
        }

        if self.resort_pending {
            self.resort(ctx)?;
        }

        let identity = self.selected();
        let old_vnum = self.cursor;
        self.enter(Input::Tick);

        let (oldcount, result) = match self.view {
            Some(ref mut view) => {
                let oldcount = view.mailbox().len();
                (oldcount, view.mx.check(ctx))
            }
            None => return Ok(report),
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                let path_gone = self
                    .view
                    .as_ref()
                    .map_or(true, |v| v.mailbox().path.is_empty());
                if e.is_fatal() || path_gone {
                    return self.fatal(ctx, accounts, e, report);
                }

                warn!("Checking mailbox failed: {}", e);
                report.message = Some(e.to_string());
                // A failed check leaves the mailbox as it was
                self.state = State::Idle;
                self.restore_cursor(identity.as_ref(), old_vnum);
                return Ok(report);
            }
        };

        report.status = Some(status);
        self.enter(Input::Status(status));
        match status {
            MxStatus::Error => {
                let e = Error::BackendFatal("Mailbox check failed".to_owned());
                return self.fatal(ctx, accounts, e, report);
            }
            MxStatus::Locked => {
                report.message = Some(Error::Locked.to_string());
            }
            _ => (),
        }

        if State::Updating == self.state {
            if let Some(ref mut view) = self.view {
                if let Err(e) = view.update(ctx, oldcount, status) {
                    warn!("Updating the view failed: {}", e);
                    report.message = Some(e.to_string());
                }
            }
            self.enter(Input::Done);
        }

        if MxStatus::NewMail == status {
            self.notify = true;
            report.new_mail = true;
            if let Some(ref view) = self.view {
                info!(
                    "{} New mail: {} new messages",
                    view.mailbox().log_prefix,
                    view.mailbox().counts.new
                );
            }
        }

        self.restore_cursor(identity.as_ref(), old_vnum);
        if let Some(ref view) = self.view {
            self.last_counts = view.mailbox().counts;
        }
        Ok(report)
    }

    fn fatal(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
        error: Error,
        mut report: Tick,
    ) -> Result<Tick, Error> {
        self.enter(Input::Fatal);
        warn!("Closing mailbox: {}", error);
        if let Some(view) = self.view.take() {
            if let Err(e) = view.close(ctx, accounts) {
                warn!("Closing mailbox failed too: {}", e);
            }
        }
        self.cursor = None;
        self.collapse_anchor = None;
        self.state = State::Idle;
        report.closed = true;
        report.message = Some(error.to_string());
        Ok(report)
    }

    /// Resort the view, keeping the selection.
    pub fn resort(&mut self, ctx: &Context) -> Result<(), Error> {
        self.resort_pending = false;
        let identity = self.selected();
        if let Some(ref mut view) = self.view {
            view.sort_headers(ctx, false)?;
        }
        self.restore_cursor(identity.as_ref(), None);
        Ok(())
    }

    /// Write changes back; with `purge`, deleted messages go away.
    pub fn sync(&mut self, ctx: &mut Context, purge: bool) -> Result<(), Error> {
        let identity = self.selected();
        let old_vnum = self.cursor;
        self.enter(Input::Sync);

        let result = match self.view {
            Some(ref mut view) => {
                let oldcount = view.mailbox().len();
                view.mx.sync(ctx, purge).map(|status| (oldcount, status))
            }
            None => {
                self.state = State::Idle;
                return Ok(());
            }
        };
        let (oldcount, status) = match result {
            Ok(r) => r,
            Err(e) => {
                self.state = State::Idle;
                return Err(e);
            }
        };
        self.enter(Input::Status(status));
        let updating = State::Updating == self.state;

        if let Some(ref mut view) = self.view {
            let count = view.mailbox().len();
            // Purged messages take their thread nodes with them
            let result = if count != oldcount {
                view.sort_headers(ctx, false)
            } else {
                Ok(())
            };
            let result = result.and_then(|()| {
                if updating {
                    view.update(ctx, count, status)
                } else {
                    Ok(())
                }
            });
            if let Err(e) = result {
                self.state = State::Idle;
                self.restore_cursor(identity.as_ref(), old_vnum);
                return Err(e);
            }
        }
        self.state = State::Idle;
        self.restore_cursor(identity.as_ref(), old_vnum);
        Ok(())
    }

    /// Close the mailbox, first writing back changes and purging deleted
    /// messages if `delete` says so.
    pub fn quit(
        &mut self,
        ctx: &mut Context,
        accounts: &mut Accounts,
    ) -> Result<(), Error> {
        let pending = match self.view {
            Some(ref view) => {
                let m = view.mailbox();
                !m.readonly && (m.changed || m.counts.deleted > 0)
            }
            None => return Ok(()),
        };
        if pending {
            let scope = self.view.as_ref().map_or(ctx.root(), |v| v.scope());
            let purge = ctx.config.get_quad(scope, "delete")?.default_answer();
            self.sync(ctx, purge)?;
        }

        self.enter(Input::Quit);
        let result = match self.view.take() {
            Some(view) => view.close(ctx, accounts),
            None => Ok(()),
        };
        self.cursor = None;
        self.collapse_anchor = None;
        self.tag_prefix = false;
        self.state = State::Idle;
        result
    }
}

/// The view position showing `index`: its own, or that of the message
/// standing for its collapsed thread.
pub(super) fn position_of(view: &MailboxView, index: usize) -> Option<usize> {
    let m = view.mailbox();
    m.emails.get(index)?.vnum.or_else(|| {
        if view.threads.is_collapsed(m, index) {
            view.threads
                .thread_of(m, index)
                .into_iter()
                .find_map(|ix| m.emails[ix].vnum)
        } else {
            None
        }
    })
}
