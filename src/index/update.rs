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

//! Keeping the view in step with the mailbox.

use log::debug;

use super::{Limit, MailboxView};
use crate::context::Context;
use crate::email::sort::SORT_THREADS;
use crate::mailbox::backend::MxStatus;
use crate::support::error::Error;
use crate::support::interrupt;
use crate::thread::{ThreadSettings, ThreadStyle};

impl MailboxView {
    /// Re-read the sorting and threading variables and rebuild the view
    /// from them. With `full_init`, collapse state is discarded too.
    pub fn sort_headers(
        &mut self,
        ctx: &Context,
        full_init: bool,
    ) -> Result<(), Error> {
        let settings = ThreadSettings::from_config(&ctx.config, self.scope())?;
        self.threads.set_settings(settings);
        self.apply_limit()?;
        self.threads.rebuild(&mut self.mx.mailbox, full_init)
    }

    /// Evaluate the limit on each message not yet checked against it.
    /// Returns how many were evaluated.
    fn apply_limit(&mut self) -> Result<usize, Error> {
        let m = &mut self.mx.mailbox;
        let mut evaluated = 0;
        for ix in 0..m.len() {
            if m.emails[ix].limit_visited {
                continue;
            }
            interrupt::check()?;

            let hit = match self.limit {
                None => true,
                Some(ref limit) => limit.pattern.matches(m, &m.emails[ix]),
            };
            let e = &mut m.emails[ix];
            e.limited = hit;
            e.limit_visited = true;
            evaluated += 1;
        }
        Ok(evaluated)
    }

    fn forget_limit_results(&mut self) {
        for e in &mut self.mx.mailbox.emails {
            e.limit_visited = false;
        }
    }

    /// Replace the limit. Nothing changes if `limit` fails to apply.
    pub fn set_limit(&mut self, limit: Option<Limit>) -> Result<(), Error> {
        let previous = std::mem::replace(&mut self.limit, limit);
        self.forget_limit_results();
        if let Err(e) = self.apply_limit() {
            self.limit = previous;
            self.forget_limit_results();
            self.apply_limit()?;
            return Err(e);
        }

        self.threads.set_vnum(&mut self.mx.mailbox);
        debug!(
            "{} Limit {:?}: {} of {} messages",
            self.mx.mailbox.log_prefix,
            self.limit.as_ref().map(|l| l.text.as_str()),
            self.mx.mailbox.vcount(),
            self.mx.mailbox.len()
        );
        Ok(())
    }

    /// Bring the view up to date after a check or sync reported `status`.
    /// `oldcount` is the number of messages before it.
    pub fn update(
        &mut self,
        ctx: &Context,
        oldcount: usize,
        status: MxStatus,
    ) -> Result<(), Error> {
        let reopened = match status {
            MxStatus::Reopened => true,
            MxStatus::NewMail | MxStatus::FlagsChanged => false,
            _ => return Ok(()),
        };

        if reopened {
            // Indices are no longer comparable with what came before
            self.search.flush();
            self.forget_limit_results();
        }
        let oldcount = if reopened {
            self.mx.mailbox.len()
        } else {
            oldcount.min(self.mx.mailbox.len())
        };

        let scope = self.scope();
        self.threads
            .set_settings(ThreadSettings::from_config(&ctx.config, scope)?);
        self.apply_limit()?;
        let m = &mut self.mx.mailbox;
        self.threads.rebuild(m, reopened)?;
        if !self.threads.is_threaded() {
            return Ok(());
        }

        let uncollapse_new = ctx.config.get_bool(scope, "uncollapse_new")?;
        if reopened {
            if uncollapse_new {
                self.collapsed = false;
            } else if self.collapsed {
                self.threads.collapse_all(m, true);
            }
            return Ok(());
        }

        for ix in oldcount..m.len() {
            if !m.emails[ix].limited {
                continue;
            }
            let collapsed = self.threads.is_collapsed(m, ix);
            if uncollapse_new && collapsed {
                // Even if the rest of the thread is outside the limit
                self.threads.uncollapse_thread(m, ix);
            } else if !uncollapse_new
                && self.collapsed
                && !collapsed
                && self.threads.can_collapse(m, ix)
            {
                self.threads.collapse_thread(m, ix);
            }
        }
        Ok(())
    }

    /// The view position the cursor goes to when there is nothing better:
    /// the first new message, else the first unread one, else the newest
    /// end of the view.
    pub fn first_interesting(&self) -> Option<usize> {
        let m = &self.mx.mailbox;
        if m.v2r.is_empty() {
            return None;
        }

        let first = |pred: &dyn Fn(usize) -> bool| {
            m.v2r.iter().position(|&ix| pred(ix))
        };
        if let Some(vnum) = first(&|ix| m.emails[ix].is_new()) {
            return Some(vnum);
        }
        if let Some(vnum) = first(&|ix| !m.emails[ix].read) {
            return Some(vnum);
        }

        let settings = self.threads.settings();
        let sort_reversed = if SORT_THREADS == settings.sort.method {
            settings.sort_aux.reverse
        } else {
            settings.sort.reverse
        };
        let reversed =
            sort_reversed != (ThreadStyle::Reverse == settings.style);
        if reversed {
            Some(0)
        } else {
            Some(m.v2r.len() - 1)
        }
    }
}
