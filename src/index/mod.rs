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

//! The index: an open mailbox seen through a limit, a sort and threads, and
//! the controller that keeps that view in step with the store.
//!
//! `MailboxView` owns the mailbox and everything derived from it.
//! `state::Controller` adds the cursor and drives the check/update cycle,
//! and `dispatch` maps user operations onto both.

pub mod dispatch;
pub mod pattern;
pub mod state;
pub mod update;

use self::pattern::Pattern;
use crate::config::{ConfigDef, ConfigError, ConfigSet, Kind, ScopeId};
use crate::context::Context;
use crate::email::Email;
use crate::mailbox::account::Accounts;
use crate::mailbox::mx::Mx;
use crate::mailbox::Mailbox;
use crate::support::error::Error;
use crate::thread::ThreadsContext;

pub fn register(set: &mut ConfigSet) -> Result<(), ConfigError> {
    set.register_all(vec![
        ConfigDef::new("resolve", Kind::Bool, "yes"),
        ConfigDef::new("delete", Kind::Quad, "ask-yes"),
        ConfigDef::new("simple_search", Kind::String, "~f %s | ~s %s"),
    ])
}

/// A compiled limit together with the text it came from.
#[derive(Clone, Debug)]
pub struct Limit {
    pub text: String,
    pub pattern: Pattern,
}

/// The last search, kept for `search-next` and `search-opposite`.
#[derive(Clone, Debug, Default)]
pub struct Search {
    pub last: Option<Limit>,
    /// The last search ran towards the top.
    pub reverse: bool,
}

impl Search {
    pub fn flush(&mut self) {
        self.last = None;
    }
}

pub struct MailboxView {
    pub mx: Mx,
    pub threads: ThreadsContext,
    limit: Option<Limit>,
    /// `collapse-all` is in effect; threads arriving later start collapsed
    /// unless `uncollapse_new` says otherwise.
    pub collapsed: bool,
    pub search: Search,
}

impl MailboxView {
    /// Wrap a freshly opened mailbox, sorting and threading it.
    pub fn new(ctx: &Context, mx: Mx) -> Result<Self, Error> {
        let mut view = MailboxView {
            mx,
            threads: ThreadsContext::default(),
            limit: None,
            collapsed: false,
            search: Search::default(),
        };
        view.sort_headers(ctx, true)?;
        Ok(view)
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mx.mailbox
    }

    pub fn scope(&self) -> ScopeId {
        self.mx.scope()
    }

    pub fn limit(&self) -> Option<&Limit> {
        self.limit.as_ref()
    }

    /// The index of the message at view position `vnum`.
    pub fn index_at(&self, vnum: usize) -> Option<usize> {
        self.mx.mailbox.v2r.get(vnum).copied()
    }

    pub fn email_at(&self, vnum: usize) -> Option<&Email> {
        self.mx.mailbox.email_at(vnum)
    }

    /// Compile `text` the way limits and searches are compiled.
    pub fn compile(&self, ctx: &Context, text: &str) -> Result<Limit, Error> {
        let simple = ctx
            .config
            .get_str(self.scope(), "simple_search")?
            .unwrap_or_default();
        Ok(Limit {
            text: text.trim().to_owned(),
            pattern: Pattern::compile(text, &simple)?,
        })
    }

    /// Close the mailbox without writing anything back.
    pub fn close(
        self,
        ctx: &mut Context,
        accounts: &mut Accounts,
    ) -> Result<(), Error> {
        self.mx.close(ctx, accounts)
    }
}
