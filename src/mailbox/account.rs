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

//! Groups of mailboxes sharing backend state.

use std::any::Any;
use std::rc::Rc;

use log::info;

use super::backend::MxOps;
use super::MailboxType;
use crate::notify::{AccountEvent, Event, NotifyBus, NotifyId, Payload, Subject};
use crate::support::error::Error;

pub struct Account {
    pub name: String,
    pub kind: MailboxType,
    pub notify: NotifyId,
    /// Paths of the mailboxes opened through this account.
    pub mailboxes: Vec<String>,
    /// Backend-specific shared state, such as a database handle.
    adata: Option<Rc<dyn Any>>,
}

impl Account {
    pub fn adata<T: Any>(&self) -> Option<Rc<T>> {
        self.adata.clone().and_then(|a| a.downcast::<T>().ok())
    }

    pub fn set_adata<T: Any>(&mut self, data: Rc<T>) {
        self.adata = Some(data);
    }
}

/// Every account known to the process.
pub struct Accounts {
    list: Vec<Account>,
    parent: NotifyId,
}

impl Accounts {
    /// `parent` is the notify node accounts hang off, normally the global
    /// config scope's.
    pub fn new(parent: NotifyId) -> Self {
        Accounts {
            list: Vec::new(),
            parent,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn get(&self, ix: usize) -> &Account {
        &self.list[ix]
    }

    /// Find the account that owns `path`, or create one, and attach `ops`
    /// to it. Returns the account's position.
    pub fn attach(
        &mut self,
        bus: &mut NotifyBus,
        ops: &mut dyn MxOps,
        path: &str,
    ) -> Result<usize, Error> {
        let kind = ops.kind();
        let existing = self
            .list
            .iter()
            .position(|a| a.kind == kind && ops.ac_owns_path(a, path));

        let ix = match existing {
            Some(ix) => ix,
            None => {
                let notify = bus.node_new(Some(self.parent));
                self.list.push(Account {
                    name: format!("{}:{}", kind, path),
                    kind,
                    notify,
                    mailboxes: Vec::new(),
                    adata: None,
                });
                let ix = self.list.len() - 1;
                info!("Created account {}", self.list[ix].name);
                bus.send(
                    notify,
                    &Event::new(
                        Some(Subject(ix as u64)),
                        Payload::Account(AccountEvent::Add),
                    ),
                );
                ix
            }
        };

        let account = &mut self.list[ix];
        ops.ac_add(account, path)?;
        if !account.mailboxes.iter().any(|p| p == path) {
            account.mailboxes.push(path.to_owned());
        }
        Ok(ix)
    }

    /// Forget `path`; an account left with no mailboxes is removed.
    pub fn detach(&mut self, bus: &mut NotifyBus, path: &str) {
        for a in &mut self.list {
            a.mailboxes.retain(|p| p != path);
        }

        let mut ix = 0;
        while ix < self.list.len() {
            if self.list[ix].mailboxes.is_empty() {
                let a = self.list.remove(ix);
                bus.send(
                    a.notify,
                    &Event::new(
                        Some(Subject(ix as u64)),
                        Payload::Account(AccountEvent::Delete),
                    ),
                );
                bus.node_free(a.notify);
                info!("Removed account {}", a.name);
            } else {
                ix += 1;
            }
        }
    }
}
