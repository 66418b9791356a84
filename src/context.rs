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

//! The state shared by every part of the engine.

use crate::config::{Config, ConfigError, ConfigSet, ScopeId};
use crate::notify::{NotifyBus, Subject};

/// Subjects below this value identify config scopes.
const FIRST_OBJECT_SUBJECT: u64 = 1 << 32;

pub struct Context {
    pub config: Config,
    pub bus: NotifyBus,
    next_subject: u64,
}

impl Context {
    /// A context with every variable registered at its default.
    pub fn new() -> Result<Self, ConfigError> {
        let mut set = ConfigSet::new();
        register_all(&mut set)?;
        let mut bus = NotifyBus::new();
        let config = Config::new(set, &mut bus);
        Ok(Context {
            config,
            bus,
            next_subject: FIRST_OBJECT_SUBJECT,
        })
    }

    pub fn root(&self) -> ScopeId {
        self.config.root()
    }

    /// A fresh subject handle for a mailbox or account.
    pub fn next_subject(&mut self) -> Subject {
        let s = Subject(self.next_subject);
        self.next_subject += 1;
        s
    }

    /// Convenience for `config.set_string` on the root scope.
    pub fn set(
        &mut self,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let root = self.config.root();
        self.config
            .set_string(&mut self.bus, root, name, value)
            .map(|_| ())
    }
}

/// Register the variables of every component.
pub fn register_all(set: &mut ConfigSet) -> Result<(), ConfigError> {
    crate::email::register(set)?;
    crate::thread::register(set)?;
    crate::index::register(set)?;
    crate::maildir::register(set)?;
    crate::tagdb::register(set)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let mut ctx = Context::new().unwrap();
        let root = ctx.root();
        assert_eq!(
            "date",
            ctx.config.get_string(&mut ctx.bus, root, "sort").unwrap()
        );
        assert_eq!(
            Some("week".to_owned()),
            ctx.config
                .get_str(root, "nm_query_window_timebase")
                .unwrap()
        );
        assert!(ctx.config.get_bool(root, "uncollapse_new").unwrap());
        ctx.set("use_threads", "reverse").unwrap();
        assert!(ctx.set("use_threads", "sideways").is_err());
        assert_ne!(ctx.next_subject(), ctx.next_subject());
    }
}
