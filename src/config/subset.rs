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

//! Scoped, observable access to the config store.
//!
//! A scope is a named subset of the configuration: reading `sort` in scope
//! `work` reads `work:sort` if that has been set, and otherwise falls back to
//! the enclosing scope. Every successful change is announced on the scope's
//! notification node, which is a child of the enclosing scope's node, so an
//! observer on the root sees changes in every scope.

use log::debug;

use super::mbtable::MbTable;
use super::quad::Quad;
use super::regex::ConfigRegex;
use super::slist::Slist;
use super::sort::SortValue;
use super::{ConfigError, ConfigSet, CsrOutcome, CsrResult, InvalidKind, Value};
use crate::notify::{
    ConfigChange, Event, GlobalEvent, NotifyBus, NotifyId, Payload, Subject,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn subject(self) -> Subject {
        Subject(self.0 as u64)
    }
}

#[derive(Debug)]
struct Scope {
    /// Prefix applied to item names, e.g. `"work:"`. Empty for the root.
    prefix: String,
    parent: Option<ScopeId>,
    notify: NotifyId,
    live: bool,
}

#[derive(Debug)]
pub struct Config {
    set: ConfigSet,
    scopes: Vec<Scope>,
}

impl Config {
    pub fn new(set: ConfigSet, bus: &mut NotifyBus) -> Self {
        let notify = bus.node_new(None);
        Config {
            set,
            scopes: vec![Scope {
                prefix: String::new(),
                parent: None,
                notify,
                live: true,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn store(&self) -> &ConfigSet {
        &self.set
    }

    pub fn store_mut(&mut self) -> &mut ConfigSet {
        &mut self.set
    }

    /// Create a scope called `name` within `parent`.
    pub fn scope_new(
        &mut self,
        bus: &mut NotifyBus,
        parent: ScopeId,
        name: &str,
    ) -> ScopeId {
        let prefix = format!("{}{}:", self.scopes[parent.0].prefix, name);
        if let Some(ix) = self
            .scopes
            .iter()
            .position(|s| s.live && s.prefix == prefix)
        {
            return ScopeId(ix);
        }

        let notify = bus.node_new(Some(self.scopes[parent.0].notify));
        self.scopes.push(Scope {
            prefix,
            parent: Some(parent),
            notify,
            live: true,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Retire a scope, dropping its local values and its notify node.
    pub fn scope_free(&mut self, bus: &mut NotifyBus, scope: ScopeId) {
        if 0 == scope.0 || !self.scopes[scope.0].live {
            return;
        }

        let prefix = self.scopes[scope.0].prefix.clone();
        let doomed: Vec<String> = self
            .set
            .names()
            .into_iter()
            .filter(|n| n.starts_with(&prefix))
            .map(str::to_owned)
            .collect();
        for name in doomed {
            // Deleting a scoped item also deletes nested copies, so some
            // of these may already be gone.
            let _ = self.set.delete(&name);
        }

        self.scopes[scope.0].live = false;
        bus.node_free(self.scopes[scope.0].notify);
        debug!("Freed config scope {}", prefix);
    }

    pub fn notify_node(&self, scope: ScopeId) -> NotifyId {
        self.scopes[scope.0].notify
    }

    pub fn scope_name(&self, scope: ScopeId) -> &str {
        self.scopes[scope.0].prefix.trim_end_matches(':')
    }

    /// The name of the entry `name` resolves to in `scope`, without creating
    /// anything.
    fn effective_name(&self, scope: ScopeId, name: &str) -> String {
        let mut cur = Some(scope);
        while let Some(id) = cur {
            let s = &self.scopes[id.0];
            let full = format!("{}{}", s.prefix, name);
            if self.set.contains(&full) {
                return full;
            }
            cur = s.parent;
        }
        name.to_owned()
    }

    /// The name of `name` in `scope`, creating the inherited copy if needed.
    fn lookup(
        &mut self,
        scope: ScopeId,
        name: &str,
    ) -> Result<String, ConfigError> {
        let (prefix, parent) = {
            let s = &self.scopes[scope.0];
            (s.prefix.clone(), s.parent)
        };
        let parent = match parent {
            None => return Ok(name.to_owned()),
            Some(parent) => parent,
        };

        let full = format!("{}{}", prefix, name);
        if self.set.contains(&full) {
            return Ok(full);
        }

        let parent_name = self.lookup(parent, name)?;
        match self.set.inherit(&parent_name, &full) {
            Ok(()) => Ok(full),
            // Items that cannot be inherited are shared with the parent
            Err(ConfigError::Invalid {
                kind: InvalidKind::NotImplemented,
                ..
            }) => Ok(parent_name),
            Err(e) => Err(e),
        }
    }

    pub fn get_string(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
    ) -> Result<String, ConfigError> {
        let full = self.effective_name(scope, name);
        let result = self.set.get_string(&full);
        self.flush_warnings(bus, scope);
        result
    }

    pub fn dump_string(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
    ) -> Result<String, ConfigError> {
        let full = self.effective_name(scope, name);
        let result = self.set.dump_string(&full);
        self.flush_warnings(bus, scope);
        result
    }

    pub fn native_get(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
    ) -> Result<Value, ConfigError> {
        let full = self.effective_name(scope, name);
        let result = self.set.native_get(&full);
        self.flush_warnings(bus, scope);
        result
    }

    pub fn initial_get(
        &mut self,
        scope: ScopeId,
        name: &str,
    ) -> Result<String, ConfigError> {
        let full = self.effective_name(scope, name);
        self.set.initial_get(&full)
    }

    pub fn set_string(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        value: &str,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Set, |set, full| {
            set.set_string(full, value)
        })
    }

    pub fn plus_equals(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        value: &str,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Set, |set, full| {
            set.plus_equals(full, value)
        })
    }

    pub fn minus_equals(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        value: &str,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Set, |set, full| {
            set.minus_equals(full, value)
        })
    }

    pub fn toggle(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Set, |set, full| {
            set.toggle(full)
        })
    }

    pub fn native_set(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        value: Value,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Set, move |set, full| {
            set.native_set(full, value)
        })
    }

    pub fn reset(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
    ) -> CsrResult {
        self.change(bus, scope, name, ConfigChange::Reset, |set, full| {
            set.reset(full)
        })
    }

    /// Change the initial value of a root item. Scoped copies have no
    /// initial value of their own.
    pub fn initial_set(
        &mut self,
        bus: &mut NotifyBus,
        name: &str,
        value: &str,
    ) -> CsrResult {
        let root = self.root();
        self.change(bus, root, name, ConfigChange::InitialSet, |set, full| {
            set.initial_set(full, value)
        })
    }

    /// Delete a root item and all its scoped copies and synonyms, announcing
    /// each removed name.
    pub fn delete(
        &mut self,
        bus: &mut NotifyBus,
        name: &str,
    ) -> Result<Vec<String>, ConfigError> {
        let removed = self.set.delete(name)?;
        let node = self.scopes[0].notify;
        for n in &removed {
            bus.send(node, &Event::config(n, ConfigChange::Deleted));
        }
        Ok(removed)
    }

    /// Raise the start-up complete flag, announcing it the first time.
    pub fn startup_complete(&mut self, bus: &mut NotifyBus) -> bool {
        let first = self.set.set_startup_complete();
        if first {
            bus.send(
                self.scopes[0].notify,
                &Event::new(None, Payload::Global(GlobalEvent::StartupComplete)),
            );
        }
        first
    }

    fn change(
        &mut self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        change: ConfigChange,
        f: impl FnOnce(&mut ConfigSet, &str) -> CsrResult,
    ) -> CsrResult {
        let result = self
            .lookup(scope, name)
            .and_then(|full| f(&mut self.set, &full));
        self.flush_warnings(bus, scope);

        if let Ok(ref outcome) = result {
            if outcome.is_change() {
                self.announce(bus, scope, name, change);
            }
        }
        result
    }

    fn announce(
        &self,
        bus: &mut NotifyBus,
        scope: ScopeId,
        name: &str,
        change: ConfigChange,
    ) {
        let mut event = Event::config(name, change);
        event.subject = Some(scope.subject());
        bus.send(self.scopes[scope.0].notify, &event);
    }

    fn flush_warnings(&mut self, bus: &mut NotifyBus, scope: ScopeId) {
        for (name, message) in self.set.take_warnings() {
            self.announce(bus, scope, &name, ConfigChange::Warning(message));
        }
    }

    fn peek(&self, scope: ScopeId, name: &str) -> Result<&Value, ConfigError> {
        self.set.peek(&self.effective_name(scope, name))
    }

    pub fn get_bool(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<bool, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Bool(b) => Ok(b),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_number(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<i16, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Number(n) => Ok(n),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_long(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<i64, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Long(n) => Ok(n),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_quad(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<Quad, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Quad(q) => Ok(q),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_str(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<Option<String>, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Str(ref s) => Ok(s.clone()),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_enum(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<u32, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Enum(e) => Ok(e),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_sort(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<SortValue, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Sort(s) => Ok(s),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_slist(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<Slist, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Slist(ref l) => Ok(l.clone()),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_regex(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<Option<ConfigRegex>, ConfigError> {
        match *self.peek(scope, name)? {
            Value::Regex(ref r) => Ok(r.clone()),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }

    pub fn get_mbtable(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> Result<Option<MbTable>, ConfigError> {
        match *self.peek(scope, name)? {
            Value::MbTable(ref t) => Ok(t.clone()),
            _ => Err(ConfigError::wrong_type(name)),
        }
    }
}

/// Outcome of applying one startup setting, kept for reporting.
pub fn describe_outcome(name: &str, result: &CsrResult) -> String {
    match *result {
        Ok(CsrOutcome {
            warning: Some(ref w),
            ..
        }) => format!("{}: {}", name, w),
        Ok(_) => format!("{}: ok", name),
        Err(ref e) => format!("{}: {}", name, e),
    }
}
