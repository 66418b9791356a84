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

//! The typed configuration store.
//!
//! `ConfigSet` is the pure store: it knows the items, their types and values,
//! and implements every operation on them, but never notifies anyone. The
//! scoped, observable front-end on top of it lives in `subset`.

pub mod address;
pub mod mbtable;
pub mod quad;
pub mod regex;
pub mod slist;
pub mod sort;
pub mod subset;
mod types;

use std::collections::{HashMap, HashSet};
use std::fmt;

use bitflags::bitflags;
use log::warn;
use thiserror::Error;

use self::address::AddressList;
use self::mbtable::MbTable;
use self::quad::Quad;
use self::regex::ConfigRegex;
use self::slist::Slist;
use self::sort::SortValue;
use self::types::{type_of, ConfigType};

pub use self::subset::{Config, ScopeId};

bitflags! {
    /// Per-item behaviour flags.
    pub struct ItemFlags: u32 {
        /// String-like values may not be empty.
        const NOT_EMPTY = 1 << 0;
        /// Numbers may not be negative.
        const NOT_NEGATIVE = 1 << 1;
        /// The value is masked when dumped.
        const SENSITIVE = 1 << 2;
        /// The value names an external command.
        const COMMAND = 1 << 3;
        /// The item may only be changed before start-up completes.
        const ON_STARTUP = 1 << 4;
        const SORT_REVERSE = 1 << 5;
        const SORT_LAST = 1 << 6;
        /// Compile without capture groups.
        const REGEX_NOSUB = 1 << 7;
        /// Accept a leading `!` negating the match.
        const REGEX_ALLOW_NOT = 1 << 8;
        /// Never fold case, even for all-lower-case patterns.
        const REGEX_MATCH_CASE = 1 << 9;
        /// List separator is a comma (default is a space).
        const SLIST_SEP_COMMA = 1 << 10;
        /// List separator is a colon (default is a space).
        const SLIST_SEP_COLON = 1 << 11;
        const SLIST_ALLOW_EMPTY = 1 << 12;
        const SLIST_ALLOW_DUPES = 1 << 13;
        const SLIST_CASE_SENSITIVE = 1 << 14;
    }
}

bitflags! {
    /// The flag half of the integer result code of a successful operation.
    pub struct CsrFlags: i32 {
        const INHERITED = 1 << 4;
        const EMPTY = 1 << 5;
        const WARNING = 1 << 6;
        const NO_CHANGE = 1 << 7;
    }
}

pub const CSR_SUCCESS: i32 = 0;
pub const CSR_ERR_CODE: i32 = 1;
pub const CSR_ERR_UNKNOWN: i32 = 2;
pub const CSR_ERR_INVALID: i32 = 3;
pub const CSR_INV_TYPE: i32 = 1 << 4;
pub const CSR_INV_VALIDATOR: i32 = 1 << 5;
pub const CSR_INV_NOT_IMPL: i32 = 1 << 6;
pub const CSR_RESULT_MASK: i32 = 0x0f;

/// The successful result of a config operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsrOutcome {
    pub flags: CsrFlags,
    /// Set when a validator accepted the value with a message.
    pub warning: Option<String>,
}

impl CsrOutcome {
    fn changed() -> Self {
        CsrOutcome::default()
    }

    fn no_change() -> Self {
        CsrOutcome {
            flags: CsrFlags::NO_CHANGE,
            warning: None,
        }
    }

    pub fn is_change(&self) -> bool {
        !self.flags.contains(CsrFlags::NO_CHANGE)
    }

    pub fn code(&self) -> i32 {
        CSR_SUCCESS | self.flags.bits()
    }
}

impl Default for CsrFlags {
    fn default() -> Self {
        CsrFlags::empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidKind {
    Value,
    Type,
    Validator,
    NotImplemented,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown option {0}")]
    Unknown(String),
    #[error("{message}")]
    Invalid {
        name: String,
        kind: InvalidKind,
        message: String,
    },
    #[error("{0}")]
    Code(String),
}

impl ConfigError {
    pub fn invalid(name: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.to_owned(),
            kind: InvalidKind::Value,
            message: message.into(),
        }
    }

    pub fn rejected(name: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.to_owned(),
            kind: InvalidKind::Validator,
            message: message.into(),
        }
    }

    pub fn wrong_type(name: &str) -> Self {
        ConfigError::Invalid {
            name: name.to_owned(),
            kind: InvalidKind::Type,
            message: format!("Wrong type of value for option {}", name),
        }
    }

    pub fn not_implemented(name: &str, op: &str) -> Self {
        ConfigError::Invalid {
            name: name.to_owned(),
            kind: InvalidKind::NotImplemented,
            message: format!("Option {} does not support {}", name, op),
        }
    }

    /// The integer result code of this failure.
    pub fn code(&self) -> i32 {
        match *self {
            ConfigError::Unknown(..) => CSR_ERR_UNKNOWN,
            ConfigError::Code(..) => CSR_ERR_CODE,
            ConfigError::Invalid { kind, .. } => {
                CSR_ERR_INVALID
                    | match kind {
                        InvalidKind::Value => 0,
                        InvalidKind::Type => CSR_INV_TYPE,
                        InvalidKind::Validator => CSR_INV_VALIDATOR,
                        InvalidKind::NotImplemented => CSR_INV_NOT_IMPL,
                    }
            }
        }
    }
}

pub type CsrResult = Result<CsrOutcome, ConfigError>;

/// The type tag of a registered name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Number,
    Long,
    Quad,
    String,
    Path,
    MyVar,
    Regex,
    Enum,
    Sort,
    MbTable,
    Slist,
    Address,
    Synonym,
    Deprecated,
}

/// An item's type, with any type-specific data.
#[derive(Clone, Debug)]
pub enum Kind {
    Bool,
    Number,
    Long,
    Quad,
    String,
    Path,
    MyVar,
    Regex,
    Enum(&'static [(&'static str, u32)]),
    Sort(&'static [(&'static str, u16)]),
    MbTable,
    Slist,
    Address,
    Deprecated,
}

impl Kind {
    pub fn tag(&self) -> TypeTag {
        match *self {
            Kind::Bool => TypeTag::Bool,
            Kind::Number => TypeTag::Number,
            Kind::Long => TypeTag::Long,
            Kind::Quad => TypeTag::Quad,
            Kind::String => TypeTag::String,
            Kind::Path => TypeTag::Path,
            Kind::MyVar => TypeTag::MyVar,
            Kind::Regex => TypeTag::Regex,
            Kind::Enum(..) => TypeTag::Enum,
            Kind::Sort(..) => TypeTag::Sort,
            Kind::MbTable => TypeTag::MbTable,
            Kind::Slist => TypeTag::Slist,
            Kind::Address => TypeTag::Address,
            Kind::Deprecated => TypeTag::Deprecated,
        }
    }
}

/// A config value in its native form.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Number(i16),
    Long(i64),
    Quad(Quad),
    /// Strings, paths, user variables and deprecated items.
    Str(Option<String>),
    Regex(Option<ConfigRegex>),
    Enum(u32),
    Sort(SortValue),
    MbTable(Option<MbTable>),
    Slist(Slist),
    Address(Option<AddressList>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (&Value::Bool(a), &Value::Bool(b)) => a == b,
            (&Value::Number(a), &Value::Number(b)) => a == b,
            (&Value::Long(a), &Value::Long(b)) => a == b,
            (&Value::Quad(a), &Value::Quad(b)) => a == b,
            (&Value::Str(ref a), &Value::Str(ref b)) => a == b,
            (&Value::Regex(ref a), &Value::Regex(ref b)) => a == b,
            (&Value::Enum(a), &Value::Enum(b)) => a == b,
            (&Value::Sort(a), &Value::Sort(b)) => a == b,
            (&Value::MbTable(ref a), &Value::MbTable(ref b)) => a == b,
            (&Value::Slist(ref a), &Value::Slist(ref b)) => a.equal(b),
            (&Value::Address(ref a), &Value::Address(ref b)) => a == b,
            _ => false,
        }
    }
}

/// The result of a validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Accept,
    /// Accept, but tell the user something.
    Warn(String),
    Reject(String),
}

pub type Validator = fn(&ConfigDef, &Value) -> Validation;

/// The definition of a config item.
#[derive(Clone, Debug)]
pub struct ConfigDef {
    pub name: String,
    pub kind: Kind,
    pub flags: ItemFlags,
    /// The initial value, in string form.
    pub initial: String,
    pub validator: Option<Validator>,
}

impl ConfigDef {
    pub fn new(name: &str, kind: Kind, initial: &str) -> Self {
        ConfigDef {
            name: name.to_owned(),
            kind,
            flags: ItemFlags::empty(),
            initial: initial.to_owned(),
            validator: None,
        }
    }

    pub fn flags(mut self, flags: ItemFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

struct Item {
    def: ConfigDef,
    initial: Value,
    value: Value,
}

enum Entry {
    Item(Item),
    Synonym { target: String },
    /// A scoped child of another item; `None` means "use the parent's".
    Inherited { parent: String, local: Option<Value> },
}

/// Longest synonym chain followed before giving up.
const MAX_SYNONYM_DEPTH: usize = 8;

#[derive(Default)]
pub struct ConfigSet {
    entries: HashMap<String, Entry>,
    startup_complete: bool,
    warned: HashSet<String>,
    pending_warnings: Vec<(String, String)>,
}

impl fmt::Debug for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConfigSet")
            .field("items", &self.entries.len())
            .field("startup_complete", &self.startup_complete)
            .finish()
    }
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new item. Fails if the name is taken or the initial value
    /// does not parse.
    pub fn register(&mut self, def: ConfigDef) -> Result<(), ConfigError> {
        if self.entries.contains_key(&def.name) {
            return Err(ConfigError::Code(format!(
                "Option {} is already registered",
                def.name
            )));
        }

        let initial = type_of(&def.kind).parse(&def, &def.initial)?;
        self.entries.insert(
            def.name.clone(),
            Entry::Item(Item {
                value: initial.clone(),
                initial,
                def,
            }),
        );
        Ok(())
    }

    pub fn register_all(
        &mut self,
        defs: impl IntoIterator<Item = ConfigDef>,
    ) -> Result<(), ConfigError> {
        for def in defs {
            self.register(def)?;
        }
        Ok(())
    }

    /// Register `name` as an alternative name for `target`.
    pub fn register_synonym(
        &mut self,
        name: &str,
        target: &str,
    ) -> Result<(), ConfigError> {
        if self.entries.contains_key(name) {
            return Err(ConfigError::Code(format!(
                "Option {} is already registered",
                name
            )));
        }
        if !self.entries.contains_key(target) {
            return Err(ConfigError::Unknown(target.to_owned()));
        }

        self.entries.insert(
            name.to_owned(),
            Entry::Synonym {
                target: target.to_owned(),
            },
        );
        Ok(())
    }

    /// Create `child` as an inherited copy of `parent`.
    pub fn inherit(
        &mut self,
        parent: &str,
        child: &str,
    ) -> Result<(), ConfigError> {
        let parent = self.resolve(parent)?;
        if self.entries.contains_key(child) {
            return Ok(());
        }

        if TypeTag::MyVar == self.def(&parent)?.kind.tag() {
            return Err(ConfigError::not_implemented(&parent, "inheritance"));
        }

        self.entries.insert(
            child.to_owned(),
            Entry::Inherited {
                parent,
                local: None,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn type_tag(&self, name: &str) -> Result<TypeTag, ConfigError> {
        match self.entries.get(name) {
            None => Err(ConfigError::Unknown(name.to_owned())),
            Some(&Entry::Synonym { .. }) => Ok(TypeTag::Synonym),
            Some(_) => {
                let resolved = self.resolve_quiet(name)?;
                Ok(self.def(&resolved)?.kind.tag())
            }
        }
    }

    /// Names of all registered entries, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_startup_complete(&self) -> bool {
        self.startup_complete
    }

    /// Raise the start-up complete flag. Returns false if it had already been
    /// raised.
    pub fn set_startup_complete(&mut self) -> bool {
        !std::mem::replace(&mut self.startup_complete, true)
    }

    /// Deprecation and rename warnings produced since the last call, as
    /// `(name, message)` pairs.
    pub fn take_warnings(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.pending_warnings)
    }

    pub fn get_string(&mut self, name: &str) -> Result<String, ConfigError> {
        let name = self.resolve(name)?;
        let (def, value) = self.effective(&name)?;
        Ok(type_of(&def.kind).render(def, value))
    }

    /// Like `get_string`, but masks sensitive values.
    pub fn dump_string(&mut self, name: &str) -> Result<String, ConfigError> {
        let resolved = self.resolve(name)?;
        if self.def(&resolved)?.flags.contains(ItemFlags::SENSITIVE) {
            Ok("***".to_owned())
        } else {
            self.get_string(&resolved)
        }
    }

    pub fn set_string(&mut self, name: &str, value: &str) -> CsrResult {
        self.mutate(name, |ty, def, _| ty.parse(def, value))
    }

    pub fn plus_equals(&mut self, name: &str, value: &str) -> CsrResult {
        self.mutate(name, |ty, def, cur| ty.plus_equals(def, cur, value))
    }

    pub fn minus_equals(&mut self, name: &str, value: &str) -> CsrResult {
        self.mutate(name, |ty, def, cur| ty.minus_equals(def, cur, value))
    }

    pub fn toggle(&mut self, name: &str) -> CsrResult {
        self.mutate(name, |ty, def, cur| ty.toggle(def, cur))
    }

    pub fn native_get(&mut self, name: &str) -> Result<Value, ConfigError> {
        let name = self.resolve(name)?;
        self.effective(&name).map(|(_, v)| v.clone())
    }

    /// Read a value without triggering rename or deprecation warnings.
    pub fn peek(&self, name: &str) -> Result<&Value, ConfigError> {
        let name = self.resolve_quiet(name)?;
        self.effective(&name).map(|(_, v)| v)
    }

    pub fn native_set(&mut self, name: &str, value: Value) -> CsrResult {
        self.mutate(name, move |ty, def, _| {
            ty.check_native(def, &value)?;
            Ok(value)
        })
    }

    pub fn initial_get(&mut self, name: &str) -> Result<String, ConfigError> {
        let name = self.resolve(name)?;
        let (def, _) = self.effective(&name)?;
        Ok(def.initial.clone())
    }

    pub fn initial_set(&mut self, name: &str, value: &str) -> CsrResult {
        let name = self.resolve(name)?;
        let item = match self.entries.get_mut(&name) {
            Some(Entry::Item(item)) => item,
            Some(_) => {
                return Err(ConfigError::not_implemented(
                    &name,
                    "changing the initial value of a scoped copy",
                ))
            }
            None => return Err(ConfigError::Unknown(name)),
        };

        let ty = type_of(&item.def.kind);
        let parsed = ty.parse(&item.def, value)?;
        if parsed == item.initial {
            return Ok(CsrOutcome::no_change());
        }

        item.initial = parsed;
        item.def.initial = value.to_owned();
        Ok(CsrOutcome::changed())
    }

    pub fn reset(&mut self, name: &str) -> CsrResult {
        let name = self.resolve(name)?;
        self.check_startup_lock(&name)?;

        match self.entries.get_mut(&name) {
            Some(Entry::Inherited { local, .. }) => {
                if local.take().is_some() {
                    Ok(CsrOutcome::changed())
                } else {
                    Ok(CsrOutcome::no_change())
                }
            }
            Some(Entry::Item(item)) => {
                if item.value == item.initial {
                    return Ok(CsrOutcome::no_change());
                }

                let mut outcome = CsrOutcome::changed();
                validate(&item.def, &item.initial, &mut outcome)?;
                item.value = item.initial.clone();
                Ok(outcome)
            }
            Some(Entry::Synonym { .. }) | None => {
                Err(ConfigError::Unknown(name))
            }
        }
    }

    /// Remove an item, along with every scoped copy of it and every synonym
    /// pointing at it. Returns the names removed.
    pub fn delete(&mut self, name: &str) -> Result<Vec<String>, ConfigError> {
        let name = self.resolve_quiet(name)?;
        let mut removed = Vec::new();
        let mut doomed = vec![name];
        while let Some(name) = doomed.pop() {
            if self.entries.remove(&name).is_none() {
                continue;
            }

            for (other, entry) in &self.entries {
                match *entry {
                    Entry::Inherited { ref parent, .. }
                    | Entry::Synonym { target: ref parent }
                        if *parent == name =>
                    {
                        doomed.push(other.clone());
                    }
                    _ => (),
                }
            }
            removed.push(name);
        }
        Ok(removed)
    }

    /// The definition governing `name`, following inheritance.
    pub fn def(&self, name: &str) -> Result<&ConfigDef, ConfigError> {
        self.effective(name).map(|(def, _)| def)
    }

    /// Whether `name` is a scoped copy currently holding its own value.
    pub fn has_local_value(&self, name: &str) -> bool {
        matches!(
            self.entries.get(name),
            Some(Entry::Inherited { local: Some(_), .. })
        )
    }

    fn effective(
        &self,
        name: &str,
    ) -> Result<(&ConfigDef, &Value), ConfigError> {
        let mut cur = name;
        let mut local_value = None;
        for _ in 0..MAX_SYNONYM_DEPTH * 4 {
            match self.entries.get(cur) {
                Some(Entry::Item(item)) => {
                    return Ok((&item.def, local_value.unwrap_or(&item.value)))
                }
                Some(Entry::Inherited { parent, local }) => {
                    if local_value.is_none() {
                        local_value = local.as_ref();
                    }
                    cur = parent.as_str();
                }
                Some(Entry::Synonym { target }) => cur = target.as_str(),
                None => break,
            }
        }

        Err(ConfigError::Unknown(name.to_owned()))
    }

    fn resolve_quiet(&self, name: &str) -> Result<String, ConfigError> {
        let mut cur = name;
        for _ in 0..MAX_SYNONYM_DEPTH {
            match self.entries.get(cur) {
                None => return Err(ConfigError::Unknown(name.to_owned())),
                Some(Entry::Synonym { target }) => cur = target.as_str(),
                Some(_) => return Ok(cur.to_owned()),
            }
        }

        Err(ConfigError::Code(format!(
            "Synonym loop while resolving {}",
            name
        )))
    }

    /// Follow synonyms to a concrete entry, queueing at most one rename or
    /// deprecation warning per access.
    fn resolve(&mut self, name: &str) -> Result<String, ConfigError> {
        let resolved = self.resolve_quiet(name)?;
        if resolved != name {
            if self.warned.insert(name.to_owned()) {
                // The rename warning stands in for any deprecation warning
                // of the target.
                self.warned.insert(resolved.clone());
                self.queue_warning(
                    name,
                    format!(
                        "Config item '{}' has been renamed to '{}'",
                        name, resolved
                    ),
                );
            }
        } else if TypeTag::Deprecated == self.def(&resolved)?.kind.tag()
            && self.warned.insert(resolved.clone())
        {
            self.queue_warning(
                &resolved,
                format!("Option {} is deprecated", resolved),
            );
        }

        Ok(resolved)
    }

    fn queue_warning(&mut self, name: &str, message: String) {
        warn!("{}", message);
        self.pending_warnings.push((name.to_owned(), message));
    }

    fn check_startup_lock(&self, name: &str) -> Result<(), ConfigError> {
        if self.startup_complete
            && self.def(name)?.flags.contains(ItemFlags::ON_STARTUP)
        {
            Err(ConfigError::rejected(
                name,
                format!("Option {} may only be set at startup", name),
            ))
        } else {
            Ok(())
        }
    }

    /// The common path of every value-changing operation: resolve, refuse
    /// locked items, compute the new value, skip no-ops, validate, store.
    fn mutate(
        &mut self,
        name: &str,
        f: impl FnOnce(
            &dyn ConfigType,
            &ConfigDef,
            &Value,
        ) -> Result<Value, ConfigError>,
    ) -> CsrResult {
        let name = self.resolve(name)?;
        self.check_startup_lock(&name)?;

        let (new_value, mut outcome) = {
            let (def, current) = self.effective(&name)?;
            let ty = type_of(&def.kind);
            let new_value = f(ty, def, current)?;
            if new_value == *current {
                return Ok(CsrOutcome::no_change());
            }

            let mut outcome = CsrOutcome::changed();
            validate(def, &new_value, &mut outcome)?;
            if ty.is_empty(&new_value) {
                outcome.flags |= CsrFlags::EMPTY;
            }
            (new_value, outcome)
        };

        match self.entries.get_mut(&name) {
            Some(Entry::Item(item)) => item.value = new_value,
            Some(Entry::Inherited { local, .. }) => {
                *local = Some(new_value);
                outcome.flags |= CsrFlags::INHERITED;
            }
            _ => return Err(ConfigError::Unknown(name)),
        }

        Ok(outcome)
    }
}

fn validate(
    def: &ConfigDef,
    value: &Value,
    outcome: &mut CsrOutcome,
) -> Result<(), ConfigError> {
    match def.validator.map(|v| v(def, value)) {
        None | Some(Validation::Accept) => Ok(()),
        Some(Validation::Warn(message)) => {
            outcome.flags |= CsrFlags::WARNING;
            outcome.warning = Some(message);
            Ok(())
        }
        Some(Validation::Reject(message)) => {
            Err(ConfigError::rejected(&def.name, message))
        }
    }
}
