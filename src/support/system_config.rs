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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::error::Error;
use crate::config::{Config, CsrResult, ScopeId};
use crate::notify::NotifyBus;

/// The start-up configuration for Mailview.
///
/// This is stored in a file named `mailview.toml` in the configuration
/// directory. Every entry names a registered variable; the values are
/// applied in file order before start-up is declared complete, so items
/// locked at start-up can only be set here.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct StartupConfig {
    /// Values for the global scope.
    #[serde(default)]
    pub set: BTreeMap<String, ConfigScalar>,

    /// Per-scope overrides, e.g. `[scope.work]`. Variables not named here
    /// keep following the global value.
    #[serde(default)]
    pub scope: BTreeMap<String, BTreeMap<String, ConfigScalar>>,
}

/// A value as written in TOML.
///
/// Lists are applied as a reset followed by one `+=` per element, which
/// lets list items use whatever separator the variable declares.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigScalar {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl StartupConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Ok(toml::from_slice(&data)?)
    }

    /// Apply every setting, then raise the start-up complete flag.
    ///
    /// Settings that fail are reported and skipped; the return value lists
    /// the failures as human-readable lines.
    pub fn apply(&self, config: &mut Config, bus: &mut NotifyBus) -> Vec<String> {
        let mut failures = Vec::new();
        let root = config.root();
        apply_table(config, bus, root, &self.set, &mut failures);

        for (name, table) in &self.scope {
            let scope = config.scope_new(bus, root, name);
            apply_table(config, bus, scope, table, &mut failures);
        }

        config.startup_complete(bus);
        info!(
            "Applied start-up configuration ({} failures)",
            failures.len()
        );
        failures
    }
}

fn apply_table(
    config: &mut Config,
    bus: &mut NotifyBus,
    scope: ScopeId,
    table: &BTreeMap<String, ConfigScalar>,
    failures: &mut Vec<String>,
) {
    for (name, value) in table {
        let result = apply_one(config, bus, scope, name, value);
        match result {
            Ok(ref outcome) => {
                if let Some(ref w) = outcome.warning {
                    warn!("{}: {}", name, w);
                }
            }
            Err(ref e) => {
                warn!("{}: {}", name, e);
                failures.push(format!("{}: {}", name, e));
            }
        }
    }
}

fn apply_one(
    config: &mut Config,
    bus: &mut NotifyBus,
    scope: ScopeId,
    name: &str,
    value: &ConfigScalar,
) -> CsrResult {
    match *value {
        ConfigScalar::Bool(b) => {
            config.set_string(bus, scope, name, if b { "yes" } else { "no" })
        }
        ConfigScalar::Int(i) => {
            config.set_string(bus, scope, name, &i.to_string())
        }
        ConfigScalar::Str(ref s) => config.set_string(bus, scope, name, s),
        ConfigScalar::List(ref items) => {
            let mut outcome = config.set_string(bus, scope, name, "")?;
            for item in items {
                outcome = config.plus_equals(bus, scope, name, item)?;
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::slist::Separator;
    use crate::config::{ConfigDef, ConfigSet, ItemFlags, Kind};

    fn config(bus: &mut NotifyBus) -> Config {
        let mut set = ConfigSet::new();
        set.register_all(vec![
            ConfigDef::new("mark_old", Kind::Bool, "yes"),
            ConfigDef::new("nm_db_limit", Kind::Number, "0")
                .flags(ItemFlags::NOT_NEGATIVE),
            ConfigDef::new("maildir_field_delimiter", Kind::String, ":")
                .flags(ItemFlags::NOT_EMPTY | ItemFlags::ON_STARTUP),
            ConfigDef::new("nm_exclude_tags", Kind::Slist, "")
                .flags(ItemFlags::SLIST_SEP_COMMA),
        ])
        .unwrap();
        Config::new(set, bus)
    }

    #[test]
    fn parse_and_apply() {
        let startup: StartupConfig = toml::from_str(
            r#"
[set]
mark_old = false
nm_db_limit = 25
maildir_field_delimiter = ";"
nm_exclude_tags = ["spam", "deleted"]
no_such_thing = "x"

[scope.work]
nm_db_limit = 5
"#,
        )
        .unwrap();

        let mut bus = NotifyBus::new();
        let mut config = config(&mut bus);
        let failures = startup.apply(&mut config, &mut bus);
        assert_eq!(1, failures.len());
        assert!(failures[0].starts_with("no_such_thing"));

        let root = config.root();
        assert!(!config.get_bool(root, "mark_old").unwrap());
        assert_eq!(25, config.get_number(root, "nm_db_limit").unwrap());
        let tags = config.get_slist(root, "nm_exclude_tags").unwrap();
        assert_eq!(Separator::Comma, tags.flags().sep);
        assert_eq!("spam,deleted", tags.to_string());

        let work = config.scope_new(&mut bus, root, "work");
        assert_eq!(5, config.get_number(work, "nm_db_limit").unwrap());
        assert!(!config.get_bool(work, "mark_old").unwrap());

        assert!(config.store().is_startup_complete());
        assert!(config
            .set_string(&mut bus, root, "maildir_field_delimiter", "!")
            .is_err());
    }
}
