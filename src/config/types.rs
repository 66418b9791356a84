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

//! Per-type behaviour of config items.

use super::address::AddressList;
use super::mbtable::MbTable;
use super::quad::Quad;
use super::regex::ConfigRegex;
use super::slist::{Slist, SlistFlags};
use super::sort::SortValue;
use super::{ConfigDef, ConfigError, ItemFlags, Kind, Value};

/// What a config type must provide. Everything generic (startup lock,
/// no-change detection, validators, storage) is handled by the caller.
pub(super) trait ConfigType: Sync {
    /// Parse the string form of a value.
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError>;

    fn render(&self, def: &ConfigDef, value: &Value) -> String;

    /// Check that a native value is of the right type and obeys the item's
    /// constraints.
    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError>;

    fn plus_equals(
        &self,
        def: &ConfigDef,
        _current: &Value,
        _s: &str,
    ) -> Result<Value, ConfigError> {
        Err(ConfigError::not_implemented(&def.name, "+="))
    }

    fn minus_equals(
        &self,
        def: &ConfigDef,
        _current: &Value,
        _s: &str,
    ) -> Result<Value, ConfigError> {
        Err(ConfigError::not_implemented(&def.name, "-="))
    }

    fn toggle(
        &self,
        def: &ConfigDef,
        _current: &Value,
    ) -> Result<Value, ConfigError> {
        Err(ConfigError::not_implemented(&def.name, "toggling"))
    }

    fn is_empty(&self, _value: &Value) -> bool {
        false
    }
}

pub(super) fn type_of(kind: &Kind) -> &'static dyn ConfigType {
    match *kind {
        Kind::Bool => &BoolType,
        Kind::Number => &NumberType,
        Kind::Long => &LongType,
        Kind::Quad => &QuadType,
        Kind::String | Kind::Path | Kind::MyVar | Kind::Deprecated => {
            &StringType
        }
        Kind::Regex => &RegexType,
        Kind::Enum(..) => &EnumType,
        Kind::Sort(..) => &SortType,
        Kind::MbTable => &MbTableType,
        Kind::Slist => &SlistType,
        Kind::Address => &AddressType,
    }
}

struct BoolType;

const BOOL_SPELLINGS: &[(&str, bool)] = &[
    ("yes", true),
    ("no", false),
    ("y", true),
    ("n", false),
    ("true", true),
    ("false", false),
    ("1", true),
    ("0", false),
    ("on", true),
    ("off", false),
];

impl ConfigType for BoolType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        BOOL_SPELLINGS
            .iter()
            .find(|&&(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, b)| Value::Bool(b))
            .ok_or_else(|| {
                ConfigError::invalid(
                    &def.name,
                    format!("Invalid boolean value: {}", s),
                )
            })
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Bool(true) => "yes".to_owned(),
            _ => "no".to_owned(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Bool(_) => Ok(()),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn toggle(
        &self,
        def: &ConfigDef,
        current: &Value,
    ) -> Result<Value, ConfigError> {
        match *current {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

/// Parse an optionally signed decimal integer, rejecting anything else
/// (including surrounding whitespace).
fn parse_integer(def: &ConfigDef, s: &str) -> Result<i64, ConfigError> {
    let digits = s.strip_prefix(|c| '-' == c || '+' == c).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::invalid(
            &def.name,
            format!("Invalid number: {}", s),
        ));
    }

    s.parse::<i64>().map_err(|_| {
        ConfigError::invalid(&def.name, format!("Number is too big: {}", s))
    })
}

fn check_not_negative(def: &ConfigDef, n: i64) -> Result<(), ConfigError> {
    if n < 0 && def.flags.contains(ItemFlags::NOT_NEGATIVE) {
        Err(ConfigError::rejected(
            &def.name,
            format!("Option {} may not be negative", def.name),
        ))
    } else {
        Ok(())
    }
}

struct NumberType;

impl NumberType {
    fn checked(def: &ConfigDef, n: Option<i64>) -> Result<Value, ConfigError> {
        let n = n
            .filter(|&n| n >= i64::from(i16::MIN) && n <= i64::from(i16::MAX))
            .ok_or_else(|| {
                ConfigError::invalid(
                    &def.name,
                    format!("Option {} must be between -32768 and 32767", def.name),
                )
            })?;
        check_not_negative(def, n)?;
        Ok(Value::Number(n as i16))
    }

    fn current(def: &ConfigDef, value: &Value) -> Result<i64, ConfigError> {
        match *value {
            Value::Number(n) => Ok(i64::from(n)),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

impl ConfigType for NumberType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        Self::checked(def, Some(parse_integer(def, s)?))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        let n = Self::current(def, value)?;
        check_not_negative(def, n)
    }

    fn plus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let delta = parse_integer(def, s)?;
        Self::checked(def, Self::current(def, current)?.checked_add(delta))
    }

    fn minus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let delta = parse_integer(def, s)?;
        Self::checked(def, Self::current(def, current)?.checked_sub(delta))
    }

    fn toggle(
        &self,
        def: &ConfigDef,
        current: &Value,
    ) -> Result<Value, ConfigError> {
        Self::checked(def, Some(-Self::current(def, current)?))
    }
}

struct LongType;

impl LongType {
    fn checked(def: &ConfigDef, n: Option<i64>) -> Result<Value, ConfigError> {
        let n = n.ok_or_else(|| {
            ConfigError::invalid(
                &def.name,
                format!("Option {} is out of range", def.name),
            )
        })?;
        check_not_negative(def, n)?;
        Ok(Value::Long(n))
    }

    fn current(def: &ConfigDef, value: &Value) -> Result<i64, ConfigError> {
        match *value {
            Value::Long(n) => Ok(n),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

impl ConfigType for LongType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        Self::checked(def, Some(parse_integer(def, s)?))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Long(n) => n.to_string(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        check_not_negative(def, Self::current(def, value)?)
    }

    fn plus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let delta = parse_integer(def, s)?;
        Self::checked(def, Self::current(def, current)?.checked_add(delta))
    }

    fn minus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let delta = parse_integer(def, s)?;
        Self::checked(def, Self::current(def, current)?.checked_sub(delta))
    }

    fn toggle(
        &self,
        def: &ConfigDef,
        current: &Value,
    ) -> Result<Value, ConfigError> {
        Self::checked(def, Self::current(def, current)?.checked_neg())
    }
}

struct QuadType;

impl ConfigType for QuadType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        Quad::parse(s).map(Value::Quad).ok_or_else(|| {
            ConfigError::invalid(&def.name, format!("Invalid quad value: {}", s))
        })
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Quad(q) => q.name().to_owned(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Quad(_) => Ok(()),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn toggle(
        &self,
        def: &ConfigDef,
        current: &Value,
    ) -> Result<Value, ConfigError> {
        match *current {
            Value::Quad(q) => Ok(Value::Quad(q.toggle())),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

fn check_not_empty(def: &ConfigDef, empty: bool) -> Result<(), ConfigError> {
    if empty && def.flags.contains(ItemFlags::NOT_EMPTY) {
        Err(ConfigError::rejected(
            &def.name,
            format!("Option {} may not be empty", def.name),
        ))
    } else {
        Ok(())
    }
}

/// Strings, paths, user variables and deprecated items. Paths are stored
/// exactly as given.
struct StringType;

impl ConfigType for StringType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        check_not_empty(def, s.is_empty())?;
        Ok(Value::Str(Some(s.to_owned()).filter(|s| !s.is_empty())))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Str(Some(ref s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Str(ref s) => check_not_empty(
                def,
                s.as_ref().map_or(true, |s| s.is_empty()),
            ),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn plus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        match (&def.kind, current) {
            (&Kind::String, &Value::Str(ref cur)) => {
                let mut joined = cur.clone().unwrap_or_default();
                joined.push_str(s);
                self.parse(def, &joined)
            }
            _ => Err(ConfigError::not_implemented(&def.name, "+=")),
        }
    }

    fn is_empty(&self, value: &Value) -> bool {
        matches!(*value, Value::Str(None))
    }
}

struct RegexType;

impl ConfigType for RegexType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        check_not_empty(def, s.is_empty())?;
        if s.is_empty() {
            return Ok(Value::Regex(None));
        }

        ConfigRegex::compile(s, def.flags)
            .map(|r| Value::Regex(Some(r)))
            .map_err(|e| ConfigError::invalid(&def.name, e.to_string()))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Regex(Some(ref r)) => r.pattern().to_owned(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Regex(ref r) => check_not_empty(def, r.is_none()),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn is_empty(&self, value: &Value) -> bool {
        matches!(*value, Value::Regex(None))
    }
}

struct EnumType;

impl EnumType {
    fn table(def: &ConfigDef) -> &'static [(&'static str, u32)] {
        match def.kind {
            Kind::Enum(table) => table,
            _ => &[],
        }
    }
}

impl ConfigType for EnumType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        Self::table(def)
            .iter()
            .find(|&&(name, _)| name == s)
            .map(|&(_, v)| Value::Enum(v))
            .ok_or_else(|| {
                ConfigError::invalid(
                    &def.name,
                    format!("Invalid value for option {}: {}", def.name, s),
                )
            })
    }

    fn render(&self, def: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Enum(v) => Self::table(def)
                .iter()
                .find(|&&(_, tv)| tv == v)
                .map(|&(name, _)| name.to_owned())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Enum(v) if Self::table(def).iter().any(|&(_, tv)| tv == v) => {
                Ok(())
            }
            Value::Enum(v) => Err(ConfigError::invalid(
                &def.name,
                format!("Invalid value for option {}: {}", def.name, v),
            )),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

struct SortType;

impl SortType {
    fn table(def: &ConfigDef) -> &'static [(&'static str, u16)] {
        match def.kind {
            Kind::Sort(table) => table,
            _ => &[],
        }
    }
}

impl ConfigType for SortType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        SortValue::parse(s, Self::table(def), def.flags)
            .map(Value::Sort)
            .map_err(|message| ConfigError::invalid(&def.name, message))
    }

    fn render(&self, def: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Sort(sv) => sv.render(Self::table(def)),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Sort(sv) => {
                sv.check(Self::table(def), def.flags).map_err(|message| {
                    ConfigError::invalid(&def.name, message)
                })
            }
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

struct MbTableType;

impl ConfigType for MbTableType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        check_not_empty(def, s.is_empty())?;
        Ok(Value::MbTable(if s.is_empty() {
            None
        } else {
            Some(MbTable::parse(s))
        }))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::MbTable(Some(ref t)) => t.as_str().to_owned(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::MbTable(ref t) => check_not_empty(def, t.is_none()),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn is_empty(&self, value: &Value) -> bool {
        matches!(*value, Value::MbTable(None))
    }
}

struct SlistType;

impl SlistType {
    fn current<'a>(
        def: &ConfigDef,
        value: &'a Value,
    ) -> Result<&'a Slist, ConfigError> {
        match *value {
            Value::Slist(ref l) => Ok(l),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }
}

impl ConfigType for SlistType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        let list = Slist::parse(s, SlistFlags::from_item(def.flags));
        check_not_empty(def, list.is_empty())?;
        Ok(Value::Slist(list))
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Slist(ref l) => l.to_string(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        let list = Self::current(def, value)?;
        check_not_empty(def, list.is_empty())
    }

    fn plus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let mut list = Self::current(def, current)?.clone();
        if !s.is_empty() {
            list.add_string(s);
        }
        Ok(Value::Slist(list))
    }

    fn minus_equals(
        &self,
        def: &ConfigDef,
        current: &Value,
        s: &str,
    ) -> Result<Value, ConfigError> {
        let mut list = Self::current(def, current)?.clone();
        list.remove_string(s);
        check_not_empty(def, list.is_empty())?;
        Ok(Value::Slist(list))
    }

    fn is_empty(&self, value: &Value) -> bool {
        matches!(*value, Value::Slist(ref l) if l.is_empty())
    }
}

struct AddressType;

impl ConfigType for AddressType {
    fn parse(&self, def: &ConfigDef, s: &str) -> Result<Value, ConfigError> {
        check_not_empty(def, s.trim().is_empty())?;
        if s.trim().is_empty() {
            return Ok(Value::Address(None));
        }

        AddressList::parse(s)
            .map(|a| Value::Address(Some(a)))
            .ok_or_else(|| {
                ConfigError::invalid(&def.name, format!("Invalid address: {}", s))
            })
    }

    fn render(&self, _: &ConfigDef, value: &Value) -> String {
        match *value {
            Value::Address(Some(ref a)) => a.to_string(),
            _ => String::new(),
        }
    }

    fn check_native(
        &self,
        def: &ConfigDef,
        value: &Value,
    ) -> Result<(), ConfigError> {
        match *value {
            Value::Address(ref a) => check_not_empty(def, a.is_none()),
            _ => Err(ConfigError::wrong_type(&def.name)),
        }
    }

    fn is_empty(&self, value: &Value) -> bool {
        matches!(*value, Value::Address(None))
    }
}

#[cfg(test)]
pub(super) const TEST_ENUM: &[(&str, u32)] =
    &[("one", 1), ("two", 2), ("deux", 2), ("three", 3)];

#[cfg(test)]
mod test {
    use super::super::{ConfigSet, CsrFlags};
    use super::*;

    fn cs(def: ConfigDef) -> ConfigSet {
        let mut cs = ConfigSet::new();
        cs.register(def).unwrap();
        cs
    }

    #[test]
    fn enum_aliases_and_case() {
        let mut cs = cs(ConfigDef::new("e", Kind::Enum(TEST_ENUM), "one"));
        cs.set_string("e", "deux").unwrap();
        assert_eq!("two", cs.get_string("e").unwrap());
        assert!(cs.set_string("e", "Two").is_err());
        assert!(cs.native_set("e", Value::Enum(9)).is_err());
    }

    #[test]
    fn string_not_empty_and_append() {
        let mut cs = cs(ConfigDef::new("s", Kind::String, "x")
            .flags(ItemFlags::NOT_EMPTY));
        assert!(cs.set_string("s", "").is_err());
        cs.plus_equals("s", "yz").unwrap();
        assert_eq!("xyz", cs.get_string("s").unwrap());

        let mut paths = ConfigSet::new();
        paths
            .register(ConfigDef::new("p", Kind::Path, "~/Mail/../x"))
            .unwrap();
        assert_eq!("~/Mail/../x", paths.get_string("p").unwrap());
        assert!(paths.plus_equals("p", "y").is_err());
    }

    #[test]
    fn slist_compound_ops() {
        let mut cs = cs(ConfigDef::new("tags", Kind::Slist, "a,b")
            .flags(ItemFlags::SLIST_SEP_COMMA));
        assert!(!cs.plus_equals("tags", "").unwrap().is_change());
        assert!(!cs.plus_equals("tags", "a").unwrap().is_change());
        assert!(cs.plus_equals("tags", "c").unwrap().is_change());
        assert_eq!("a,b,c", cs.get_string("tags").unwrap());
        assert!(!cs.minus_equals("tags", "z").unwrap().is_change());
        cs.minus_equals("tags", "b").unwrap();
        assert_eq!("a,c", cs.get_string("tags").unwrap());
        cs.minus_equals("tags", "a").unwrap();
        let outcome = cs.minus_equals("tags", "c").unwrap();
        assert!(outcome.flags.contains(CsrFlags::EMPTY));
    }

    #[test]
    fn address_items() {
        let mut cs = cs(ConfigDef::new("from", Kind::Address, ""));
        cs.set_string("from", "Jo Bloggs <jo@example.com>").unwrap();
        assert_eq!(
            "Jo Bloggs <jo@example.com>",
            cs.get_string("from").unwrap()
        );
        assert!(cs.set_string("from", "<<").is_err());
    }

    #[test]
    fn mbtable_items() {
        let mut cs = cs(ConfigDef::new("to_chars", Kind::MbTable, " +TCF"));
        assert_eq!(" +TCF", cs.get_string("to_chars").unwrap());
        match cs.native_get("to_chars").unwrap() {
            Value::MbTable(Some(t)) => {
                assert_eq!("T", t.nth_wchar(2));
                assert_eq!(" ", t.nth_wchar(20));
            }
            v => panic!("Unexpected value: {:?}", v),
        }
    }
}
