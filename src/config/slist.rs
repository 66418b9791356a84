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

//! Ordered lists of strings with a fixed separator.
//!
//! A backslash escapes the following character, which lets items contain the
//! separator or a backslash.

use std::fmt;

use super::ItemFlags;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Separator {
    Space,
    Comma,
    Colon,
}

impl Separator {
    pub fn as_char(self) -> char {
        match self {
            Separator::Space => ' ',
            Separator::Comma => ',',
            Separator::Colon => ':',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlistFlags {
    pub sep: Separator,
    pub allow_empty: bool,
    pub allow_dupes: bool,
    pub case_sensitive: bool,
}

impl SlistFlags {
    pub fn new(sep: Separator) -> Self {
        SlistFlags {
            sep,
            allow_empty: false,
            allow_dupes: false,
            case_sensitive: false,
        }
    }

    pub fn from_item(flags: ItemFlags) -> Self {
        let sep = if flags.contains(ItemFlags::SLIST_SEP_COLON) {
            Separator::Colon
        } else if flags.contains(ItemFlags::SLIST_SEP_COMMA) {
            Separator::Comma
        } else {
            Separator::Space
        };

        SlistFlags {
            sep,
            allow_empty: flags.contains(ItemFlags::SLIST_ALLOW_EMPTY),
            allow_dupes: flags.contains(ItemFlags::SLIST_ALLOW_DUPES),
            case_sensitive: flags.contains(ItemFlags::SLIST_CASE_SENSITIVE),
        }
    }

    fn same(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Slist {
    items: Vec<String>,
    flags: SlistFlags,
}

impl Slist {
    pub fn new(flags: SlistFlags) -> Self {
        Slist {
            items: Vec::new(),
            flags,
        }
    }

    /// Split `s` on the separator, honouring escapes. Empty items and
    /// duplicates are dropped unless the flags allow them.
    pub fn parse(s: &str, flags: SlistFlags) -> Self {
        let mut list = Slist::new(flags);
        if s.is_empty() {
            return list;
        }

        let sep = flags.sep.as_char();
        let mut current = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if '\\' == c {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if sep == c {
                list.add_string(&current);
                current.clear();
            } else {
                current.push(c);
            }
        }
        list.add_string(&current);

        list
    }

    pub fn flags(&self) -> SlistFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Append `s` unless the flags forbid it (empty or duplicate). Returns
    /// whether it was added.
    pub fn add_string(&mut self, s: &str) -> bool {
        if s.is_empty() && !self.flags.allow_empty {
            return false;
        }
        if !self.flags.allow_dupes && self.is_member(s) {
            return false;
        }

        self.items.push(s.to_owned());
        true
    }

    /// Remove every item equal to `s`. Returns whether anything was removed.
    pub fn remove_string(&mut self, s: &str) -> bool {
        let before = self.items.len();
        let flags = self.flags;
        self.items.retain(|item| !flags.same(item, s));
        self.items.len() != before
    }

    pub fn is_member(&self, s: &str) -> bool {
        self.items.iter().any(|item| self.flags.same(item, s))
    }

    /// Element-wise comparison, ignoring the separator.
    pub fn equal(&self, other: &Slist) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| self.flags.same(a, b))
    }
}

impl fmt::Display for Slist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sep = self.flags.sep.as_char();
        for (ix, item) in self.items.iter().enumerate() {
            if ix > 0 {
                write!(f, "{}", sep)?;
            }
            for c in item.chars() {
                if '\\' == c || sep == c {
                    write!(f, "\\")?;
                }
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn colon_allow_empty() -> SlistFlags {
        SlistFlags {
            allow_empty: true,
            ..SlistFlags::new(Separator::Colon)
        }
    }

    #[test]
    fn colon_separator_with_empty_items() {
        let mut list = Slist::parse("apple:banana::cherry", colon_allow_empty());
        assert_eq!(
            vec!["apple", "banana", "", "cherry"],
            list.iter().collect::<Vec<_>>()
        );

        assert!(list.remove_string(""));
        assert_eq!(3, list.len());
        assert!(list.is_member("apple"));
        assert!(list.is_member("APPLE"));

        let comma =
            Slist::parse("apple,banana,cherry", SlistFlags::new(Separator::Comma));
        assert!(list.equal(&comma));
        assert_eq!("apple:banana:cherry", list.to_string());
    }

    #[test]
    fn parse_edge_cases() {
        let flags = colon_allow_empty();
        assert_eq!(0, Slist::parse("", flags).len());
        // Two empty items, which are duplicates of each other
        assert_eq!(1, Slist::parse(":", flags).len());
        let empty_dupes = SlistFlags {
            allow_dupes: true,
            ..flags
        };
        assert_eq!(2, Slist::parse(":", empty_dupes).len());
        assert_eq!(
            vec!["apple:banana", "cherry"],
            Slist::parse(r"apple\:banana:cherry", flags)
                .iter()
                .collect::<Vec<_>>()
        );
        // Duplicates collapse unless allowed
        assert_eq!(2, Slist::parse("apple:banana:apple", flags).len());
        let dupes = SlistFlags {
            allow_dupes: true,
            ..flags
        };
        assert_eq!(3, Slist::parse("apple:banana:apple", dupes).len());

        // Without allow-empty, empty items vanish
        let strict = SlistFlags::new(Separator::Space);
        assert_eq!(
            vec!["a", "b"],
            Slist::parse("  a   b ", strict).iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn case_sensitivity() {
        let flags = SlistFlags {
            case_sensitive: true,
            ..SlistFlags::new(Separator::Comma)
        };
        let mut list = Slist::parse("Inbox,inbox", flags);
        assert_eq!(2, list.len());
        assert!(!list.is_member("INBOX"));
        assert!(list.remove_string("inbox"));
        assert_eq!(1, list.len());
    }

    fn flags_strategy() -> impl Strategy<Value = SlistFlags> {
        (
            prop_oneof![
                Just(Separator::Space),
                Just(Separator::Comma),
                Just(Separator::Colon)
            ],
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(sep, allow_empty, allow_dupes, case_sensitive)| {
                SlistFlags {
                    sep,
                    allow_empty,
                    allow_dupes,
                    case_sensitive,
                }
            })
    }

    proptest! {
        #[test]
        fn parse_inverts_display(
            flags in flags_strategy(),
            items in prop::collection::vec("[a-cA-C :,\\\\]{0,4}", 0..6),
        ) {
            let mut list = Slist::new(flags);
            for item in &items {
                list.add_string(item);
            }
            // A list holding exactly one empty item renders as the empty
            // string, which parses as the empty list.
            prop_assume!(!(1 == list.len() && list.iter().all(str::is_empty)));

            let reparsed = Slist::parse(&list.to_string(), flags);
            prop_assert_eq!(
                list.iter().collect::<Vec<_>>(),
                reparsed.iter().collect::<Vec<_>>()
            );
        }
    }
}
