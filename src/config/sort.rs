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

use super::ItemFlags;

/// A sort method, optionally reversed and/or keyed on the last member of a
/// group (used when ordering threads by their newest message).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SortValue {
    pub method: u16,
    pub reverse: bool,
    pub last: bool,
}

pub const SORT_REVERSE_BIT: u32 = 1 << 8;
pub const SORT_LAST_BIT: u32 = 1 << 9;

const REVERSE_PREFIX: &str = "reverse-";
const LAST_PREFIX: &str = "last-";

impl SortValue {
    pub fn new(method: u16) -> Self {
        SortValue {
            method,
            reverse: false,
            last: false,
        }
    }

    /// Parse `[reverse-][last-]method`, with the prefixes in either order.
    pub fn parse(
        s: &str,
        table: &[(&str, u16)],
        flags: ItemFlags,
    ) -> Result<Self, String> {
        let mut rest = s;
        let mut reverse = false;
        let mut last = false;
        loop {
            if !reverse && starts_with_ci(rest, REVERSE_PREFIX) {
                reverse = true;
                rest = &rest[REVERSE_PREFIX.len()..];
            } else if !last && starts_with_ci(rest, LAST_PREFIX) {
                last = true;
                rest = &rest[LAST_PREFIX.len()..];
            } else {
                break;
            }
        }

        let method = table
            .iter()
            .find(|&&(name, _)| name.eq_ignore_ascii_case(rest))
            .map(|&(_, m)| m)
            .ok_or_else(|| format!("Invalid sort name: {}", rest))?;

        let sv = SortValue {
            method,
            reverse,
            last,
        };
        sv.check(table, flags)?;
        Ok(sv)
    }

    pub fn check(
        self,
        table: &[(&str, u16)],
        flags: ItemFlags,
    ) -> Result<(), String> {
        if self.reverse && !flags.contains(ItemFlags::SORT_REVERSE) {
            return Err("This sort may not be reversed".to_owned());
        }
        if self.last && !flags.contains(ItemFlags::SORT_LAST) {
            return Err("This sort does not support 'last-'".to_owned());
        }
        if !table.iter().any(|&(_, m)| m == self.method) {
            return Err(format!("Invalid sort method: {}", self.method));
        }
        Ok(())
    }

    pub fn render(self, table: &[(&str, u16)]) -> String {
        let mut out = String::new();
        if self.reverse {
            out.push_str(REVERSE_PREFIX);
        }
        if self.last {
            out.push_str(LAST_PREFIX);
        }
        if let Some(&(name, _)) = table.iter().find(|&&(_, m)| m == self.method)
        {
            out.push_str(name);
        }
        out
    }

    /// The packed integer form: method in the low byte, then the reverse
    /// and last bits.
    pub fn bits(self) -> u32 {
        u32::from(self.method)
            | if self.reverse { SORT_REVERSE_BIT } else { 0 }
            | if self.last { SORT_LAST_BIT } else { 0 }
    }
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
pub(super) const TEST_METHODS: &[(&str, u16)] =
    &[("date", 1), ("subject", 2), ("size", 3)];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefixes_in_either_order() {
        let flags = ItemFlags::SORT_REVERSE | ItemFlags::SORT_LAST;
        let a = SortValue::parse("reverse-last-date", TEST_METHODS, flags)
            .unwrap();
        let b = SortValue::parse("last-reverse-date", TEST_METHODS, flags)
            .unwrap();
        assert_eq!(a, b);
        assert!(a.reverse && a.last);
        assert_eq!("reverse-last-date", a.render(TEST_METHODS));
        assert_eq!(1 | SORT_REVERSE_BIT | SORT_LAST_BIT, a.bits());
    }

    #[test]
    fn disallowed_prefixes() {
        assert!(SortValue::parse(
            "reverse-date",
            TEST_METHODS,
            ItemFlags::empty()
        )
        .is_err());
        assert!(SortValue::parse(
            "last-date",
            TEST_METHODS,
            ItemFlags::SORT_REVERSE
        )
        .is_err());
        assert!(SortValue::parse(
            "reverse-reverse-date",
            TEST_METHODS,
            ItemFlags::SORT_REVERSE
        )
        .is_err());
        assert!(
            SortValue::parse("colour", TEST_METHODS, ItemFlags::all()).is_err()
        );
    }
}
