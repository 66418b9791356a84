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

/// A table of single characters, indexed by position, used for compact
/// status indicators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MbTable {
    orig: String,
    chars: Vec<String>,
}

impl MbTable {
    pub fn parse(s: &str) -> Self {
        MbTable {
            orig: s.to_owned(),
            chars: s.chars().map(String::from).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.orig
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The `i`th character, or a space if the table is too short.
    pub fn nth_wchar(&self, i: usize) -> &str {
        self.chars.get(i).map_or(" ", String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn multibyte_entries() {
        let t = MbTable::parse("a→ü");
        assert_eq!(3, t.len());
        assert_eq!("→", t.nth_wchar(1));
        assert_eq!("ü", t.nth_wchar(2));
        assert_eq!(" ", t.nth_wchar(3));
        assert_eq!("a→ü", t.as_str());
    }
}
