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

use std::fmt;

use regex::{Regex, RegexBuilder};

use super::ItemFlags;

/// A compiled regex config value.
#[derive(Clone)]
pub struct ConfigRegex {
    /// The pattern as the user gave it, including any leading `!`.
    pattern: String,
    regex: Regex,
    negated: bool,
}

impl ConfigRegex {
    /// Compile `pattern` according to the item flags.
    ///
    /// Patterns without upper-case letters match case-insensitively unless
    /// `REGEX_MATCH_CASE` is set.
    pub fn compile(
        pattern: &str,
        flags: ItemFlags,
    ) -> Result<Self, regex::Error> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) if flags.contains(ItemFlags::REGEX_ALLOW_NOT) => {
                (true, rest)
            }
            _ => (false, pattern),
        };

        let source = if flags.contains(ItemFlags::REGEX_NOSUB) {
            strip_captures(body)
        } else {
            body.to_owned()
        };
        let fold = !flags.contains(ItemFlags::REGEX_MATCH_CASE)
            && !body.chars().any(char::is_uppercase);
        let regex = RegexBuilder::new(&source).case_insensitive(fold).build()?;

        Ok(ConfigRegex {
            pattern: pattern.to_owned(),
            regex,
            negated,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether `text` matches, taking negation into account.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.negated
    }
}

impl PartialEq for ConfigRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Debug for ConfigRegex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConfigRegex({:?})", self.pattern)
    }
}

/// Rewrite every capturing group of `pattern` as a non-capturing one.
fn strip_captures(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                if Some(&'^') == chars.peek() {
                    out.push('^');
                    chars.next();
                }
                // A leading ']' is a literal member of the class
                if Some(&']') == chars.peek() {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '(' if !in_class && Some(&'?') != chars.peek() => {
                out.push_str("(?:");
            }
            _ => out.push(c),
        }
    }

    out
}
