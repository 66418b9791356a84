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

/// The backend tags of a message, in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagList(Vec<String>);

/// One element of a tag edit such as `+inbox -unread !flagged`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagOp {
    Add(String),
    Remove(String),
    Toggle(String),
}

impl TagOp {
    pub fn tag(&self) -> &str {
        match *self {
            TagOp::Add(ref t) | TagOp::Remove(ref t) | TagOp::Toggle(ref t) => {
                t
            }
        }
    }
}

/// Parse a whitespace-separated tag edit. A leading `-` removes the tag,
/// `!` toggles it, and `+` or no prefix adds it.
pub fn parse_tag_edit(buf: &str) -> Result<Vec<TagOp>, String> {
    let mut ops = Vec::new();
    for word in buf.split_whitespace() {
        let (ctor, name): (fn(String) -> TagOp, &str) = match word.as_bytes()[0]
        {
            b'-' => (TagOp::Remove, &word[1..]),
            b'!' => (TagOp::Toggle, &word[1..]),
            b'+' => (TagOp::Add, &word[1..]),
            _ => (TagOp::Add, word),
        };

        if name.is_empty() {
            return Err(format!("Missing tag name in '{}'", word));
        }
        if name.chars().any(|c| c.is_control() || '"' == c) {
            return Err(format!("Invalid tag name: {}", name));
        }
        ops.push(ctor(name.to_owned()));
    }

    Ok(ops)
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a whitespace-separated list, dropping duplicates.
    pub fn parse(s: &str) -> Self {
        let mut list = TagList::new();
        for tag in s.split_whitespace() {
            list.add(tag);
        }
        list
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(&mut self, tag: &str) -> bool {
        if self.contains(tag) {
            false
        } else {
            self.0.push(tag.to_owned());
            true
        }
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        before != self.0.len()
    }

    /// Apply `ops` in order. Returns whether anything changed.
    pub fn apply(&mut self, ops: &[TagOp]) -> bool {
        let mut changed = false;
        for op in ops {
            changed |= match *op {
                TagOp::Add(ref t) => self.add(t),
                TagOp::Remove(ref t) => self.remove(t),
                TagOp::Toggle(ref t) => {
                    if !self.remove(t) {
                        self.add(t);
                    }
                    true
                }
            };
        }
        changed
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, tag) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", tag)?;
        }
        Ok(())
    }
}
