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

/// One mailbox, with an optional display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub mailbox: String,
}

/// A comma-separated list of addresses, as found in `From:` and `To:`
/// headers or in address-typed config variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressList(Vec<Address>);

impl AddressList {
    /// Parse a list of `Name <mailbox>` or bare `mailbox` entries.
    ///
    /// Returns `None` if the text holds no address or any entry is
    /// malformed.
    pub fn parse(s: &str) -> Option<Self> {
        let mut out = Vec::new();
        for part in split_top_level(s)? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            out.push(parse_one(part)?);
        }

        if out.is_empty() {
            None
        } else {
            Some(AddressList(out))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Address> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Address {
    /// The display name if there is one, otherwise the mailbox.
    pub fn personal_or_mailbox(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.mailbox)
    }
}

/// Split on commas that are outside quotes and angle brackets.
fn split_top_level(s: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    let mut in_angle = false;
    let mut escaped = false;

    for (ix, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '<' if !in_quote => {
                if in_angle {
                    return None;
                }
                in_angle = true;
            }
            '>' if !in_quote => {
                if !in_angle {
                    return None;
                }
                in_angle = false;
            }
            ',' if !in_quote && !in_angle => {
                parts.push(&s[start..ix]);
                start = ix + 1;
            }
            _ => (),
        }
    }

    if in_quote || in_angle {
        return None;
    }
    parts.push(&s[start..]);
    Some(parts)
}

fn parse_one(part: &str) -> Option<Address> {
    match part.find('<') {
        None => {
            if !valid_mailbox(part) {
                return None;
            }
            Some(Address {
                name: None,
                mailbox: part.to_owned(),
            })
        }
        Some(lt) => {
            let gt = part.rfind('>')?;
            if gt < lt || !part[gt + 1..].trim().is_empty() {
                return None;
            }

            let mailbox = part[lt + 1..gt].trim();
            if !valid_mailbox(mailbox) {
                return None;
            }
            let name = unquote(part[..lt].trim());
            Some(Address {
                name: if name.is_empty() { None } else { Some(name) },
                mailbox: mailbox.to_owned(),
            })
        }
    }
}

fn valid_mailbox(s: &str) -> bool {
    !s.is_empty()
        && !s
            .chars()
            .any(|c| c.is_whitespace() || '<' == c || '>' == c || '"' == c)
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let mut out = String::with_capacity(s.len());
        let mut chars = s[1..s.len() - 1].chars();
        while let Some(c) = chars.next() {
            if '\\' == c {
                if let Some(e) = chars.next() {
                    out.push(e);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        s.to_owned()
    }
}

fn needs_quoting(name: &str) -> bool {
    name.chars().any(|c| ",;:\"<>@()[]\\".contains(c))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name {
            None => write!(f, "{}", self.mailbox),
            Some(ref name) if needs_quoting(name) => {
                write!(f, "\"")?;
                for c in name.chars() {
                    if '"' == c || '\\' == c {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "\" <{}>", self.mailbox)
            }
            Some(ref name) => write!(f, "{} <{}>", name, self.mailbox),
        }
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, addr) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", addr)?;
        }
        Ok(())
    }
}
