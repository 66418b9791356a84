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

//! The link between tags and message flags, and the `type=` query option.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::{Config, ConfigError, ScopeId};
use crate::email::tags::{TagList, TagOp};
use crate::email::Email;
use crate::maildir::filename::MaildirFlags;

/// The tags standing for the unread, replied and flagged states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagNames {
    pub unread: String,
    pub replied: String,
    pub flagged: String,
}

impl Default for TagNames {
    fn default() -> Self {
        TagNames {
            unread: "unread".to_owned(),
            replied: "replied".to_owned(),
            flagged: "flagged".to_owned(),
        }
    }
}

impl TagNames {
    pub fn from_config(
        config: &Config,
        scope: ScopeId,
    ) -> Result<Self, ConfigError> {
        let defaults = TagNames::default();
        let get = |name: &str, default: String| -> Result<String, ConfigError> {
            Ok(config
                .get_str(scope, name)?
                .filter(|s| !s.is_empty())
                .unwrap_or(default))
        };
        Ok(TagNames {
            unread: get("nm_unread_tag", defaults.unread)?,
            replied: get("nm_replied_tag", defaults.replied)?,
            flagged: get("nm_flagged_tag", defaults.flagged)?,
        })
    }

    /// Bring the flag tags in `tags` in line with file-name flags.
    pub fn sync_from_flags(
        &self,
        flags: &MaildirFlags,
        tags: &mut BTreeSet<String>,
    ) -> bool {
        let mut changed = false;
        changed |= set_tag(tags, &self.unread, !flags.read);
        changed |= set_tag(tags, &self.replied, flags.replied);
        changed |= set_tag(tags, &self.flagged, flags.flagged);
        changed
    }

    /// Set the flags of `email` from its tags. Returns whether any flag
    /// changed.
    pub fn apply_to_email(&self, email: &mut Email) -> bool {
        let read = !email.tags.contains(&self.unread);
        let replied = email.tags.contains(&self.replied);
        let flagged = email.tags.contains(&self.flagged);
        let changed = (read, replied, flagged)
            != (email.read, email.replied, email.flagged);

        email.read = read;
        if read {
            email.old = false;
        }
        email.replied = replied;
        email.flagged = flagged;
        changed
    }
}

fn set_tag(tags: &mut BTreeSet<String>, tag: &str, present: bool) -> bool {
    if present {
        tags.insert(tag.to_owned())
    } else {
        tags.remove(tag)
    }
}

/// Apply a tag edit to a stored tag set. Returns whether anything changed.
pub fn apply_ops(tags: &mut BTreeSet<String>, ops: &[TagOp]) -> bool {
    let mut changed = false;
    for op in ops {
        changed |= match *op {
            TagOp::Add(ref t) => tags.insert(t.clone()),
            TagOp::Remove(ref t) => tags.remove(t),
            TagOp::Toggle(ref t) => {
                if !tags.remove(t) {
                    tags.insert(t.clone());
                }
                true
            }
        };
    }
    changed
}

pub fn to_tag_list(tags: &BTreeSet<String>) -> TagList {
    let mut list = TagList::new();
    for tag in tags {
        list.add(tag);
    }
    list
}

/// Render a tag edit in its canonical form.
pub fn render_ops(ops: &[TagOp]) -> String {
    ops.iter()
        .map(|op| match *op {
            TagOp::Add(ref t) => format!("+{}", t),
            TagOp::Remove(ref t) => format!("-{}", t),
            TagOp::Toggle(ref t) => format!("!{}", t),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a mailbox lists the messages matching its query, or whole
/// threads containing a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    Messages,
    Threads,
}

impl QueryType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "messages" => Some(QueryType::Messages),
            "threads" => Some(QueryType::Threads),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            QueryType::Messages => write!(f, "messages"),
            QueryType::Threads => write!(f, "threads"),
        }
    }
}

/// Pull `type=threads` or `type=messages` out of a query typed by the
/// user. The last such word wins; all of them are removed.
pub fn extract_type(query: &str) -> (Option<QueryType>, String) {
    let mut found = None;
    let mut rest = Vec::new();
    for word in query.split_whitespace() {
        match word
            .strip_prefix("type=")
            .and_then(QueryType::parse)
        {
            Some(t) => found = Some(t),
            None => rest.push(word),
        }
    }
    (found, rest.join(" "))
}
