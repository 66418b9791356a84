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

//! The in-memory message model.

pub mod envelope;
pub mod parse;
pub mod sort;
pub mod tags;

use chrono::prelude::*;

use self::envelope::Envelope;
use self::tags::TagList;
use crate::config::{ConfigDef, ConfigError, ConfigSet, ItemFlags, Kind};
use crate::thread::NodeId;

/// One message of a mailbox.
///
/// Messages live in the mailbox's message vector and are addressed by
/// `index`. Everything the threading engine and view controller attach to a
/// message (`vnum`, `thread`, tree glyphs) is derived state, rebuilt
/// whenever the view is.
#[derive(Clone, Debug, Default)]
pub struct Email {
    /// The message id, or a synthesised one if the message has none.
    pub id: String,
    /// Backend-specific location, e.g. `cur/1234.abc:2,S` for maildir.
    pub path: String,
    pub env: Envelope,
    pub tags: TagList,

    pub read: bool,
    pub old: bool,
    pub replied: bool,
    pub flagged: bool,
    pub tagged: bool,
    pub deleted: bool,
    /// Remove from the store on the next sync. Implies `deleted`.
    pub purge: bool,
    /// Delete by marking trashed rather than removing.
    pub trash: bool,
    pub attach_deleted: bool,
    /// Differs from the on-disk copy.
    pub changed: bool,
    /// Still present in the backing store.
    pub active: bool,
    /// Hidden without being deleted, e.g. pending removal after a reopen.
    pub quasi_deleted: bool,

    /// Member of the current view: matches the limit and is not hidden
    /// inside a collapsed thread.
    pub visible: bool,
    /// Matches the current limit pattern (always true without one).
    pub limited: bool,
    /// The limit has been evaluated against the current message state.
    pub limit_visited: bool,

    pub size: u64,
    pub lines: u32,
    /// Arrival time.
    pub received: i64,
    /// Backend flag letters not interpreted by the engine.
    pub custom_flags: String,

    /// Position in the mailbox's message vector.
    pub index: usize,
    /// Position in the view, if visible.
    pub vnum: Option<usize>,

    /// Thread node, valid until the next thread rebuild.
    pub thread: Option<NodeId>,
    pub collapsed: bool,
    /// Number of messages of this message's subtree missing from the view.
    pub num_hidden: usize,
    pub display_subject: bool,
    pub subject_changed: bool,
    /// Tree glyphs to draw before the subject.
    pub tree: String,
    pub depth: usize,
}

/// The flags that can be set through `Mailbox::set_flag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Read,
    Old,
    /// Unread and not old; setting it clears both `read` and `old`.
    New,
    Replied,
    Flagged,
    Tagged,
    Deleted,
    Purge,
}

impl Email {
    pub fn new(id: String, path: String) -> Self {
        Email {
            id,
            path,
            active: true,
            visible: true,
            limited: true,
            ..Email::default()
        }
    }

    /// The sent date, falling back to the arrival time.
    pub fn date_sent(&self) -> i64 {
        self.env
            .date
            .as_ref()
            .map_or(self.received, DateTime::timestamp)
    }

    /// Unread and not seen before.
    pub fn is_new(&self) -> bool {
        !self.read && !self.old
    }

    /// The index-line status character, from `flag_chars`.
    pub fn status_char(&self) -> usize {
        if self.deleted {
            2
        } else if self.attach_deleted {
            3
        } else if self.tagged {
            0
        } else if self.flagged {
            1
        } else if self.replied {
            4
        } else if self.read {
            if self.old {
                5
            } else {
                10
            }
        } else if self.old {
            5
        } else {
            6
        }
    }
}

/// Synthesise a message id for a message without one, stable for the same
/// backend location.
pub fn synthetic_id(path: &str) -> String {
    // Strip maildir flags so the id survives flag changes
    let base = path
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .split(|c| ':' == c || ';' == c)
        .next()
        .unwrap_or(path);
    format!("{}@mailview.invalid", base)
}

const REPLY_REGEX: &str = r"^((re|aw|sv)(\[[0-9]+\])*:[ \t]*)*";

pub fn register(set: &mut ConfigSet) -> Result<(), ConfigError> {
    let sort_flags = ItemFlags::SORT_REVERSE | ItemFlags::SORT_LAST;
    set.register_all(vec![
        ConfigDef::new("sort", Kind::Sort(sort::SORT_METHODS), "date")
            .flags(sort_flags),
        ConfigDef::new("sort_aux", Kind::Sort(sort::SORT_AUX_METHODS), "date")
            .flags(sort_flags),
        ConfigDef::new("reply_regex", Kind::Regex, REPLY_REGEX)
            .flags(ItemFlags::REGEX_NOSUB),
        ConfigDef::new("to_chars", Kind::MbTable, " +TCFLR"),
        ConfigDef::new("flag_chars", Kind::MbTable, "*!DdrONon- "),
    ])
}
