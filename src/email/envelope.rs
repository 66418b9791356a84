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

use bitflags::bitflags;
use chrono::prelude::*;

use crate::config::address::AddressList;
use crate::config::regex::ConfigRegex;

bitflags! {
    /// Envelope fields edited in memory since the message was read.
    #[derive(Default)]
    pub struct EnvelopeChanged: u8 {
        const IN_REPLY_TO = 1 << 0;
        const REFERENCES = 1 << 1;
        const X_LABEL = 1 << 2;
        const SUBJECT = 1 << 3;
    }
}

/// The header fields the view engine cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    pub from: Option<AddressList>,
    pub to: Option<AddressList>,
    pub cc: Option<AddressList>,
    pub bcc: Option<AddressList>,
    pub reply_to: Option<AddressList>,
    pub subject: Option<String>,
    /// `Message-ID`, without the angle brackets.
    pub message_id: Option<String>,
    /// `References`, oldest first, without angle brackets.
    pub references: Vec<String>,
    /// `In-Reply-To`, without angle brackets.
    pub in_reply_to: Vec<String>,
    pub date: Option<DateTime<FixedOffset>>,
    pub x_label: Option<String>,
    pub newsgroups: Option<String>,
    pub organization: Option<String>,
    pub spam: Option<String>,
    pub changed: EnvelopeChanged,
}

impl Envelope {
    /// The subject with any reply prefixes matched by `reply_regex` removed.
    pub fn real_subject<'a>(&'a self, reply_regex: Option<&ConfigRegex>) -> &'a str {
        let subject = self.subject.as_deref().unwrap_or("");
        match reply_regex {
            Some(re) if !re.is_negated() => match re.regex().find(subject) {
                Some(m) if 0 == m.start() => &subject[m.end()..],
                _ => subject,
            },
            _ => subject,
        }
    }

    /// The id of the message this one replies to, preferring
    /// `In-Reply-To` over the last entry of `References`.
    pub fn parent_id(&self) -> Option<&str> {
        self.in_reply_to
            .last()
            .or_else(|| self.references.last())
            .map(String::as_str)
    }

    /// Every ancestor id this message claims, nearest first, without
    /// duplicates.
    pub fn ancestry(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for id in self
            .in_reply_to
            .iter()
            .rev()
            .chain(self.references.iter().rev())
        {
            if !out.contains(&id.as_str()) {
                out.push(id);
            }
        }
        out
    }

    /// Make this message a reply to `parent_id`, as `link-threads` does.
    pub fn set_parent(&mut self, parent_id: &str) {
        self.in_reply_to = vec![parent_id.to_owned()];
        self.references.retain(|r| r != parent_id);
        self.references.push(parent_id.to_owned());
        self.changed |= EnvelopeChanged::IN_REPLY_TO | EnvelopeChanged::REFERENCES;
    }

    /// Detach this message from its thread.
    pub fn clear_parent(&mut self) {
        self.in_reply_to.clear();
        self.references.clear();
        self.changed |= EnvelopeChanged::IN_REPLY_TO | EnvelopeChanged::REFERENCES;
    }

    pub fn from_display(&self) -> &str {
        self.from
            .as_ref()
            .and_then(AddressList::first)
            .map_or("", |a| a.personal_or_mailbox())
    }

    pub fn from_mailbox(&self) -> &str {
        self.from
            .as_ref()
            .and_then(AddressList::first)
            .map_or("", |a| a.mailbox.as_str())
    }

    pub fn to_mailbox(&self) -> &str {
        self.to
            .as_ref()
            .and_then(AddressList::first)
            .map_or("", |a| a.mailbox.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ItemFlags;

    #[test]
    fn reply_prefix_stripping() {
        let re = ConfigRegex::compile(
            r"^((re|aw|sv)(\[[0-9]+\])*:[ \t]*)*",
            ItemFlags::empty(),
        )
        .unwrap();
        let env = Envelope {
            subject: Some("Re: RE[2]: Aw: lunch".to_owned()),
            ..Envelope::default()
        };
        assert_eq!("lunch", env.real_subject(Some(&re)));
        assert_eq!("Re: RE[2]: Aw: lunch", env.real_subject(None));
    }

    #[test]
    fn ancestry_prefers_in_reply_to() {
        let mut env = Envelope {
            references: vec!["a".to_owned(), "b".to_owned()],
            in_reply_to: vec!["c".to_owned()],
            ..Envelope::default()
        };
        assert_eq!(Some("c"), env.parent_id());
        assert_eq!(vec!["c", "b", "a"], env.ancestry());

        env.set_parent("a");
        assert_eq!(Some("a"), env.parent_id());
        assert_eq!(vec!["b".to_owned(), "a".to_owned()], env.references);
        assert!(env.changed.contains(EnvelopeChanged::IN_REPLY_TO));
    }
}
