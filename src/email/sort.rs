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

use std::cmp::Ordering;

use super::Email;
use crate::config::regex::ConfigRegex;
use crate::config::sort::SortValue;

pub const SORT_DATE: u16 = 1;
pub const SORT_SIZE: u16 = 2;
pub const SORT_SUBJECT: u16 = 3;
pub const SORT_FROM: u16 = 4;
pub const SORT_ORDER: u16 = 5;
pub const SORT_THREADS: u16 = 6;
pub const SORT_RECEIVED: u16 = 7;
pub const SORT_TO: u16 = 8;
pub const SORT_SPAM: u16 = 14;
pub const SORT_UNREAD: u16 = 16;
pub const SORT_FLAGGED: u16 = 17;
pub const SORT_LABEL: u16 = 19;

/// Names accepted by `sort`.
pub const SORT_METHODS: &[(&str, u16)] = &[
    ("date", SORT_DATE),
    ("date-sent", SORT_DATE),
    ("date-received", SORT_RECEIVED),
    ("flagged", SORT_FLAGGED),
    ("from", SORT_FROM),
    ("label", SORT_LABEL),
    ("mailbox-order", SORT_ORDER),
    ("size", SORT_SIZE),
    ("spam", SORT_SPAM),
    ("subject", SORT_SUBJECT),
    ("threads", SORT_THREADS),
    ("to", SORT_TO),
    ("unread", SORT_UNREAD),
];

/// Names accepted by `sort_aux`, which orders messages within a thread.
pub const SORT_AUX_METHODS: &[(&str, u16)] = &[
    ("date", SORT_DATE),
    ("date-sent", SORT_DATE),
    ("date-received", SORT_RECEIVED),
    ("flagged", SORT_FLAGGED),
    ("from", SORT_FROM),
    ("label", SORT_LABEL),
    ("mailbox-order", SORT_ORDER),
    ("size", SORT_SIZE),
    ("spam", SORT_SPAM),
    ("subject", SORT_SUBJECT),
    ("to", SORT_TO),
    ("unread", SORT_UNREAD),
];

/// Compares messages by a primary method, then `sort_aux`, then arrival
/// order, so equal keys keep their insertion order.
#[derive(Clone, Copy, Debug)]
pub struct Sorter<'a> {
    pub primary: SortValue,
    pub aux: SortValue,
    pub reply_regex: Option<&'a ConfigRegex>,
}

impl<'a> Sorter<'a> {
    pub fn new(primary: SortValue, aux: SortValue) -> Self {
        Sorter {
            primary,
            aux,
            reply_regex: None,
        }
    }

    pub fn with_reply_regex(mut self, re: Option<&'a ConfigRegex>) -> Self {
        self.reply_regex = re;
        self
    }

    pub fn cmp(&self, a: &Email, b: &Email) -> Ordering {
        self.cmp_by(self.primary, a, b)
            .then_with(|| {
                if self.aux.method == self.primary.method
                    || SORT_THREADS == self.primary.method
                {
                    Ordering::Equal
                } else {
                    self.cmp_by(self.aux, a, b)
                }
            })
            .then_with(|| a.index.cmp(&b.index))
    }

    /// Compare by `sort` alone, honouring its reverse bit.
    pub fn cmp_by(&self, sort: SortValue, a: &Email, b: &Email) -> Ordering {
        let ord = self.cmp_method(sort.method, a, b);
        if sort.reverse {
            ord.reverse()
        } else {
            ord
        }
    }

    fn cmp_method(&self, method: u16, a: &Email, b: &Email) -> Ordering {
        match method {
            SORT_DATE => a.date_sent().cmp(&b.date_sent()),
            SORT_RECEIVED => a.received.cmp(&b.received),
            SORT_SIZE => a.size.cmp(&b.size),
            SORT_SUBJECT => cmp_ignore_case(
                a.env.real_subject(self.reply_regex),
                b.env.real_subject(self.reply_regex),
            ),
            SORT_FROM => {
                cmp_ignore_case(a.env.from_display(), b.env.from_display())
            }
            SORT_TO => cmp_ignore_case(a.env.to_mailbox(), b.env.to_mailbox()),
            SORT_LABEL => cmp_ignore_case(
                a.env.x_label.as_deref().unwrap_or(""),
                b.env.x_label.as_deref().unwrap_or(""),
            ),
            SORT_SPAM => spam_score(a)
                .partial_cmp(&spam_score(b))
                .unwrap_or(Ordering::Equal),
            // Unread and flagged messages first
            SORT_UNREAD => a.read.cmp(&b.read),
            SORT_FLAGGED => b.flagged.cmp(&a.flagged),
            // Threads are ordered by the threading engine; mailbox order
            // falls through to the index tie-break
            _ => Ordering::Equal,
        }
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// The leading number of the spam header, or 0.
fn spam_score(e: &Email) -> f64 {
    e.env
        .spam
        .as_deref()
        .and_then(|s| {
            let end = s
                .find(|c: char| !(c.is_ascii_digit() || '.' == c || '-' == c))
                .unwrap_or(s.len());
            s[..end].parse().ok()
        })
        .unwrap_or(0.0)
}

/// Sort `indices` (positions in `emails`) in place.
pub fn sort_indices(emails: &[Email], indices: &mut [usize], sorter: &Sorter) {
    indices.sort_by(|&a, &b| sorter.cmp(&emails[a], &emails[b]));
}
