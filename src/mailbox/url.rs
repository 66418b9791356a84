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

//! `<scheme>://<path>?key=value&...` mailbox URLs.
//!
//! Parameter values are percent-decoded on parse and percent-encoded on
//! output. Unknown keys are kept, in order, so a URL survives a round trip.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters that must be escaped inside a parameter value.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxUrl {
    pub scheme: String,
    pub path: String,
    params: Vec<(String, String)>,
}

impl MailboxUrl {
    pub fn new(scheme: &str, path: &str) -> Self {
        MailboxUrl {
            scheme: scheme.to_owned(),
            path: path.to_owned(),
            params: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let sep = s.find("://")?;
        let scheme = &s[..sep];
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || '+' == c || '-' == c)
        {
            return None;
        }

        let rest = &s[sep + 3..];
        let (path, query) = match rest.find('?') {
            Some(q) => (&rest[..q], Some(&rest[q + 1..])),
            None => (rest, None),
        };

        let mut url = MailboxUrl::new(&scheme.to_ascii_lowercase(), &decode(path));
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = match pair.find('=') {
                Some(eq) => (&pair[..eq], &pair[eq + 1..]),
                None => (pair, ""),
            };
            url.params.push((decode(k), decode(v)));
        }

        Some(url)
    }

    /// The last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v.as_str())
    }

    /// Replace every value of `key` with `value`, keeping its position.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.params.iter().position(|&(ref k, _)| k == key) {
            Some(pos) => {
                self.params[pos].1 = value.to_owned();
                let mut seen = false;
                self.params.retain(|&(ref k, _)| {
                    if k != key {
                        true
                    } else {
                        let first = !seen;
                        seen = true;
                        first
                    }
                });
            }
            None => self.params.push((key.to_owned(), value.to_owned())),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.params.retain(|&(ref k, _)| k != key);
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|&(ref k, ref v)| (k.as_str(), v.as_str()))
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

impl fmt::Display for MailboxUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)?;
        for (ix, &(ref k, ref v)) in self.params.iter().enumerate() {
            write!(
                f,
                "{}{}={}",
                if 0 == ix { '?' } else { '&' },
                utf8_percent_encode(k, QUERY_VALUE),
                utf8_percent_encode(v, QUERY_VALUE)
            )?;
        }
        Ok(())
    }
}
