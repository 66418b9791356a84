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

//! Limit and search patterns.
//!
//! ```text
//! pattern = and ("|" and)*
//! and     = unary unary*
//! unary   = "!" unary | "(" pattern ")" | "~" flag | "~" field value
//! flag    = A | N | O | U | R | F | D | T | Q | =
//! field   = s | f | t | i | y | Y | x
//! ```
//!
//! Field values are regular expressions, optionally quoted with `"` or `'`.
//! A value without upper-case letters matches case-insensitively. Text with
//! no `~` in it is a simple search: it is substituted for each `%s` in
//! `simple_search` and the result parsed instead.

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while1};
use nom::character::complete::{anychar, char, multispace0, one_of};
use nom::combinator::{all_consuming, cut, map, map_res, opt};
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::IResult;
use regex::{Regex, RegexBuilder};

use crate::email::Email;
use crate::mailbox::Mailbox;
use crate::support::error::Error;

#[derive(Clone)]
pub enum Pattern {
    All,
    New,
    Old,
    Unread,
    Read,
    Flagged,
    Deleted,
    Tagged,
    Replied,
    /// A second copy of a message id.
    Duplicated,
    Subject(Regex),
    From(Regex),
    /// `To` or `Cc`.
    To(Regex),
    Id(Regex),
    Label(Regex),
    Tags(Regex),
    References(Regex),
    Not(Box<Pattern>),
    And(Vec<Pattern>),
    Or(Vec<Pattern>),
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Pattern::All => write!(f, "~A"),
            Pattern::New => write!(f, "~N"),
            Pattern::Old => write!(f, "~O"),
            Pattern::Unread => write!(f, "~U"),
            Pattern::Read => write!(f, "~R"),
            Pattern::Flagged => write!(f, "~F"),
            Pattern::Deleted => write!(f, "~D"),
            Pattern::Tagged => write!(f, "~T"),
            Pattern::Replied => write!(f, "~Q"),
            Pattern::Duplicated => write!(f, "~="),
            Pattern::Subject(ref r) => write!(f, "~s {:?}", r.as_str()),
            Pattern::From(ref r) => write!(f, "~f {:?}", r.as_str()),
            Pattern::To(ref r) => write!(f, "~t {:?}", r.as_str()),
            Pattern::Id(ref r) => write!(f, "~i {:?}", r.as_str()),
            Pattern::Label(ref r) => write!(f, "~y {:?}", r.as_str()),
            Pattern::Tags(ref r) => write!(f, "~Y {:?}", r.as_str()),
            Pattern::References(ref r) => write!(f, "~x {:?}", r.as_str()),
            Pattern::Not(ref p) => write!(f, "!{:?}", p),
            Pattern::And(ref ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:?}", p)?;
                }
                write!(f, ")")
            }
            Pattern::Or(ref ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{:?}", p)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Pattern {
    /// Compile `text`, expanding it through `simple_search` if it has no
    /// pattern operators.
    pub fn compile(text: &str, simple_search: &str) -> Result<Self, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidValue("Empty pattern".to_owned()));
        }

        if text.contains('~') {
            parse(text)
        } else {
            let quoted = format!("\"{}\"", text.replace('"', ""));
            parse(&simple_search.replace("%s", &quoted))
        }
    }

    /// Whether the pattern selects every message, as `~A`, `.` and `all`
    /// do.
    pub fn is_all(text: &str) -> bool {
        matches!(text.trim(), "" | "~A" | "." | "all")
    }

    pub fn matches(&self, m: &Mailbox, e: &Email) -> bool {
        match *self {
            Pattern::All => true,
            Pattern::New => e.is_new(),
            Pattern::Old => e.old && !e.read,
            Pattern::Unread => !e.read,
            Pattern::Read => e.read,
            Pattern::Flagged => e.flagged,
            Pattern::Deleted => e.deleted,
            Pattern::Tagged => e.tagged,
            Pattern::Replied => e.replied,
            Pattern::Duplicated => {
                !e.id.is_empty() && m.by_id(&e.id) != Some(e.index)
            }
            Pattern::Subject(ref r) => {
                r.is_match(e.env.subject.as_deref().unwrap_or(""))
            }
            Pattern::From(ref r) => e
                .env
                .from
                .iter()
                .flat_map(|l| l.iter())
                .any(|a| r.is_match(&a.to_string())),
            Pattern::To(ref r) => e
                .env
                .to
                .iter()
                .chain(e.env.cc.iter())
                .flat_map(|l| l.iter())
                .any(|a| r.is_match(&a.to_string())),
            Pattern::Id(ref r) => r.is_match(&e.id),
            Pattern::Label(ref r) => {
                r.is_match(e.env.x_label.as_deref().unwrap_or(""))
            }
            Pattern::Tags(ref r) => e.tags.iter().any(|t| r.is_match(t)),
            Pattern::References(ref r) => e
                .env
                .references
                .iter()
                .chain(e.env.in_reply_to.iter())
                .any(|id| r.is_match(id)),
            Pattern::Not(ref p) => !p.matches(m, e),
            Pattern::And(ref ps) => ps.iter().all(|p| p.matches(m, e)),
            Pattern::Or(ref ps) => ps.iter().any(|p| p.matches(m, e)),
        }
    }
}

fn parse(s: &str) -> Result<Pattern, Error> {
    match all_consuming(delimited(multispace0, or_expr, multispace0))(s) {
        Ok((_, p)) => Ok(p),
        Err(_) => Err(Error::InvalidValue(format!("Bad pattern: {}", s))),
    }
}

fn compile_regex(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .case_insensitive(!source.chars().any(char::is_uppercase))
        .build()
}

fn bare(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && ')' != c && '|' != c)(i)
}

fn quoted(i: &str) -> IResult<&str, &str> {
    alt((
        delimited(
            char('"'),
            map(opt(is_not("\"")), |s| s.unwrap_or("")),
            char('"'),
        ),
        delimited(
            char('\''),
            map(opt(is_not("'")), |s| s.unwrap_or("")),
            char('\''),
        ),
    ))(i)
}

fn regex_value(i: &str) -> IResult<&str, Regex> {
    map_res(preceded(multispace0, alt((quoted, bare))), compile_regex)(i)
}

fn field(i: &str) -> IResult<&str, Pattern> {
    let (i, which) = one_of("sftiyYx")(i)?;
    let (i, re) = cut(regex_value)(i)?;
    let p = match which {
        's' => Pattern::Subject(re),
        'f' => Pattern::From(re),
        't' => Pattern::To(re),
        'i' => Pattern::Id(re),
        'y' => Pattern::Label(re),
        'Y' => Pattern::Tags(re),
        _ => Pattern::References(re),
    };
    Ok((i, p))
}

fn flag(i: &str) -> IResult<&str, Pattern> {
    map_res(anychar, |c| {
        Ok(match c {
            'A' => Pattern::All,
            'N' => Pattern::New,
            'O' => Pattern::Old,
            'U' => Pattern::Unread,
            'R' => Pattern::Read,
            'F' => Pattern::Flagged,
            'D' => Pattern::Deleted,
            'T' => Pattern::Tagged,
            'Q' => Pattern::Replied,
            '=' => Pattern::Duplicated,
            _ => return Err(()),
        })
    })(i)
}

fn unary(i: &str) -> IResult<&str, Pattern> {
    alt((
        map(preceded(char('!'), unary), |p| Pattern::Not(Box::new(p))),
        delimited(
            char('('),
            delimited(multispace0, or_expr, multispace0),
            char(')'),
        ),
        preceded(char('~'), cut(alt((field, flag)))),
    ))(i)
}

fn and_expr(i: &str) -> IResult<&str, Pattern> {
    let (i, first) = unary(i)?;
    let (i, rest) = many0(preceded(multispace0, unary))(i)?;
    Ok((i, combine(first, rest, Pattern::And)))
}

fn or_expr(i: &str) -> IResult<&str, Pattern> {
    let (i, first) = and_expr(i)?;
    let (i, rest) = many0(preceded(
        delimited(multispace0, char('|'), multispace0),
        and_expr,
    ))(i)?;
    Ok((i, combine(first, rest, Pattern::Or)))
}

fn combine(
    first: Pattern,
    rest: Vec<Pattern>,
    ctor: fn(Vec<Pattern>) -> Pattern,
) -> Pattern {
    if rest.is_empty() {
        first
    } else {
        let mut all = Vec::with_capacity(rest.len() + 1);
        all.push(first);
        all.extend(rest);
        ctor(all)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::address::AddressList;
    use crate::mailbox::test_support::mailbox;

    const SIMPLE: &str = "~f %s | ~s %s";

    fn check(text: &str, m: &Mailbox) -> Vec<usize> {
        let p = Pattern::compile(text, SIMPLE).unwrap();
        m.emails
            .iter()
            .filter(|e| p.matches(m, e))
            .map(|e| e.index)
            .collect()
    }

    fn sample() -> Mailbox {
        let mut m = mailbox(4);
        m.emails[0].env.subject = Some("Quarterly report".to_owned());
        m.emails[0].env.from = AddressList::parse("Alice <alice@example.com>");
        m.emails[1].env.subject = Some("lunch?".to_owned());
        m.emails[1].env.from = AddressList::parse("bob@example.com");
        m.emails[1].env.to = AddressList::parse("alice@example.com");
        m.emails[1].read = true;
        m.emails[2].old = true;
        m.emails[2].flagged = true;
        m.emails[2].tags = crate::email::tags::TagList::parse("work urgent");
        m.emails[2].env.references = vec!["0@test".to_owned()];
        m.emails[3].deleted = true;
        m.emails[3].replied = true;
        m.emails[3].tagged = true;
        m.emails[3].env.x_label = Some("todo".to_owned());
        m
    }

    #[test]
    fn flags() {
        let m = sample();
        assert_eq!(vec![0, 1, 2, 3], check("~A", &m));
        assert_eq!(vec![0, 3], check("~N", &m));
        assert_eq!(vec![2], check("~O", &m));
        assert_eq!(vec![0, 2, 3], check("~U", &m));
        assert_eq!(vec![1], check("~R", &m));
        assert_eq!(vec![2], check("~F", &m));
        assert_eq!(vec![3], check("~D", &m));
        assert_eq!(vec![3], check("~T", &m));
        assert_eq!(vec![3], check("~Q", &m));
        assert!(check("~=", &m).is_empty());
    }

    #[test]
    fn fields() {
        let m = sample();
        assert_eq!(vec![0], check("~s report", &m));
        assert_eq!(vec![0], check("~s 'quarterly report'", &m));
        assert!(check("~s Report", &m).is_empty());
        assert_eq!(vec![0], check("~f alice", &m));
        assert_eq!(vec![1], check("~t alice", &m));
        assert_eq!(vec![1], check("~i ^1@", &m));
        assert_eq!(vec![3], check("~y todo", &m));
        assert_eq!(vec![2], check("~Y ^urgent$", &m));
        assert_eq!(vec![2], check("~x 0@test", &m));
    }

    #[test]
    fn operators() {
        let m = sample();
        assert_eq!(vec![2], check("~U ~F", &m));
        assert_eq!(vec![1, 2], check("~R | ~F", &m));
        assert_eq!(vec![1], check("!~U", &m));
        assert_eq!(vec![0, 1], check("!(~F | ~D)", &m));
        assert_eq!(vec![0, 2], check("~U !(~D)", &m));
    }

    #[test]
    fn simple_search_expansion() {
        let m = sample();
        assert_eq!(vec![0], check("alice", &m));
        assert_eq!(vec![1], check("lunch", &m));
        assert_eq!(vec![0], check("quarterly report", &m));
    }

    #[test]
    fn duplicates() {
        let mut m = mailbox(3);
        m.emails[2].id = "0@test".to_owned();
        m.rehash();
        assert_eq!(vec![2], check("~=", &m));
    }

    #[test]
    fn bad_patterns() {
        for bad in &["~", "~Z", "~s", "(~A", "~s (", "~A |", "!~", "~A !"] {
            assert_matches!(
                Err(Error::InvalidValue(_)),
                Pattern::compile(bad, SIMPLE)
            );
        }
        // No pattern syntax, so a simple search for the text
        assert!(Pattern::compile("!", SIMPLE).is_ok());
        assert!(Pattern::is_all("."));
        assert!(Pattern::is_all(" ~A "));
        assert!(!Pattern::is_all("~N"));
    }
}
