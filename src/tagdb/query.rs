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

//! The search language of the tag database.
//!
//! ```text
//! query  = or
//! or     = and ("or" and)*
//! and    = unary (["and"] unary)*
//! unary  = ("not" | "-") unary | "(" query ")" | "*" | term
//! term   = field ":" value | value
//! field  = tag | id | from | subject | thread | folder | date
//! ```
//!
//! Keywords are case-insensitive. Values may be double-quoted to include
//! spaces. A date value is `<since>..<until>` where either side may be
//! empty, and each point is `now`, `YYYY-MM-DD` or `<N><unit>` meaning N
//! units ago, rounded down to the start of that unit. A relative point that
//! ends a range is exclusive, so consecutive windows such as
//! `date:2month..1month` and `date:1month..` tile without overlapping. A
//! single point without `..` covers its whole unit or day.

use chrono::prelude::*;
use chrono::{Duration, Months};
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case, take_while1};
use nom::character::complete::{char, digit1, multispace0};
use nom::combinator::{all_consuming, cut, map, map_res, opt, verify};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::IResult;

use super::store::StoredMessage;
use crate::support::chronox::{DateTimeX, Timebase};
use crate::support::error::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    All,
    Tag(String),
    Id(String),
    From(String),
    Subject(String),
    Thread(String),
    Folder(String),
    Date(Option<DatePoint>, Option<DatePoint>),
    /// The whole unit or day named by a single date point.
    DateWithin(DatePoint),
    /// Text found in the subject or sender.
    Word(String),
    Not(Box<Query>),
    And(Vec<Query>),
    Or(Vec<Query>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePoint {
    Now,
    Day(NaiveDate),
    Ago(u32, Timebase),
}

impl DatePoint {
    /// The first instant this point covers.
    fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DatePoint::Now => now,
            DatePoint::Day(day) => day_start(day).unwrap_or(now),
            DatePoint::Ago(n, unit) => unit_start(now.minus_units(n, unit), unit),
        }
    }

    /// The first instant after this point, when it ends a range.
    ///
    /// Relative points end where their unit starts, so that adjacent
    /// windows do not overlap; days and `now` are inclusive.
    fn range_end(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DatePoint::Now => now + Duration::seconds(1),
            DatePoint::Day(_) => self.unit_end(now),
            DatePoint::Ago(..) => self.start(now),
        }
    }

    /// The first instant after the whole unit or day this point is in.
    fn unit_end(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.start(now);
        let next = match self {
            DatePoint::Now => start.checked_add_signed(Duration::seconds(1)),
            DatePoint::Day(_) => start.checked_add_signed(Duration::days(1)),
            DatePoint::Ago(_, unit) => next_unit(start, unit),
        };
        next.unwrap_or(start)
    }
}

fn day_start(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0).map(|t| Utc.from_utc_datetime(&t))
}

fn unit_start(t: DateTime<Utc>, unit: Timebase) -> DateTime<Utc> {
    let date = t.date_naive();
    let start = match unit {
        Timebase::Hour => date.and_hms_opt(t.hour(), 0, 0),
        Timebase::Day | Timebase::Week => date.and_hms_opt(0, 0, 0),
        Timebase::Month => {
            date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        Timebase::Year => {
            date.with_ordinal(1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    };
    start.map_or(t, |s| Utc.from_utc_datetime(&s))
}

fn next_unit(t: DateTime<Utc>, unit: Timebase) -> Option<DateTime<Utc>> {
    match unit {
        Timebase::Hour => t.checked_add_signed(Duration::hours(1)),
        Timebase::Day | Timebase::Week => {
            t.checked_add_signed(Duration::days(1))
        }
        Timebase::Month => t.checked_add_months(Months::new(1)),
        Timebase::Year => t.checked_add_months(Months::new(12)),
    }
}

impl Query {
    pub fn matches(&self, msg: &StoredMessage, now: DateTime<Utc>) -> bool {
        match *self {
            Query::All => true,
            Query::Tag(ref t) => msg.tags.contains(t),
            Query::Id(ref id) => msg.id == *id,
            Query::From(ref s) => contains_ci(&msg.from, s),
            Query::Subject(ref s) => contains_ci(&msg.subject, s),
            Query::Thread(ref t) => msg.thread == *t,
            Query::Folder(ref f) => msg.folders().any(|mf| mf == f),
            Query::Date(since, until) => {
                since.map_or(true, |p| msg.date >= p.start(now).timestamp())
                    && until.map_or(true, |p| {
                        msg.date < p.range_end(now).timestamp()
                    })
            }
            Query::DateWithin(p) => {
                msg.date >= p.start(now).timestamp()
                    && msg.date < p.unit_end(now).timestamp()
            }
            Query::Word(ref w) => {
                contains_ci(&msg.subject, w) || contains_ci(&msg.from, w)
            }
            Query::Not(ref q) => !q.matches(msg, now),
            Query::And(ref qs) => qs.iter().all(|q| q.matches(msg, now)),
            Query::Or(ref qs) => qs.iter().any(|q| q.matches(msg, now)),
        }
    }

    /// Whether the query names `tag` anywhere, even negated.
    pub fn mentions_tag(&self, tag: &str) -> bool {
        match *self {
            Query::Tag(ref t) => t == tag,
            Query::Not(ref q) => q.mentions_tag(tag),
            Query::And(ref qs) | Query::Or(ref qs) => {
                qs.iter().any(|q| q.mentions_tag(tag))
            }
            _ => false,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Parse a query string. The empty query matches everything.
pub fn parse(s: &str) -> Result<Query, Error> {
    if s.trim().is_empty() {
        return Ok(Query::All);
    }

    match all_consuming(delimited(multispace0, or_expr, multispace0))(s) {
        Ok((_, q)) => Ok(q),
        Err(_) => Err(Error::InvalidValue(format!("Bad query: {}", s))),
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && '(' != c && ')' != c && '"' != c
}

fn bare(i: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(i)
}

fn is_keyword(w: &str) -> bool {
    ["and", "or", "not"]
        .iter()
        .any(|k| w.eq_ignore_ascii_case(k))
}

fn keyword<'a>(
    kw: &'static str,
) -> impl Fn(&'a str) -> IResult<&'a str, &'a str> {
    move |i: &'a str| verify(bare, |w: &str| w.eq_ignore_ascii_case(kw))(i)
}

fn quoted(i: &str) -> IResult<&str, &str> {
    delimited(char('"'), map(opt(is_not("\"")), |s| s.unwrap_or("")), char('"'))(
        i,
    )
}

fn value(i: &str) -> IResult<&str, &str> {
    alt((quoted, bare))(i)
}

fn unit(i: &str) -> IResult<&str, Timebase> {
    alt((
        map(
            alt((tag("hours"), tag("hour"), tag("h"))),
            |_| Timebase::Hour,
        ),
        map(alt((tag("days"), tag("day"), tag("d"))), |_| Timebase::Day),
        map(alt((tag("weeks"), tag("week"), tag("w"))), |_| Timebase::Week),
        map(
            alt((tag("months"), tag("month"), tag("M"))),
            |_| Timebase::Month,
        ),
        map(alt((tag("years"), tag("year"), tag("y"))), |_| Timebase::Year),
    ))(i)
}

fn date_point(i: &str) -> IResult<&str, DatePoint> {
    alt((
        map(tag_no_case("now"), |_| DatePoint::Now),
        map_res(
            verify(take_while1(|c: char| c.is_ascii_digit() || '-' == c), |s: &str| {
                s.contains('-')
            }),
            |s: &str| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map(DatePoint::Day)
            },
        ),
        map(
            pair(map_res(digit1, |d: &str| d.parse::<u32>()), unit),
            |(n, u)| DatePoint::Ago(n, u),
        ),
    ))(i)
}

fn date_range(i: &str) -> IResult<&str, Query> {
    alt((
        map(
            separated_pair(opt(date_point), tag(".."), opt(date_point)),
            |(since, until)| Query::Date(since, until),
        ),
        map(date_point, Query::DateWithin),
    ))(i)
}

fn date_value(i: &str) -> IResult<&str, Query> {
    map_res(value, |v: &str| {
        all_consuming(date_range)(v)
            .map(|(_, q)| q)
            .map_err(|_| ())
    })(i)
}

fn field(i: &str) -> IResult<&str, Query> {
    alt((
        preceded(tag_no_case("date:"), cut(date_value)),
        map(preceded(tag_no_case("tag:"), value), |v| {
            Query::Tag(v.to_owned())
        }),
        map(preceded(tag_no_case("id:"), value), |v| {
            Query::Id(v.trim_start_matches('<').trim_end_matches('>').to_owned())
        }),
        map(preceded(tag_no_case("from:"), value), |v| {
            Query::From(v.to_owned())
        }),
        map(preceded(tag_no_case("subject:"), value), |v| {
            Query::Subject(v.to_owned())
        }),
        map(preceded(tag_no_case("thread:"), value), |v| {
            Query::Thread(v.to_owned())
        }),
        map(preceded(tag_no_case("folder:"), value), |v| {
            Query::Folder(v.trim_end_matches('/').to_owned())
        }),
    ))(i)
}

fn term(i: &str) -> IResult<&str, Query> {
    alt((
        field,
        map(char('*'), |_| Query::All),
        map(quoted, |w| Query::Word(w.to_owned())),
        map(verify(bare, |w: &str| !is_keyword(w)), |w| {
            Query::Word(w.to_owned())
        }),
    ))(i)
}

fn unary(i: &str) -> IResult<&str, Query> {
    alt((
        map(
            preceded(alt((terminated(keyword("not"), multispace0), tag("-"))), unary),
            |q| Query::Not(Box::new(q)),
        ),
        delimited(
            terminated(char('('), multispace0),
            or_expr,
            preceded(multispace0, char(')')),
        ),
        term,
    ))(i)
}

fn and_expr(i: &str) -> IResult<&str, Query> {
    let (i, first) = unary(i)?;
    let (i, rest) = many0(preceded(
        pair(multispace0, opt(terminated(keyword("and"), multispace0))),
        unary,
    ))(i)?;
    Ok((i, combine(first, rest, Query::And)))
}

fn or_expr(i: &str) -> IResult<&str, Query> {
    let (i, first) = and_expr(i)?;
    let (i, rest) = many0(preceded(
        delimited(multispace0, keyword("or"), multispace0),
        and_expr,
    ))(i)?;
    Ok((i, combine(first, rest, Query::Or)))
}

fn combine(
    first: Query,
    rest: Vec<Query>,
    ctor: fn(Vec<Query>) -> Query,
) -> Query {
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
    use std::collections::BTreeSet;

    use super::*;
    use crate::support::chronox::NaiveDateX;

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymdx(2020, 6, 15).and_hmsx_utc(12, 30, 0)
    }

    fn msg(tags: &str, date: DateTime<Utc>) -> StoredMessage {
        StoredMessage {
            id: "m@x".to_owned(),
            files: vec!["inbox/cur/1:2,S".to_owned()],
            tags: tags
                .split_whitespace()
                .map(str::to_owned)
                .collect::<BTreeSet<_>>(),
            thread: "0000000000000001".to_owned(),
            from: "Jo Bloggs <jo@example.com>".to_owned(),
            subject: "Quarterly Report".to_owned(),
            date: date.timestamp(),
            ..StoredMessage::default()
        }
    }

    #[test]
    fn parse_structure() {
        assert_eq!(Query::All, parse("  ").unwrap());
        assert_eq!(Query::Tag("inbox".to_owned()), parse("tag:inbox").unwrap());
        assert_eq!(
            Query::And(vec![
                Query::Tag("inbox".to_owned()),
                Query::Not(Box::new(Query::Tag("spam".to_owned()))),
                Query::Word("report".to_owned()),
            ]),
            parse("tag:inbox and not tag:spam report").unwrap()
        );
        assert_eq!(
            Query::Or(vec![
                Query::And(vec![
                    Query::From("jo".to_owned()),
                    Query::Subject("quarterly report".to_owned()),
                ]),
                Query::Not(Box::new(Query::Id("a@b".to_owned()))),
            ]),
            parse("from:jo subject:\"quarterly report\" OR -id:<a@b>").unwrap()
        );
        assert_eq!(
            Query::And(vec![
                Query::Or(vec![
                    Query::Tag("a".to_owned()),
                    Query::Tag("b".to_owned()),
                ]),
                Query::Folder("lists/rust".to_owned()),
            ]),
            parse("( tag:a or tag:b ) folder:lists/rust/").unwrap()
        );
        assert!(parse("(tag:a").is_err());
        assert!(parse("date:yesterday").is_err());
        assert!(parse("and").is_err());
    }

    #[test]
    fn parse_dates() {
        assert_eq!(
            Query::Date(
                Some(DatePoint::Ago(4, Timebase::Month)),
                Some(DatePoint::Ago(3, Timebase::Month))
            ),
            parse("date:4month..3month").unwrap()
        );
        assert_eq!(
            Query::Date(Some(DatePoint::Ago(0, Timebase::Week)), None),
            parse("date:0weeks..").unwrap()
        );
        assert_eq!(
            Query::Date(
                Some(DatePoint::Day(NaiveDate::from_ymdx(2020, 1, 2))),
                Some(DatePoint::Now)
            ),
            parse("date:2020-01-02..now").unwrap()
        );
        assert_eq!(
            Query::And(vec![
                Query::Date(Some(DatePoint::Ago(1, Timebase::Month)), None),
                Query::Tag("inbox".to_owned()),
            ]),
            parse("date:1month.. and tag:inbox").unwrap()
        );
    }

    #[test]
    fn matching() {
        let m = msg("inbox unread", now() - Duration::days(2));
        let check = |q: &str| parse(q).unwrap().matches(&m, now());

        assert!(check("*"));
        assert!(check("tag:inbox"));
        assert!(!check("tag:inbox and tag:spam"));
        assert!(check("tag:spam or tag:unread"));
        assert!(check("report"));
        assert!(check("from:example.com"));
        assert!(!check("subject:jo"));
        assert!(check("folder:inbox"));
        assert!(check("thread:0000000000000001"));
        assert!(check("id:m@x"));
        assert!(check("not id:other@x"));
    }

    #[test]
    fn date_windows() {
        let check = |q: &str, when: DateTime<Utc>| {
            parse(q).unwrap().matches(&msg("", when), now())
        };

        // Two days ago is within this week and this month
        let recent = now() - Duration::days(2);
        assert!(check("date:0month..", recent));
        assert!(check("date:1week..", recent));
        assert!(!check("date:..1week", recent));

        // Last month, whole
        let may1 = NaiveDate::from_ymdx(2020, 5, 1).and_hmsx_utc(0, 0, 0);
        let may31 = NaiveDate::from_ymdx(2020, 5, 31).and_hmsx_utc(23, 59, 0);
        assert!(check("date:1month..0month", may1));
        assert!(check("date:1month..0month", may31));
        assert!(!check("date:1month..0month", recent));
        assert!(check("date:1month", may31));
        assert!(!check("date:1month", recent));

        // Window 4 months back, one month wide
        let feb = NaiveDate::from_ymdx(2020, 2, 20).and_hmsx_utc(0, 0, 0);
        let march = NaiveDate::from_ymdx(2020, 3, 10).and_hmsx_utc(0, 0, 0);
        assert!(check("date:4month..3month", feb));
        assert!(!check("date:4month..3month", march));
        assert!(check("date:3month..2month", march));

        assert!(check("date:2020-06-13", recent));
        assert!(!check("date:2020-06-14..", recent));
    }

    #[test]
    fn tag_mentions() {
        let q = parse("tag:inbox and not (tag:spam or from:x)").unwrap();
        assert!(q.mentions_tag("spam"));
        assert!(q.mentions_tag("inbox"));
        assert!(!q.mentions_tag("deleted"));
    }
}
