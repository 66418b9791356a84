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

//! Just enough RFC 5322 to fill in an `Envelope`.
//!
//! Headers are unfolded and matched by name; nothing is MIME-decoded. The
//! structured fields needed for threading and sorting (dates and message
//! ids) are parsed with `nom`.

use chrono::prelude::*;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag_no_case, take_while_m_n};
use nom::character::complete::{char, multispace0, space0};
use nom::combinator::{map, opt};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use super::envelope::Envelope;
use crate::config::address::AddressList;

/// The largest header block that will be examined.
const MAX_HEADER_BYTES: usize = 256 * 1024;

/// Split the header block of `data` into unfolded `(name, value)` pairs.
///
/// Returns the pairs and the offset at which the body starts.
pub fn split_headers(data: &[u8]) -> (Vec<(String, String)>, usize) {
    let mut headers: Vec<(String, String)> = Vec::new();
    let limit = data.len().min(MAX_HEADER_BYTES);
    let mut pos = 0;

    while pos < limit {
        let end = data[pos..limit]
            .iter()
            .position(|&b| b'\n' == b)
            .map_or(limit, |p| pos + p);
        let next = (end + 1).min(data.len());
        let mut line = &data[pos..end];
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }

        if line.is_empty() {
            return (headers, next);
        }

        let text = String::from_utf8_lossy(line);
        if line[0] == b' ' || line[0] == b'\t' {
            if let Some(last) = headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(text.trim());
            }
        } else if let Some(colon) = text.find(':') {
            headers.push((
                text[..colon].trim().to_owned(),
                text[colon + 1..].trim().to_owned(),
            ));
        }

        pos = next;
    }

    (headers, data.len())
}

/// Build an envelope from raw message bytes.
///
/// Returns the envelope and the number of body lines.
pub fn parse_envelope(data: &[u8]) -> (Envelope, u32) {
    let (headers, body_start) = split_headers(data);
    let mut env = Envelope::default();

    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        match &name[..] {
            "from" => env.from = AddressList::parse(&value),
            "to" => env.to = AddressList::parse(&value),
            "cc" => env.cc = AddressList::parse(&value),
            "bcc" => env.bcc = AddressList::parse(&value),
            "reply-to" => env.reply_to = AddressList::parse(&value),
            "subject" => env.subject = Some(value),
            "message-id" => {
                env.message_id = parse_msgid_list(&value).into_iter().next()
            }
            "references" => env.references = parse_msgid_list(&value),
            "in-reply-to" => env.in_reply_to = parse_msgid_list(&value),
            "date" => env.date = parse_date(&value),
            "x-label" => env.x_label = Some(value),
            "newsgroups" => env.newsgroups = Some(value),
            "organization" | "organisation" => env.organization = Some(value),
            "x-spam-status" | "x-spam-score" => env.spam = Some(value),
            _ => (),
        }
    }

    let body = &data[body_start.min(data.len())..];
    let lines = bytecount_lines(body);
    (env, lines)
}

fn bytecount_lines(body: &[u8]) -> u32 {
    let newlines = body.iter().filter(|&&b| b'\n' == b).count();
    let unterminated = !body.is_empty() && !body.ends_with(b"\n");
    (newlines + unterminated as usize) as u32
}

fn msg_id(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(
        opt(is_not("<")),
        delimited(char('<'), is_not(">"), char('>')),
    )(i)
}

/// Extract every `<id>` from a `Message-ID`, `References` or `In-Reply-To`
/// value, without the brackets.
pub fn parse_msgid_list(value: &str) -> Vec<String> {
    match many0(msg_id)(value.as_bytes()) {
        Ok((_, ids)) => ids
            .into_iter()
            .map(|id| String::from_utf8_lossy(id).trim().to_owned())
            .filter(|id| !id.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn digits(min: usize, max: usize) -> impl Fn(&[u8]) -> IResult<&[u8], u32> {
    move |i| {
        map(
            take_while_m_n(min, max, |b: u8| b.is_ascii_digit()),
            |s: &[u8]| {
                s.iter()
                    .fold(0u32, |acc, &d| acc * 10 + u32::from(d - b'0'))
            },
        )(i)
    }
}

fn month(i: &[u8]) -> IResult<&[u8], u32> {
    alt((
        map(tag_no_case("jan"), |_| 1),
        map(tag_no_case("feb"), |_| 2),
        map(tag_no_case("mar"), |_| 3),
        map(tag_no_case("apr"), |_| 4),
        map(tag_no_case("may"), |_| 5),
        map(tag_no_case("jun"), |_| 6),
        map(tag_no_case("jul"), |_| 7),
        map(tag_no_case("aug"), |_| 8),
        map(tag_no_case("sep"), |_| 9),
        map(tag_no_case("oct"), |_| 10),
        map(tag_no_case("nov"), |_| 11),
        map(tag_no_case("dec"), |_| 12),
    ))(i)
}

fn year(i: &[u8]) -> IResult<&[u8], i32> {
    map(
        take_while_m_n(2, 4, |b: u8| b.is_ascii_digit()),
        |s: &[u8]| {
            let y = s
                .iter()
                .fold(0i32, |acc, &d| acc * 10 + i32::from(d - b'0'));
            // Two- and three-digit years per RFC 5322 4.3
            match s.len() {
                2 if y < 50 => y + 2000,
                2 | 3 => y + 1900,
                _ => y,
            }
        },
    )(i)
}

/// Zone offset in seconds east of UTC.
fn zone(i: &[u8]) -> IResult<&[u8], i32> {
    alt((
        map(
            pair(alt((char('+'), char('-'))), digits(4, 4)),
            |(sign, hhmm)| {
                let secs = (hhmm / 100 * 3600 + hhmm % 100 * 60) as i32;
                if '-' == sign {
                    -secs
                } else {
                    secs
                }
            },
        ),
        map(alt((tag_no_case("ut"), tag_no_case("gmt"))), |_| 0),
        map(tag_no_case("edt"), |_| -4 * 3600),
        map(alt((tag_no_case("est"), tag_no_case("cdt"))), |_| -5 * 3600),
        map(alt((tag_no_case("cst"), tag_no_case("mdt"))), |_| -6 * 3600),
        map(alt((tag_no_case("mst"), tag_no_case("pdt"))), |_| -7 * 3600),
        map(tag_no_case("pst"), |_| -8 * 3600),
        // Military and unknown zones count as UTC
        map(is_not(" \t\r\n()"), |_| 0),
    ))(i)
}

fn date_time(i: &[u8]) -> IResult<&[u8], Option<DateTime<FixedOffset>>> {
    map(
        tuple((
            // Day of week is optional and ignored
            opt(tuple((is_not(",0123456789"), char(','), multispace0))),
            terminated(digits(1, 2), multispace0),
            terminated(month, multispace0),
            terminated(year, multispace0),
            terminated(digits(2, 2), tuple((space0, char(':'), space0))),
            digits(2, 2),
            opt(preceded(tuple((space0, char(':'), space0)), digits(2, 2))),
            preceded(multispace0, opt(zone)),
        )),
        |(_, day, month, year, hour, minute, second, zone)| {
            FixedOffset::east_opt(zone.unwrap_or(0))
                .and_then(|off| {
                    off.with_ymd_and_hms(
                        year,
                        month,
                        day,
                        hour,
                        minute,
                        second.unwrap_or(0),
                    )
                    .single()
                })
        },
    )(i)
}

/// Parse an RFC 5322 date, tolerating the common deviations.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    date_time(value.trim().as_bytes())
        .ok()
        .and_then(|(_, dt)| dt)
}
