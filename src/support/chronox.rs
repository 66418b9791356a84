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

//! Helper traits which restore non-deprecated panicking methods (with 'x'
//! appended to disambiguate), plus calendar arithmetic in the units used by
//! relative date queries.

use chrono::prelude::*;
use chrono::{Duration, Months};

/// The calendar units accepted in relative dates such as `3month`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timebase {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Timebase {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Timebase::Hour),
            "day" => Some(Timebase::Day),
            "week" => Some(Timebase::Week),
            "month" => Some(Timebase::Month),
            "year" => Some(Timebase::Year),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Timebase::Hour => "hour",
            Timebase::Day => "day",
            Timebase::Week => "week",
            Timebase::Month => "month",
            Timebase::Year => "year",
        }
    }
}

pub trait NaiveDateX {
    fn from_ymdx(y: i32, m: u32, d: u32) -> Self;
    fn and_hmsx_utc(&self, h: u32, m: u32, s: u32) -> DateTime<Utc>;
}

impl NaiveDateX for NaiveDate {
    fn from_ymdx(y: i32, m: u32, d: u32) -> Self {
        Self::from_ymd_opt(y, m, d).unwrap()
    }

    fn and_hmsx_utc(&self, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        self.and_hms_opt(h, m, s).unwrap().and_utc()
    }
}

pub trait DateTimeX: Sized {
    /// Step back `n` units of `timebase`, saturating at the earliest
    /// representable instant.
    fn minus_units(&self, n: u32, timebase: Timebase) -> Self;
}

impl DateTimeX for DateTime<Utc> {
    fn minus_units(&self, n: u32, timebase: Timebase) -> Self {
        let stepped = match timebase {
            Timebase::Hour => {
                self.checked_sub_signed(Duration::hours(i64::from(n)))
            }
            Timebase::Day => {
                self.checked_sub_signed(Duration::days(i64::from(n)))
            }
            Timebase::Week => {
                self.checked_sub_signed(Duration::weeks(i64::from(n)))
            }
            Timebase::Month => self.checked_sub_months(Months::new(n)),
            Timebase::Year => {
                n.checked_mul(12).and_then(|months| {
                    self.checked_sub_months(Months::new(months))
                })
            }
        };

        stepped.unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
    }
}
