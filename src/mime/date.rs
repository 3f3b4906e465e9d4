//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mimetree.
//
// Mimetree is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mimetree is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mimetree. If not, see <http://www.gnu.org/licenses/>.


//! Liberal date parsing.

use chrono::prelude::*;

use super::syntax;
use crate::support::chronox::{self, FixedOffsetX};
use crate::support::error::Error;

/// Parses a date as found in a `Date` field or similar.
///
/// The strict RFC 5322 syntax is tried first, then a permissive token-based
/// parser that copes with most of the malformed dates seen in the wild, and
/// finally the `Mon Jan 02 15:04:05 2006 MST` format some agents produce.
pub fn parse_time(s: &str) -> Result<DateTime<FixedOffset>, Error> {
    syntax::parse_date_time(s.as_bytes())
        .or_else(|| permissive(s))
        .or_else(|| ctime(s))
        .ok_or_else(|| Error::TimeParse(s.to_owned()))
}

/// Formats `dt` the way it is written into a header.
pub fn format_time(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc2822()
}

enum State {
    Date,
    Month,
    Year,
    Hour,
    Minute,
    Second,
    Timezone,
}

fn month_number(name: &str) -> Option<u32> {
    Some(match name.to_ascii_uppercase().as_str() {
        "JAN" | "JANUARY" => 1,
        "FEB" | "FEBRUARY" => 2,
        "MAR" | "MARCH" => 3,
        "APR" | "APRIL" => 4,
        "MAY" => 5,
        "JUN" | "JUNE" => 6,
        "JUL" | "JULY" => 7,
        "AUG" | "AUGUST" => 8,
        "SEP" | "SEPT" | "SEPTEMBER" => 9,
        "OCT" | "OCTOBER" => 10,
        "NOV" | "NOVEMBER" => 11,
        "DEC" | "DECEMBER" => 12,
        _ => return None,
    })
}

fn zone_offset(tok: &str) -> Option<i32> {
    let first = tok.chars().next()?;
    if '+' == first || '-' == first {
        let n = tok[1..].parse::<i32>().ok()?;
        // Some agents write `+01` or `+1`, meaning hours
        let n = if tok.len() <= 3 { n * 100 } else { n };
        Some(if '-' == first { -n } else { n })
    } else if tok.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(syntax::named_zone(tok.as_bytes()))
    } else {
        None
    }
}

/// Parses `[day-name] day month year hour:minute[:second] [zone]`, tolerating
/// full month names, one-digit times, missing zones, and trailing junk.
fn permissive(date: &str) -> Option<DateTime<FixedOffset>> {
    let mut state = State::Date;
    let (mut year, mut month, mut day) = (0i32, 0u32, 0u32);
    let (mut hour, mut minute, mut second) = (0u32, 0u32, 0u32);
    let mut zone = 0i32;

    for tok in date.split(|c| ' ' == c || ',' == c || ':' == c || '\t' == c)
    {
        if tok.is_empty() {
            continue;
        }

        match state {
            State::Date => {
                // Anything before the day, like the day name, is ignored
                if let Ok(v) = tok.parse::<u32>() {
                    day = v;
                    state = State::Month;
                }
            },
            State::Month => {
                month = month_number(tok)?;
                state = State::Year;
            },
            State::Year => {
                year = match tok.parse::<i32>().ok()? {
                    v if v < 70 => 2000 + v,
                    v if v < 100 => 1900 + v,
                    v => v,
                };
                state = State::Hour;
            },
            State::Hour => {
                hour = tok.parse().ok()?;
                state = State::Minute;
            },
            State::Minute => {
                minute = tok.parse().ok()?;
                state = State::Second;
            },
            State::Second => {
                if tok.bytes().all(|b| b.is_ascii_digit()) {
                    second = tok.parse().ok()?;
                    state = State::Timezone;
                } else {
                    zone = zone_offset(tok).unwrap_or(0);
                    break;
                }
            },
            State::Timezone => {
                zone = zone_offset(tok).unwrap_or(0);
                break;
            },
        }
    }

    match state {
        State::Second | State::Timezone => (),
        _ => return None,
    }

    // An out-of-range zone is as good as an unknown one
    chronox::ymd_hms(
        FixedOffset::from_hhmm(zone).unwrap_or_else(FixedOffset::utc),
        (year, month, day),
        (hour, minute, second),
    )
}

/// Parses the C `ctime()` format with a trailing zone name.
fn ctime(date: &str) -> Option<DateTime<FixedOffset>> {
    let date = date.trim();
    let (rest, zone) = match date.rfind(' ') {
        Some(space)
            if date[space + 1..]
                .chars()
                .all(|c| c.is_ascii_alphabetic()) =>
        {
            (&date[..space], syntax::named_zone(date[space + 1..].as_bytes()))
        },
        _ => (date, 0),
    };

    let naive =
        NaiveDateTime::parse_from_str(rest.trim(), "%a %b %d %H:%M:%S %Y")
            .ok()?;
    FixedOffset::from_hhmm(zone)?
        .from_local_datetime(&naive)
        .single()
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn dt(
        zone: i32,
        (y, mo, d): (i32, u32, u32),
        (h, mi, s): (u32, u32, u32),
    ) -> DateTime<FixedOffset> {
        FixedOffset::from_hhmm(zone)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn strict_dates() {
        assert_eq!(
            dt(-400, (2016, 9, 25), (18, 36, 33)),
            parse_time("Sun, 25 Sep 2016 18:36:33 -0400").unwrap()
        );
    }

    #[test]
    fn permissive_dates() {
        assert_eq!(
            dt(-400, (2016, 9, 25), (18, 36, 33)),
            parse_time("Sun, 25 September 2016 18:36:33 -0400").unwrap()
        );
        assert_eq!(
            dt(0, (2016, 9, 25), (18, 36, 33)),
            parse_time("25 Sep 2016 18:36:33").unwrap()
        );
        assert_eq!(
            dt(100, (2020, 2, 6), (1, 2, 3)),
            parse_time("Thu, 6 Feb 2020 1:02:03 +0100").unwrap()
        );
        assert_eq!(
            dt(200, (2020, 2, 6), (1, 2, 0)),
            parse_time("6 Feb 20 01:02 +02").unwrap()
        );
        assert_eq!(
            dt(-500, (1998, 2, 6), (1, 2, 3)),
            parse_time("6 Feb 98 01:02:03 EST (Eastern)").unwrap()
        );
    }

    #[test]
    fn ctime_dates() {
        assert_eq!(
            dt(-700, (2006, 1, 2), (15, 4, 5)),
            parse_time("Mon Jan 02 15:04:05 2006 MST").unwrap()
        );
        assert_eq!(
            dt(0, (2006, 1, 2), (15, 4, 5)),
            parse_time("Mon Jan  2 15:04:05 2006").unwrap()
        );
    }

    #[test]
    fn garbage_dates() {
        assert_matches!(Err(Error::TimeParse(_)), parse_time(""));
        assert_matches!(Err(Error::TimeParse(_)), parse_time("yesterday"));
        assert_matches!(
            Err(Error::TimeParse(_)),
            parse_time("32 Jan 2020 00:00:00 +0000")
        );
    }

    #[test]
    fn out_of_range_zones() {
        let expected = dt(0, (2020, 2, 6), (1, 2, 3));
        for zone in &["+2147483647", "-2147483648", "-2147483647", "+9999"] {
            assert_eq!(
                expected,
                parse_time(&format!("6 Feb 2020 01:02:03 {}", zone)).unwrap()
            );
        }
        assert_eq!(
            expected,
            parse_time("Thu, 6 Feb 2020 01:02:03 +2400").unwrap()
        );
    }

    #[test]
    fn format_round_trips() {
        let t = dt(-430, (2003, 7, 25), (10, 52, 37));
        assert_eq!("Fri, 25 Jul 2003 10:52:37 -0430", format_time(&t));
        assert_eq!(t, parse_time(&format_time(&t)).unwrap());
    }

    proptest! {
        #[test]
        fn parse_time_never_panics(s in "[ -~]{0,48}") {
            let _ = parse_time(&s);
        }

        #[test]
        fn numeric_zones_never_panic(
            day in 0u32..40,
            year in -1i32..3000,
            hour in 0u32..30,
            zone in "[+-][0-9]{1,10}",
        ) {
            let _ = parse_time(
                &format!("{} Feb {} {}:02:03 {}", day, year, hour, zone));
            let _ = parse_time(
                &format!("Thu, {} Feb {} {}:02:03 {}", day, year, hour, zone));
        }
    }
}
