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

//! Helpers for Chrono's offset and construction APIs, which are fallible
//! everywhere even where the inputs have already been range-checked by the
//! date grammar.

use chrono::prelude::*;

pub trait FixedOffsetX: Sized {
    /// Converts a zone written as `±HHMM` (as an integer, e.g. `-0430` is
    /// `-430`) into an offset.
    ///
    /// Returns `None` if the minutes are out of range or the offset is a day
    /// or more.
    fn from_hhmm(hhmm: i32) -> Option<Self>;
    fn utc() -> Self;
}

impl FixedOffsetX for FixedOffset {
    fn from_hhmm(hhmm: i32) -> Option<Self> {
        let sign = if hhmm < 0 { -1 } else { 1 };
        let abs = hhmm.checked_abs()?;
        let (hours, minutes) = (abs / 100, abs % 100);
        if hours >= 24 || minutes >= 60 {
            return None;
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }

    fn utc() -> Self {
        // 0 is always in range
        FixedOffset::east_opt(0).unwrap()
    }
}

/// Builds a `DateTime` from components, returning `None` for anything that
/// doesn't name a real instant.
pub fn ymd_hms(
    offset: FixedOffset,
    (year, month, day): (i32, u32, u32),
    (hour, minute, second): (u32, u32, u32),
) -> Option<DateTime<FixedOffset>> {
    offset
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hhmm_conversion() {
        assert_eq!(
            FixedOffset::east_opt(-(4 * 3600 + 30 * 60)),
            FixedOffset::from_hhmm(-430)
        );
        assert_eq!(FixedOffset::east_opt(3600), FixedOffset::from_hhmm(100));
        assert_eq!(None, FixedOffset::from_hhmm(199));
        assert_eq!(None, FixedOffset::from_hhmm(9900));
        assert_eq!(None, FixedOffset::from_hhmm(2400));
        assert_eq!(None, FixedOffset::from_hhmm(i32::MAX));
        assert_eq!(None, FixedOffset::from_hhmm(i32::MIN));
        assert_eq!(
            FixedOffset::east_opt(-(23 * 3600 + 59 * 60)),
            FixedOffset::from_hhmm(-2359)
        );
    }

    #[test]
    fn ymd_hms_rejects_nonsense() {
        let utc = FixedOffset::utc();
        assert!(ymd_hms(utc, (2020, 2, 30), (0, 0, 0)).is_none());
        assert!(ymd_hms(utc, (2020, 2, 29), (0, 0, 0)).is_some());
    }
}
