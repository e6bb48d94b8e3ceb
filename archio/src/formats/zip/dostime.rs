//! MS-DOS date/time fields: two-second resolution, years 1980 to 2107.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

const MIN_YEAR: i32 = 1980;
const MAX_YEAR: i32 = 2107;

/// `(time, date)` for `t`, clamped to the representable range.
pub(crate) fn to_dos(t: DateTime<Utc>) -> (u16, u16) {
    if t.year() < MIN_YEAR {
        return (0, (1 << 5) | 1);
    }
    if t.year() > MAX_YEAR {
        return (
            (23 << 11) | (59 << 5) | (58 / 2),
            (((MAX_YEAR - MIN_YEAR) as u16) << 9) | (12 << 5) | 31,
        );
    }

    let time = ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | (t.second() as u16 / 2);
    let date =
        (((t.year() - MIN_YEAR) as u16) << 9) | ((t.month() as u16) << 5) | t.day() as u16;
    (time, date)
}

/// The instant a DOS `(time, date)` pair denotes, if it is a valid one.
pub(crate) fn from_dos(time: u16, date: u16) -> Option<DateTime<Utc>> {
    let year = MIN_YEAR + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0f) as u32;
    let day = (date & 0x1f) as u32;
    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3f) as u32;
    let second = ((time & 0x1f) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn even_seconds_survive() {
        let t = utc(2021, 6, 15, 13, 45, 30);
        let (time, date) = to_dos(t);
        assert_eq!(from_dos(time, date), Some(t));
    }

    #[test]
    fn odd_seconds_round_down() {
        let (time, date) = to_dos(utc(2000, 1, 1, 0, 0, 59));
        assert_eq!(from_dos(time, date), Some(utc(2000, 1, 1, 0, 0, 58)));
    }

    #[test]
    fn out_of_range_years_are_clamped() {
        let (time, date) = to_dos(DateTime::<Utc>::from_timestamp(0, 0).unwrap());
        assert_eq!(from_dos(time, date), Some(utc(1980, 1, 1, 0, 0, 0)));

        let (time, date) = to_dos(utc(2200, 3, 3, 3, 3, 3));
        assert_eq!(from_dos(time, date), Some(utc(2107, 12, 31, 23, 59, 58)));
    }

    #[test]
    fn invalid_fields() {
        assert_eq!(from_dos(0, 0), None);
    }
}
