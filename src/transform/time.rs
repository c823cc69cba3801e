//! Timestamp decomposition

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};

use crate::models::TimeRecord;

/// Convert epoch milliseconds to a UTC timestamp
pub fn timestamp_from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Break epoch milliseconds into calendar fields, in UTC
///
/// Returns `None` when the timestamp is outside chrono's supported range.
pub fn decompose(millis: i64) -> Option<TimeRecord> {
    let start_time = timestamp_from_millis(millis)?;

    Some(TimeRecord {
        start_time,
        hour: start_time.hour() as i32,
        day: start_time.day() as i32,
        week: start_time.iso_week().week() as i32,
        month: start_time.month() as i32,
        year: start_time.year(),
        weekday: start_time.weekday().num_days_from_monday() as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    #[test]
    fn test_decompose_known_timestamp() {
        let record = decompose(1_541_121_934_796).unwrap();

        let expected = NaiveDate::from_ymd_opt(2018, 11, 2)
            .unwrap()
            .and_hms_milli_opt(1, 25, 34, 796)
            .unwrap();
        assert_eq!(record.start_time, expected);
        assert_eq!(record.hour, 1);
        assert_eq!(record.day, 2);
        assert_eq!(record.week, 44);
        assert_eq!(record.month, 11);
        assert_eq!(record.year, 2018);
        // Friday, counted from Monday = 0
        assert_eq!(record.weekday, 4);
    }

    #[test]
    fn test_decompose_keeps_milliseconds() {
        let record = decompose(1_541_121_934_796).unwrap();
        assert_eq!(record.start_time.and_utc().timestamp_subsec_millis(), 796);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2021-01-01 is a Friday that belongs to ISO week 53 of 2020.
        let millis = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        let record = decompose(millis).unwrap();
        assert_eq!(record.week, 53);
        assert_eq!(record.year, 2021);
        assert_eq!(record.weekday, Weekday::Fri.num_days_from_monday() as i32);
    }

    #[test]
    fn test_out_of_range() {
        assert!(decompose(i64::MAX).is_none());
    }
}
