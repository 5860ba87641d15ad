use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use thiserror::Error;

use crate::model::attendance::AttendanceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid time of day, expected strict HH:MM")]
pub struct InvalidTimeFormat;

/// Parses a strict "HH:MM" string (HH 00-23, MM 00-59) into an instant on the
/// UTC calendar day of `reference`, with seconds zeroed.
pub fn parse_time_of_day(
    text: &str,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, InvalidTimeFormat> {
    let bytes = text.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(InvalidTimeFormat);
    }
    if !bytes[..2].iter().all(u8::is_ascii_digit) || !bytes[3..].iter().all(u8::is_ascii_digit) {
        return Err(InvalidTimeFormat);
    }
    let hours: u32 = text[..2].parse().map_err(|_| InvalidTimeFormat)?;
    let minutes: u32 = text[3..].parse().map_err(|_| InvalidTimeFormat)?;
    let time = NaiveTime::from_hms_opt(hours, minutes, 0).ok_or(InvalidTimeFormat)?;
    Ok(Utc.from_utc_datetime(&reference.date_naive().and_time(time)))
}

/// Classifies a check-in against the scheduled entry time. The grace boundary
/// is inclusive: a check-in at exactly entry + grace is still on time.
/// Returns `None` when no entry time is known.
pub fn classify_check_in(
    check_in: DateTime<Utc>,
    schedule_entry: Option<DateTime<Utc>>,
    grace_minutes: i64,
) -> Option<AttendanceStatus> {
    let entry = schedule_entry?;
    if check_in <= entry + Duration::minutes(grace_minutes) {
        Some(AttendanceStatus::OnTime)
    } else {
        Some(AttendanceStatus::Late)
    }
}

/// Floors an instant to its UTC calendar day, the attendance partition key.
pub fn calendar_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// ISO weekday: Monday=1 .. Sunday=7.
pub fn iso_weekday(date: NaiveDate) -> u8 {
    date.weekday().number_from_monday() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn parse_time_of_day_anchors_to_reference_day() {
        let reference = instant("2026-03-04T15:42:31Z");
        let parsed = parse_time_of_day("09:00", reference).unwrap();
        assert_eq!(parsed, instant("2026-03-04T09:00:00Z"));
    }

    #[test]
    fn parse_time_of_day_rejects_loose_formats() {
        let reference = instant("2026-03-04T00:00:00Z");
        for bad in ["9:00", "09:5", "24:00", "12:60", "09-00", "09:00:00", "", "ab:cd"] {
            assert_eq!(
                parse_time_of_day(bad, reference),
                Err(InvalidTimeFormat),
                "{bad} should be rejected"
            );
        }
        assert!(parse_time_of_day("00:00", reference).is_ok());
        assert!(parse_time_of_day("23:59", reference).is_ok());
    }

    #[test]
    fn classify_check_in_boundaries() {
        let entry = Some(instant("2026-03-04T09:00:00Z"));

        // No delay at all.
        assert_eq!(
            classify_check_in(instant("2026-03-04T09:00:00Z"), entry, 10),
            Some(AttendanceStatus::OnTime)
        );
        // Exactly entry + grace: still on time (inclusive boundary).
        assert_eq!(
            classify_check_in(instant("2026-03-04T09:10:00Z"), entry, 10),
            Some(AttendanceStatus::OnTime)
        );
        // One minute past the grace boundary.
        assert_eq!(
            classify_check_in(instant("2026-03-04T09:11:00Z"), entry, 10),
            Some(AttendanceStatus::Late)
        );
    }

    #[test]
    fn classify_check_in_without_entry_is_unknown() {
        assert_eq!(classify_check_in(instant("2026-03-04T09:00:00Z"), None, 10), None);
    }

    #[test]
    fn calendar_date_floors_to_utc_day() {
        assert_eq!(
            calendar_date(instant("2026-03-04T23:59:59Z")),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
        );
    }

    #[test]
    fn iso_weekday_remap() {
        // 2026-03-02 is a Monday, 2026-03-08 is a Sunday.
        assert_eq!(iso_weekday(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()), 1);
        assert_eq!(iso_weekday(NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()), 7);
    }
}
