use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone};

use crate::error::{Result, TaxError};

pub const DEFAULT_UPDATE_TIME: &str = "23:00";

/// Parses "HH:MM" or "HH:MM:SS" (the format an `input_datetime` reports).
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .map_err(|_| TaxError::InvalidTime(input.to_string()))
}

/// First occurrence of `at` that is strictly after `now` and after `previous`, if given.
pub fn next_trigger_after<Tz: TimeZone>(
    now: &DateTime<Tz>,
    previous: Option<&DateTime<Tz>>,
    at: NaiveTime,
) -> Option<DateTime<Tz>> {
    let floor = match previous {
        Some(prev) if prev > now => prev.clone(),
        _ => now.clone(),
    };
    let tz = floor.timezone();
    let mut date = floor.date_naive() - Duration::days(1);

    // A couple of days is always enough; the bound only guards against a broken time zone.
    for _ in 0..4 {
        if let Some(candidate) = local_instant(&tz, date, at) {
            if candidate > floor {
                return Some(candidate);
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Maps a wall-clock time to an instant. Ambiguous times take the earlier instant,
/// times inside a DST gap move forward by the size of the gap (tried hourly).
fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, at: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = date.and_time(at);
    for shift in 0..3 {
        match tz.from_local_datetime(&(naive + Duration::hours(shift))) {
            LocalResult::Single(t) => return Some(t),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest),
            LocalResult::None => continue,
        }
    }
    None
}

/// Time left until `target`, zero when it already passed.
pub fn duration_until<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> std::time::Duration {
    (target.clone() - now.clone())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn cet(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("23:00").unwrap(), at(23, 0));
        assert_eq!(parse_time_of_day("07:30:00").unwrap(), at(7, 30));
        assert_eq!(parse_time_of_day(" 06:05 ").unwrap(), at(6, 5));
        assert!(matches!(parse_time_of_day("unknown"), Err(TaxError::InvalidTime(_))));
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("").is_err());
    }

    #[test]
    fn test_next_trigger_later_today() {
        let now = cet(2024, 7, 1, 10, 0, 0);
        let next = next_trigger_after(&now, None, at(23, 0)).unwrap();
        assert_eq!(next, cet(2024, 7, 1, 23, 0, 0));
    }

    #[test]
    fn test_next_trigger_rolls_to_tomorrow() {
        let now = cet(2024, 7, 1, 23, 30, 0);
        let next = next_trigger_after(&now, None, at(23, 0)).unwrap();
        assert_eq!(next, cet(2024, 7, 2, 23, 0, 0));
    }

    #[test]
    fn test_exact_trigger_time_is_not_repeated() {
        let now = cet(2024, 7, 1, 23, 0, 0);
        let next = next_trigger_after(&now, None, at(23, 0)).unwrap();
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
    }

    #[test]
    fn test_previous_trigger_guards_against_early_wakeup() {
        // Woke up a little before the trigger we just fired.
        let fired = cet(2024, 7, 1, 23, 0, 0);
        let now = cet(2024, 7, 1, 22, 59, 59);
        let next = next_trigger_after(&now, Some(&fired), at(23, 0)).unwrap();
        assert_eq!(next, cet(2024, 7, 2, 23, 0, 0));
    }

    #[test]
    fn test_year_boundary() {
        let now = cet(2024, 12, 31, 23, 59, 0);
        let next = next_trigger_after(&now, None, at(0, 5)).unwrap();
        assert_eq!(next, cet(2025, 1, 1, 0, 5, 0));
        assert_eq!(next.hour(), 0);
    }

    #[test]
    fn test_duration_until() {
        let now = cet(2024, 7, 1, 22, 0, 0);
        let target = cet(2024, 7, 1, 23, 0, 0);
        assert_eq!(duration_until(&now, &target).as_secs(), 3600);
        assert_eq!(duration_until(&target, &now), std::time::Duration::ZERO);
    }
}
