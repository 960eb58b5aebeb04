//! Calendar arithmetic over UTC timestamps.
//!
//! All inputs and outputs are UTC. Week boundaries start on Sunday.

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;

/// Truncate a timestamp to midnight UTC of the same day
pub fn to_utc_date(date: DateTime<Utc>) -> DateTime<Utc> {
    midnight(date.date_naive())
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::default()))
}

/// Whole days from `from` to `to`, rounded up
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds();
    div_ceil_signed(millis, Duration::days(1).num_milliseconds())
}

/// Days from `now` until `target`, rounded to the nearest day
pub fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (target - now).num_milliseconds() as f64;
    (millis / Duration::days(1).num_milliseconds() as f64).round() as i64
}

/// Hours from `from` to `to`, rounded to the nearest hour
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds() as f64;
    (millis / Duration::hours(1).num_milliseconds() as f64).round() as i64
}

/// Complete calendar months from `from` to `to` (negative when `to` is earlier)
pub fn months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    if to < from {
        return -months_between(to, from);
    }

    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    // A partial last month does not count
    if let Some(anniversary) = from.checked_add_months(Months::new(months.max(0) as u32)) {
        if anniversary > to {
            months -= 1;
        }
    }

    tracing::debug!("number of months between dates is: {}", months);
    months.max(0)
}

/// Every day from `start` to `stop`, inclusive, keeping the time of day
pub fn dates_between(start: DateTime<Utc>, stop: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    step_while(start, stop, Duration::days(1))
}

/// `start`, `start + 7d`, ... while not past `end`
pub fn weekly_steps_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    step_while(start, end, Duration::weeks(1))
}

fn step_while(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut current = start;
    while current <= end {
        out.push(current);
        current += step;
    }
    out
}

/// First day of every month touched by the range, through the end's month
pub fn month_starts_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let (Some(mut current), Some(last)) = (first_of_month(start), first_of_month(end)) else {
        return out;
    };

    while current <= last {
        out.push(midnight(current));
        match current.checked_add_months(Months::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    out
}

/// `YYYY-MM-01` labels from the start's month up to, not including, the end's month
pub fn month_labels_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let mut starts = month_starts_between(start, end);
    starts.pop();
    starts
        .into_iter()
        .map(|d| d.format("%Y-%m-01").to_string())
        .collect()
}

fn first_of_month(date: DateTime<Utc>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// The Sunday on or before `date`, at midnight
pub fn start_of_week(date: DateTime<Utc>) -> DateTime<Utc> {
    let offset = date.weekday().num_days_from_sunday() as i64;
    to_utc_date(date - Duration::days(offset))
}

/// Start of the week containing the day five weeks before `now`
pub fn lookback_week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_week(now - Duration::days(35))
}

/// Start of next week
pub fn next_week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_week(now + Duration::weeks(1))
}

/// January 1st of `year` plus `(week - 1) * 7` days
pub fn date_from_week_number(year: i32, week: u32) -> Option<DateTime<Utc>> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let day = jan_first.checked_add_signed(Duration::weeks(week.saturating_sub(1) as i64))?;
    Some(midnight(day))
}

/// Day, month and year of a birth date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateParts {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

pub fn date_parts(date: DateTime<Utc>) -> DateParts {
    DateParts {
        day: date.day(),
        month: date.month(),
        year: date.year(),
    }
}

/// Human-readable date, e.g. `Mon, Jan 01, 2024`
pub fn format_display(date: DateTime<Utc>) -> String {
    date.format("%a, %b %d, %Y").to_string()
}

const LOOSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a client-supplied date string, ignoring any `AM`/`PM` marker
///
/// The marker is dropped, not applied: `2024-01-05 10:30 PM` is 10:30.
/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM[:SS]` and `YYYY-MM-DD`, read as UTC.
pub fn parse_loose(input: &str) -> Option<DateTime<Utc>> {
    let cleaned = input.replacen("PM", "", 1).replacen("AM", "", 1);
    let cleaned = cleaned.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(date.with_timezone(&Utc));
    }
    if let Some(naive) = LOOSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cleaned, format).ok())
    {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d").ok().map(midnight)
}

fn div_ceil_signed(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator / denominator;
    if numerator % denominator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_to_utc_date_truncates_time() {
        assert_eq!(to_utc_date(at(2024, 3, 9, 17)), at(2024, 3, 9, 0));
    }

    #[test]
    fn test_days_between_rounds_up() {
        assert_eq!(days_between(at(2024, 1, 1, 0), at(2024, 1, 3, 0)), 2);
        assert_eq!(days_between(at(2024, 1, 1, 0), at(2024, 1, 3, 1)), 3);
        assert_eq!(days_between(at(2024, 1, 3, 0), at(2024, 1, 1, 0)), -2);
    }

    #[test]
    fn test_days_until_rounds_to_nearest() {
        let now = at(2024, 1, 1, 0);
        assert_eq!(days_until(at(2024, 1, 4, 11), now), 3);
        assert_eq!(days_until(at(2024, 1, 4, 13), now), 4);
    }

    #[test]
    fn test_hours_between() {
        assert_eq!(hours_between(at(2024, 1, 1, 0), at(2024, 1, 2, 6)), 30);
    }

    #[test]
    fn test_months_between_counts_complete_months() {
        assert_eq!(months_between(at(2024, 1, 15, 0), at(2024, 4, 15, 0)), 3);
        assert_eq!(months_between(at(2024, 1, 15, 0), at(2024, 4, 14, 0)), 2);
        assert_eq!(months_between(at(2024, 4, 15, 0), at(2024, 1, 15, 0)), -3);
        assert_eq!(months_between(at(2023, 11, 1, 0), at(2024, 2, 1, 0)), 3);
    }

    #[test]
    fn test_dates_between_is_inclusive() {
        let days = dates_between(at(2024, 2, 27, 0), at(2024, 3, 1, 0));
        assert_eq!(days.len(), 4); // leap year: 27, 28, 29, 1
        assert_eq!(days[2], at(2024, 2, 29, 0));
    }

    #[test]
    fn test_weekly_steps_between() {
        let weeks = weekly_steps_between(at(2024, 1, 1, 0), at(2024, 1, 29, 0));
        assert_eq!(weeks.len(), 5);
        assert_eq!(weeks[4], at(2024, 1, 29, 0));
    }

    #[test]
    fn test_month_starts_cross_year() {
        let months = month_starts_between(at(2023, 11, 20, 0), at(2024, 2, 3, 0));
        assert_eq!(
            months,
            vec![
                at(2023, 11, 1, 0),
                at(2023, 12, 1, 0),
                at(2024, 1, 1, 0),
                at(2024, 2, 1, 0)
            ]
        );
    }

    #[test]
    fn test_month_labels_exclude_end_month() {
        let labels = month_labels_between(at(2023, 11, 20, 0), at(2024, 2, 3, 0));
        assert_eq!(labels, vec!["2023-11-01", "2023-12-01", "2024-01-01"]);
    }

    #[test]
    fn test_start_of_week_is_sunday() {
        // 2024-03-13 is a Wednesday
        assert_eq!(start_of_week(at(2024, 3, 13, 15)), at(2024, 3, 10, 0));
        // Sundays map to themselves
        assert_eq!(start_of_week(at(2024, 3, 10, 8)), at(2024, 3, 10, 0));
    }

    #[test]
    fn test_lookback_and_next_week() {
        let now = at(2024, 3, 13, 15);
        assert_eq!(lookback_week_start(now), at(2024, 2, 4, 0));
        assert_eq!(next_week_start(now), at(2024, 3, 17, 0));
    }

    #[test]
    fn test_date_from_week_number() {
        assert_eq!(date_from_week_number(2024, 1), Some(at(2024, 1, 1, 0)));
        assert_eq!(date_from_week_number(2024, 3), Some(at(2024, 1, 15, 0)));
    }

    #[test]
    fn test_date_parts_and_display() {
        let date = at(1990, 7, 4, 12);
        assert_eq!(
            date_parts(date),
            DateParts {
                day: 4,
                month: 7,
                year: 1990
            }
        );
        assert_eq!(format_display(at(2024, 1, 1, 0)), "Mon, Jan 01, 2024");
    }

    #[test]
    fn test_parse_loose_drops_meridiem() {
        assert_eq!(
            parse_loose("2024-01-05 10:30 PM"),
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_loose("2024-01-05T08:15:00AM"),
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 8, 15, 0).unwrap())
        );
        assert_eq!(parse_loose("2024-03-01"), Some(at(2024, 3, 1, 0)));
        assert_eq!(
            parse_loose("2024-03-01T12:00:00+02:00"),
            Some(at(2024, 3, 1, 10))
        );
        assert_eq!(parse_loose("yesterday"), None);
    }
}
