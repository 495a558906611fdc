//! Time helpers for periods and their human-readable forms.
//!
//! All conversions are done in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Limit used when splitting a period into months (20 years).
const MAX_MONTHS: usize = 12 * 20;

fn datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn days_in_month(month: u32, year: i32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}

/// Format a unix timestamp as `M/D/YYYY H:MM` without leading zeros on the
/// month, day and hour.
pub fn from_unix_ts(ts: i64) -> String {
    match datetime(ts) {
        Some(dt) => format!(
            "{}/{}/{} {}:{:02}",
            dt.month(),
            dt.day(),
            dt.year(),
            dt.hour(),
            dt.minute()
        ),
        None => ts.to_string(),
    }
}

/// Parse a timestamp string into unix seconds.
///
/// Accepts `M/D/YYYY H:MM`, RFC 3339, `YYYY-MM-DD HH:MM:SS` and plain integer
/// seconds.
pub fn to_unix_ts(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(ts) = value.parse::<i64>() {
        return Some(ts);
    }
    if let Ok(ts) = value.parse::<f64>() {
        if ts.is_finite() {
            return Some(ts as i64);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    for format in ["%m/%d/%Y %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}

/// First and last second of a month.
pub fn month_range(month: u32, year: i32) -> Option<(i64, i64)> {
    let last_day = days_in_month(month, year)?;
    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    let end = Utc
        .with_ymd_and_hms(year, month, last_day, 23, 59, 59)
        .single()?;
    Some((start.timestamp(), end.timestamp()))
}

/// The `(month, year)` a range covers exactly.
///
/// The start must be the first second of the month. The end may fall short
/// of the last second by at most `allowed_window` seconds.
pub fn range_as_month(start: i64, end: i64, allowed_window: i64) -> Option<(u32, i32)> {
    let start_dt = datetime(start)?;
    let end_dt = datetime(end)?;

    let starts_month = start_dt.day() == 1
        && start_dt.hour() == 0
        && start_dt.minute() == 0
        && start_dt.second() == 0;
    if !starts_month {
        return None;
    }

    let (_, last_moment) = month_range(start_dt.month(), start_dt.year())?;
    if last_moment - end > allowed_window {
        return None;
    }

    if start_dt.year() != end_dt.year() || start_dt.month() != end_dt.month() {
        return None;
    }

    Some((start_dt.month(), start_dt.year()))
}

/// Human-readable period: `January24` when the range is one whole month,
/// otherwise `M/D/YYYY H:MM-M/D/YYYY H:MM`.
pub fn range_printable(start: i64, end: i64, allowed_window: i64) -> String {
    if let Some((month, year)) = range_as_month(start, end, allowed_window) {
        return format!("{}{:02}", MONTH_NAMES[(month - 1) as usize], year.rem_euclid(100));
    }
    format!("{}-{}", from_unix_ts(start), from_unix_ts(end))
}

/// Split a period at month boundaries. The first piece keeps the original
/// start and every piece ends at the last second of its month.
pub fn break_period_into_months(start: i64, end: i64) -> Vec<(i64, i64)> {
    let mut periods = Vec::new();
    let Some(end_dt) = datetime(end) else {
        return periods;
    };

    let mut current = start;
    for _ in 0..MAX_MONTHS {
        let Some(start_dt) = datetime(current) else {
            break;
        };
        let Some((_, month_end)) = month_range(start_dt.month(), start_dt.year()) else {
            break;
        };
        periods.push((current, month_end));

        if start_dt.month() == end_dt.month() && start_dt.year() == end_dt.year() {
            break;
        }
        current = month_end + 1;
    }
    periods
}

fn parse_month_year(value: &str) -> Option<(i64, i64)> {
    let split = value.find(|c: char| c.is_ascii_digit())?;
    let (name, year) = value.split_at(split);
    if year.len() != 2 {
        return None;
    }
    let month = MONTH_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))?;
    let year: i32 = year.parse().ok()?;
    month_range(month as u32 + 1, 2000 + year)
}

fn parse_year(value: &str) -> Option<(i64, i64)> {
    let year: i32 = value.parse().ok()?;
    if !(2000..4000).contains(&year) {
        return None;
    }
    let (start, _) = month_range(1, year)?;
    let (_, end) = month_range(12, year)?;
    Some((start, end))
}

fn parse_timestamp(value: &str) -> Option<(i64, i64)> {
    let ts: i64 = value.parse().ok()?;
    (ts >= 1_600_000_000).then_some((ts, ts))
}

fn parse_keyword(value: &str, now: DateTime<Utc>) -> Option<(i64, i64)> {
    let today = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    match value {
        "yesterday" => {
            let start = today - Duration::days(1);
            Some((start.timestamp(), today.timestamp() - 1))
        }
        "lastweek" => {
            let days_since_sunday = i64::from(now.weekday().num_days_from_sunday());
            let this_sunday = today - Duration::days(days_since_sunday);
            let last_sunday = this_sunday - Duration::days(7);
            Some((last_sunday.timestamp(), this_sunday.timestamp() - 1))
        }
        "lastmonth" => {
            let (this_month_start, _) = month_range(now.month(), now.year())?;
            let previous = datetime(this_month_start - 1)?;
            month_range(previous.month(), previous.year())
        }
        "ytd" => {
            let (start, _) = month_range(1, now.year())?;
            Some((start, now.timestamp()))
        }
        _ => None,
    }
}

fn parse_single(value: &str, allow_timestamp: bool, now: DateTime<Utc>) -> Option<(i64, i64)> {
    parse_year(value)
        .or_else(|| parse_month_year(value))
        .or_else(|| parse_keyword(value, now))
        .or_else(|| {
            if allow_timestamp {
                parse_timestamp(value)
            } else {
                None
            }
        })
}

/// Parse a `--period` argument into `(start, end)` unix seconds.
///
/// Accepted forms: a year (`2024`), a month (`January24`), a keyword
/// (`yesterday`, `lastweek`, `lastmonth`, `ytd`, relative to `now`), or a
/// range of two years, months or unix timestamps joined by `-`.
pub fn parse_time_range(value: &str, now: DateTime<Utc>) -> Result<(i64, i64), String> {
    let value = value.trim();
    if !value.contains('-') {
        return parse_single(value, false, now)
            .ok_or_else(|| format!("Failed to parse period argument \"{}\"", value));
    }

    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Can't parse period range \"{}\": expected exactly one '-', found {} parts",
            value,
            parts.len()
        ));
    }

    let start = parse_single(parts[0], true, now).ok_or_else(|| {
        format!(
            "Failed to parse the start of period range \"{}\"",
            parts[0]
        )
    })?;
    let end = parse_single(parts[1], true, now)
        .ok_or_else(|| format!("Failed to parse the end of period range \"{}\"", parts[1]))?;

    if end.1 < start.0 {
        return Err(format!(
            "Period range \"{}\" ends before it starts",
            value
        ));
    }
    Ok((start.0, end.1))
}
