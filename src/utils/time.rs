// src/utils/time.rs

//! Wall-clock helpers for `HH:MM` feed values.
//!
//! Feed timestamps carry no date, so everything here works in minutes of
//! the day and wraps across midnight where a duration is involved.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Source of "now" for schedulers and monitors.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Parse an `HH:MM` (or `HH:MM:SS`) feed value.
///
/// Blank strings and anything else return `None`.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Format a time as `HH:MM`.
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Minutes elapsed from `since` to `now`, wrapping across midnight.
///
/// `23:50 -> 00:20` is 30 minutes, never negative.
pub fn minutes_since(now: NaiveTime, since: NaiveTime) -> i64 {
    let now = i64::from(now.num_seconds_from_midnight() / 60);
    let since = i64::from(since.num_seconds_from_midnight() / 60);
    (now - since).rem_euclid(24 * 60)
}

/// Shift a time by a signed number of minutes, wrapping within the day.
pub fn shift_minutes(time: NaiveTime, minutes: i64) -> NaiveTime {
    let (shifted, _) = time.overflowing_add_signed(Duration::minutes(minutes));
    shifted
}

/// Anchor a time-of-day on `date`, rolling to the next day if it would
/// land more than half a day before `after`.
pub fn anchor(date: NaiveDate, time: NaiveTime, after: Option<NaiveDateTime>) -> NaiveDateTime {
    let stamp = date.and_time(time);
    match after {
        Some(previous) if previous - stamp > Duration::hours(12) => stamp + Duration::days(1),
        _ => stamp,
    }
}

/// Minute bucket of a fault trigger time.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS[.fff]]`, `HH:MM:SS[.fff]` and `HH:MM`.
/// Seconds are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerMinute {
    pub date: Option<NaiveDate>,
    pub hour: u32,
    pub minute: u32,
}

impl TriggerMinute {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (date, clock) = match value.split_once(' ') {
            Some((date, clock)) => (
                Some(NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?),
                clock.trim(),
            ),
            None => (None, value),
        };
        let clock = clock.split('.').next().unwrap_or(clock);
        let time = parse_hhmm(clock)?;
        Some(Self {
            date,
            hour: time.hour(),
            minute: time.minute(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_feed_times() {
        assert_eq!(parse_hhmm("07:45"), Some(t(7, 45)));
        assert_eq!(parse_hhmm(" 07:05 "), Some(t(7, 5)));
        assert_eq!(parse_hhmm("12:00:30").map(|x| x.minute()), Some(0));
        assert_eq!(parse_hhmm(""), None);
        assert_eq!(parse_hhmm("--:--"), None);
        assert_eq!(parse_hhmm("25:00"), None);
    }

    #[test]
    fn minutes_since_wraps_midnight() {
        assert_eq!(minutes_since(t(8, 15), t(7, 45)), 30);
        assert_eq!(minutes_since(t(0, 20), t(23, 50)), 30);
        assert_eq!(minutes_since(t(7, 45), t(7, 45)), 0);
    }

    #[test]
    fn shift_wraps_backwards() {
        assert_eq!(shift_minutes(t(0, 30), -60), t(23, 30));
        assert_eq!(shift_minutes(t(9, 15), -60), t(8, 15));
    }

    #[test]
    fn anchor_rolls_over_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let out = anchor(date, t(23, 50), None);
        let off = anchor(date, t(0, 10), Some(out));
        assert_eq!(off.date(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(anchor(date, t(23, 55), Some(out)).date(), date);
        assert_eq!(anchor(date, t(23, 40), Some(out)).date(), date);
    }

    #[test]
    fn trigger_minute_formats() {
        let full = TriggerMinute::parse("2026-03-01 15:23:41").unwrap();
        let bare = TriggerMinute::parse("15:23:02.500").unwrap();
        assert_eq!((full.hour, full.minute), (15, 23));
        assert_eq!((bare.hour, bare.minute), (15, 23));
        assert!(full.date.is_some());
        assert!(bare.date.is_none());
        assert!(TriggerMinute::parse("yesterday").is_none());
        assert!(TriggerMinute::parse("2026-13-01 15:23").is_none());
    }
}
