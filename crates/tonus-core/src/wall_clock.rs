//! Naive local wall-clock access and the canonical date/time text formats.
//!
//! Every date that crosses a boundary (store rows, navigation tokens, chat
//! replies) is rendered as `DD-MM-YYYY`; every time of day as `HH:MM`. No
//! timezone conversion happens anywhere: the bot compares naive local
//! wall-clock values.

use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// `strftime` pattern for canonical dates (`DD-MM-YYYY`).
pub const CANONICAL_DATE_FORMAT: &str = "%d-%m-%Y";
/// `strftime` pattern for canonical minute-resolution times (`HH:MM`).
pub const CANONICAL_TIME_FORMAT: &str = "%H:%M";

/// Source of the current naive local date-time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the host's local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalWallClock;

impl WallClock for LocalWallClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedWallClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedWallClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl WallClock for FixedWallClock {
    fn now(&self) -> NaiveDateTime {
        *self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn format_canonical_date(date: NaiveDate) -> String {
    date.format(CANONICAL_DATE_FORMAT).to_string()
}

pub fn format_canonical_time(time: NaiveTime) -> String {
    time.format(CANONICAL_TIME_FORMAT).to_string()
}

/// Parses a strict `DD-MM-YYYY` date. Shorter forms such as `1-3-2024` are
/// rejected so a date has exactly one textual representation.
pub fn parse_canonical_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[2] != b'-' || bytes[5] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 2 && *index != 5)
        .all(|(_, byte)| byte.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDate::parse_from_str(raw, CANONICAL_DATE_FORMAT).ok()
}

/// Parses a strict `HH:MM` time of day.
pub fn parse_canonical_time(raw: &str) -> Option<NaiveTime> {
    let bytes = raw.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    if !bytes
        .iter()
        .enumerate()
        .all(|(index, byte)| index == 2 || byte.is_ascii_digit())
    {
        return None;
    }
    NaiveTime::parse_from_str(raw, CANONICAL_TIME_FORMAT).ok()
}

/// Parses user-typed reminder times. Accepts `H:MM` and `HH:MM` in 24h form,
/// surrounding whitespace ignored.
pub fn parse_time_of_day_input(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    let (hours, minutes) = trimmed.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours = hours.parse::<u32>().ok()?;
    let minutes = minutes.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Truncates a date-time to its calendar minute.
pub fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(value)
}

/// Truncates a time of day to its minute.
pub fn truncate_time_to_minute(value: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(value.hour(), value.minute(), 0).unwrap_or(value)
}

/// Duration from `now` until the start of the next calendar minute.
pub fn duration_until_next_minute(now: NaiveDateTime) -> std::time::Duration {
    let next = truncate_to_minute(now) + Duration::minutes(1);
    (next - now).to_std().unwrap_or_default()
}
