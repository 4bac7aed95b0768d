//! Foundational low-level utilities shared across Tonus crates.
//!
//! Provides atomic file-write helpers, unix timestamps, and the naive local
//! wall clock with the canonical `DD-MM-YYYY` / `HH:MM` text formats.

pub mod atomic_io;
pub mod time_utils;
pub mod wall_clock;

pub use atomic_io::write_text_atomic;
pub use time_utils::current_unix_timestamp_ms;
pub use wall_clock::{
    duration_until_next_minute, format_canonical_date, format_canonical_time,
    parse_canonical_date, parse_canonical_time, parse_time_of_day_input, truncate_time_to_minute,
    truncate_to_minute, FixedWallClock, LocalWallClock, WallClock, CANONICAL_DATE_FORMAT,
    CANONICAL_TIME_FORMAT,
};
