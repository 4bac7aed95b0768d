//! Free-text reading ingest: `"<systolic> <diastolic> <pulse>"`.

use chrono::NaiveDateTime;
use thiserror::Error;
use tonus_core::truncate_time_to_minute;
use tonus_store::{ReadingDraft, UserId};

/// Inclusive bound applied to every value. A sanity check, not a medical range.
pub const READING_VALUE_MAX: i64 = 300;
pub const READING_VALUE_MIN: i64 = 0;

const FIELD_NAMES: [&str; 3] = ["systolic", "diastolic", "pulse"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    WrongArity,
    NotNumeric,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected 3 whitespace-separated values, got {found}")]
    WrongArity { found: usize },
    #[error("{field} value '{value}' is not an integer")]
    NotNumeric { field: &'static str, value: String },
    #[error("{field} value {value} is outside 0..=300")]
    OutOfRange { field: &'static str, value: String },
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::WrongArity { .. } => ValidationErrorKind::WrongArity,
            ValidationError::NotNumeric { .. } => ValidationErrorKind::NotNumeric,
            ValidationError::OutOfRange { .. } => ValidationErrorKind::OutOfRange,
        }
    }
}

/// Parsed, range-checked values of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalTriplet {
    pub systolic: u16,
    pub diastolic: u16,
    pub pulse: u16,
}

/// Splits and range-checks a triplet. Arity is checked before any value, and
/// every value is checked for being numeric before any range check, so the
/// reported kind does not depend on token order.
pub fn parse_vital_triplet(raw: &str) -> Result<VitalTriplet, ValidationError> {
    let tokens = raw.split_whitespace().collect::<Vec<_>>();
    let [systolic, diastolic, pulse] = tokens.as_slice() else {
        return Err(ValidationError::WrongArity {
            found: tokens.len(),
        });
    };

    let mut parsed = [0_i64; 3];
    for (index, token) in [systolic, diastolic, pulse].into_iter().enumerate() {
        parsed[index] = parse_integer(FIELD_NAMES[index], token)?;
    }

    let mut values = [0_u16; 3];
    for (index, value) in parsed.into_iter().enumerate() {
        values[index] = checked_in_range(FIELD_NAMES[index], value)?;
    }

    Ok(VitalTriplet {
        systolic: values[0],
        diastolic: values[1],
        pulse: values[2],
    })
}

/// Validates `raw` and stamps it with the minute-resolution local `now`.
pub fn validate_reading(
    user_id: UserId,
    raw: &str,
    now: NaiveDateTime,
) -> Result<ReadingDraft, ValidationError> {
    let triplet = parse_vital_triplet(raw)?;
    Ok(ReadingDraft {
        user_id,
        systolic: triplet.systolic,
        diastolic: triplet.diastolic,
        pulse: triplet.pulse,
        date: now.date(),
        time: truncate_time_to_minute(now.time()),
    })
}

fn parse_integer(field: &'static str, token: &str) -> Result<i64, ValidationError> {
    match token.parse::<i64>() {
        Ok(value) => Ok(value),
        // Integers too large for i64 are still integers.
        Err(_) if is_integer_literal(token) => Err(ValidationError::OutOfRange {
            field,
            value: token.to_string(),
        }),
        Err(_) => Err(ValidationError::NotNumeric {
            field,
            value: token.to_string(),
        }),
    }
}

fn is_integer_literal(token: &str) -> bool {
    let digits = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

fn checked_in_range(field: &'static str, value: i64) -> Result<u16, ValidationError> {
    if !(READING_VALUE_MIN..=READING_VALUE_MAX).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    u16::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value: value.to_string(),
    })
}
