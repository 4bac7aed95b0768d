//! User-facing reply texts.

use chrono::NaiveTime;
use tonus_core::{format_canonical_date, format_canonical_time};
use tonus_navigation::DateScope;
use tonus_store::Reading;

use crate::ingest_validator::ValidationErrorKind;

pub const HELP_TEXT: &str = "Arterial Pressure Monitoring.\n\
To start please enter three values separated by spaces. \n\
Systolic | Diastolic | Pulse. \n\
Example: \"120 80 60\" \n\
--- \n\
Available commands:\n\
/help -- view help information\n\
/get -- get information by date\n\
/graph -- get graph based on your information\n\
/notify -- configure notification\n\
/reset -- click this if you need to reload keyboard buttons\n\
/delete -- clear your data";

pub const KEYBOARD_PROMPT: &str = "Input information or click on buttons.";
pub const SAVED: &str = "Information saved successfully.";
pub const NO_SAVED_DATA: &str = "No saved data found.";
pub const NO_DATA_FOR_SELECTION: &str = "No data found for the selected date.";
pub const DATA_CLEARED: &str = "Data cleared.";
pub const DELETION_CANCELED: &str = "Deletion canceled.";
pub const LAST_RECORD_REMOVED: &str = "Last record removed.";
pub const ENTER_TIME: &str = "Enter time in format \"HH:MM\"";
pub const INCORRECT_TIME: &str = "Incorrect time format, try again.";
pub const NOTIFICATION_DISABLED: &str = "Notification disabled.";
pub const NOTIFICATION_AWAITING_TIME: &str =
    "Notification is enabled, waiting for a time. Press Enable to set it.";
pub const NOTIFICATION_OFF: &str = "Notification is disabled.";
pub const REMINDER: &str = "Check your arterial pressure!";
pub const STORE_FAILURE: &str = "Something went wrong, please try again later.";

const WRONG_ARITY: &str =
    "Please enter 3 values separated by spaces. \nSystolic | Diastolic | Pulse. \nExample: \"120 80 60\"";
const NOT_NUMERIC: &str = "Invalid input. \nPlease enter numeric values.";
const OUT_OF_RANGE: &str = "Incorrect values. \nPlease, try again.";

pub fn validation_reply(kind: ValidationErrorKind) -> &'static str {
    match kind {
        ValidationErrorKind::WrongArity => WRONG_ARITY,
        ValidationErrorKind::NotNumeric => NOT_NUMERIC,
        ValidationErrorKind::OutOfRange => OUT_OF_RANGE,
    }
}

/// Whole-history scopes report "no saved data"; narrower ones name the selection.
pub fn no_data_reply(scope: DateScope) -> &'static str {
    match scope {
        DateScope::All | DateScope::None => NO_SAVED_DATA,
        DateScope::Year(_) | DateScope::Month { .. } | DateScope::Day(_) => NO_DATA_FOR_SELECTION,
    }
}

pub fn notifications_enabled_at(time: NaiveTime) -> String {
    format!("Notifications enabled at: {}", format_canonical_time(time))
}

pub fn notification_status_enabled(time: NaiveTime) -> String {
    format!("Notification is enabled at: {}", format_canonical_time(time))
}

/// Markdown listing of one day's readings.
pub fn day_listing(date: chrono::NaiveDate, readings: &[Reading]) -> String {
    let mut response = format!("Data saved on {}:\n", format_canonical_date(date));
    for reading in readings {
        response.push_str(&format!(
            "Time: *{}* | SBP: *{}* | DBP: *{}* | P: *{}*\n",
            format_canonical_time(reading.time),
            reading.systolic,
            reading.diastolic,
            reading.pulse
        ));
    }
    response
}
