//! Navigation token codec.
//!
//! A token is an action tag followed by `|`-separated arguments, for example
//! `days|2024|03` or `text|01-03-2024`. Every argument is recovered by
//! splitting on the delimiter, never by offset, and decoding rejects anything
//! it did not produce itself.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use tonus_core::{format_canonical_date, parse_canonical_date};

/// Separator between the tag and each argument.
pub const TOKEN_DELIMITER: char = '|';
/// Upper bound on an encoded token, matching Telegram's `callback_data` limit.
pub const MAX_TOKEN_BYTES: usize = 64;

/// Closed set of navigation actions a menu button can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavAction {
    RootMenu,
    YearList,
    MonthList { year: i32 },
    DayList { year: i32, month: u32 },
    LeafChoice { date: NaiveDate },
    ShowText { date: NaiveDate },
    ShowGraph { date: NaiveDate },
    ShowYearGraph { year: i32 },
    ShowMonthGraph { year: i32, month: u32 },
    ShowAllGraph,
    DeleteMenu,
    DeleteConfirm,
    DeleteAllConfirmed,
    DeleteAllCancelled,
    DeleteLast,
    NotifyMenu,
    NotifyEnable,
    NotifyDisable,
}

/// Tag half of a [`NavAction`], usable without its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTag {
    RootMenu,
    YearList,
    MonthList,
    DayList,
    LeafChoice,
    ShowText,
    ShowGraph,
    ShowYearGraph,
    ShowMonthGraph,
    ShowAllGraph,
    DeleteMenu,
    DeleteConfirm,
    DeleteAllConfirmed,
    DeleteAllCancelled,
    DeleteLast,
    NotifyMenu,
    NotifyEnable,
    NotifyDisable,
}

impl ActionTag {
    pub const ALL: [ActionTag; 18] = [
        ActionTag::RootMenu,
        ActionTag::YearList,
        ActionTag::MonthList,
        ActionTag::DayList,
        ActionTag::LeafChoice,
        ActionTag::ShowText,
        ActionTag::ShowGraph,
        ActionTag::ShowYearGraph,
        ActionTag::ShowMonthGraph,
        ActionTag::ShowAllGraph,
        ActionTag::DeleteMenu,
        ActionTag::DeleteConfirm,
        ActionTag::DeleteAllConfirmed,
        ActionTag::DeleteAllCancelled,
        ActionTag::DeleteLast,
        ActionTag::NotifyMenu,
        ActionTag::NotifyEnable,
        ActionTag::NotifyDisable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionTag::RootMenu => "root",
            ActionTag::YearList => "years",
            ActionTag::MonthList => "months",
            ActionTag::DayList => "days",
            ActionTag::LeafChoice => "leaf",
            ActionTag::ShowText => "text",
            ActionTag::ShowGraph => "graph",
            ActionTag::ShowYearGraph => "graph_year",
            ActionTag::ShowMonthGraph => "graph_month",
            ActionTag::ShowAllGraph => "graph_all",
            ActionTag::DeleteMenu => "delete",
            ActionTag::DeleteConfirm => "delete_confirm",
            ActionTag::DeleteAllConfirmed => "delete_all_yes",
            ActionTag::DeleteAllCancelled => "delete_all_no",
            ActionTag::DeleteLast => "delete_last",
            ActionTag::NotifyMenu => "notify",
            ActionTag::NotifyEnable => "notify_on",
            ActionTag::NotifyDisable => "notify_off",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == raw)
    }

    /// Number of arguments the tag is encoded with.
    pub fn arity(self) -> usize {
        match self {
            ActionTag::MonthList
            | ActionTag::ShowText
            | ActionTag::ShowGraph
            | ActionTag::ShowYearGraph => 1,
            ActionTag::DayList | ActionTag::ShowMonthGraph => 2,
            ActionTag::LeafChoice => 3,
            _ => 0,
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a token is rejected. Decoding never panics and never truncates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("navigation token is empty")]
    Empty,
    #[error("navigation token is {len} bytes, limit is {MAX_TOKEN_BYTES}")]
    TooLong { len: usize },
    #[error("unknown navigation tag '{0}'")]
    UnknownTag(String),
    #[error("navigation tag '{tag}' expects {expected} argument(s), got {actual}")]
    WrongArity {
        tag: ActionTag,
        expected: usize,
        actual: usize,
    },
    #[error("invalid {field} argument '{value}'")]
    InvalidArgument { field: &'static str, value: String },
    #[error("no such calendar date {year:04}-{month:02}-{day:02}")]
    ImpossibleDate { year: i32, month: u32, day: u32 },
}

impl NavAction {
    pub fn tag(&self) -> ActionTag {
        match self {
            NavAction::RootMenu => ActionTag::RootMenu,
            NavAction::YearList => ActionTag::YearList,
            NavAction::MonthList { .. } => ActionTag::MonthList,
            NavAction::DayList { .. } => ActionTag::DayList,
            NavAction::LeafChoice { .. } => ActionTag::LeafChoice,
            NavAction::ShowText { .. } => ActionTag::ShowText,
            NavAction::ShowGraph { .. } => ActionTag::ShowGraph,
            NavAction::ShowYearGraph { .. } => ActionTag::ShowYearGraph,
            NavAction::ShowMonthGraph { .. } => ActionTag::ShowMonthGraph,
            NavAction::ShowAllGraph => ActionTag::ShowAllGraph,
            NavAction::DeleteMenu => ActionTag::DeleteMenu,
            NavAction::DeleteConfirm => ActionTag::DeleteConfirm,
            NavAction::DeleteAllConfirmed => ActionTag::DeleteAllConfirmed,
            NavAction::DeleteAllCancelled => ActionTag::DeleteAllCancelled,
            NavAction::DeleteLast => ActionTag::DeleteLast,
            NavAction::NotifyMenu => ActionTag::NotifyMenu,
            NavAction::NotifyEnable => ActionTag::NotifyEnable,
            NavAction::NotifyDisable => ActionTag::NotifyDisable,
        }
    }

    /// Ordered wire arguments, already in canonical text form.
    pub fn args(&self) -> Vec<String> {
        match self {
            NavAction::MonthList { year } | NavAction::ShowYearGraph { year } => {
                vec![year_arg(*year)]
            }
            NavAction::DayList { year, month } | NavAction::ShowMonthGraph { year, month } => {
                vec![year_arg(*year), two_digit_arg(*month)]
            }
            NavAction::LeafChoice { date } => vec![
                year_arg(date.year()),
                two_digit_arg(date.month()),
                two_digit_arg(date.day()),
            ],
            NavAction::ShowText { date } | NavAction::ShowGraph { date } => {
                vec![format_canonical_date(*date)]
            }
            _ => Vec::new(),
        }
    }

    pub fn encode(&self) -> String {
        let mut token = self.tag().as_str().to_string();
        for arg in self.args() {
            token.push(TOKEN_DELIMITER);
            token.push_str(&arg);
        }
        token
    }

    pub fn decode(token: &str) -> Result<Self, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        if token.len() > MAX_TOKEN_BYTES {
            return Err(DecodeError::TooLong { len: token.len() });
        }

        let mut parts = token.split(TOKEN_DELIMITER);
        let raw_tag = parts.next().unwrap_or_default();
        let tag =
            ActionTag::parse(raw_tag).ok_or_else(|| DecodeError::UnknownTag(raw_tag.to_string()))?;
        let args = parts.collect::<Vec<_>>();
        if args.len() != tag.arity() {
            return Err(DecodeError::WrongArity {
                tag,
                expected: tag.arity(),
                actual: args.len(),
            });
        }

        let action = match tag {
            ActionTag::RootMenu => NavAction::RootMenu,
            ActionTag::YearList => NavAction::YearList,
            ActionTag::MonthList => NavAction::MonthList {
                year: parse_year(args[0])?,
            },
            ActionTag::DayList => NavAction::DayList {
                year: parse_year(args[0])?,
                month: parse_month(args[1])?,
            },
            ActionTag::LeafChoice => {
                let year = parse_year(args[0])?;
                let month = parse_month(args[1])?;
                let day = parse_day(args[2])?;
                let date = NaiveDate::from_ymd_opt(year, month, day)
                    .ok_or(DecodeError::ImpossibleDate { year, month, day })?;
                NavAction::LeafChoice { date }
            }
            ActionTag::ShowText => NavAction::ShowText {
                date: parse_date_arg(args[0])?,
            },
            ActionTag::ShowGraph => NavAction::ShowGraph {
                date: parse_date_arg(args[0])?,
            },
            ActionTag::ShowYearGraph => NavAction::ShowYearGraph {
                year: parse_year(args[0])?,
            },
            ActionTag::ShowMonthGraph => NavAction::ShowMonthGraph {
                year: parse_year(args[0])?,
                month: parse_month(args[1])?,
            },
            ActionTag::ShowAllGraph => NavAction::ShowAllGraph,
            ActionTag::DeleteMenu => NavAction::DeleteMenu,
            ActionTag::DeleteConfirm => NavAction::DeleteConfirm,
            ActionTag::DeleteAllConfirmed => NavAction::DeleteAllConfirmed,
            ActionTag::DeleteAllCancelled => NavAction::DeleteAllCancelled,
            ActionTag::DeleteLast => NavAction::DeleteLast,
            ActionTag::NotifyMenu => NavAction::NotifyMenu,
            ActionTag::NotifyEnable => NavAction::NotifyEnable,
            ActionTag::NotifyDisable => NavAction::NotifyDisable,
        };
        Ok(action)
    }
}

impl fmt::Display for NavAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for NavAction {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

fn year_arg(year: i32) -> String {
    format!("{year:04}")
}

fn two_digit_arg(value: u32) -> String {
    format!("{value:02}")
}

fn fixed_digits(field: &'static str, raw: &str, width: usize) -> Result<u32, DecodeError> {
    let invalid = || DecodeError::InvalidArgument {
        field,
        value: raw.to_string(),
    };
    if raw.len() != width || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }
    raw.parse::<u32>().map_err(|_| invalid())
}

fn parse_year(raw: &str) -> Result<i32, DecodeError> {
    let year = fixed_digits("year", raw, 4)?;
    i32::try_from(year).map_err(|_| DecodeError::InvalidArgument {
        field: "year",
        value: raw.to_string(),
    })
}

fn parse_month(raw: &str) -> Result<u32, DecodeError> {
    let month = fixed_digits("month", raw, 2)?;
    if !(1..=12).contains(&month) {
        return Err(DecodeError::InvalidArgument {
            field: "month",
            value: raw.to_string(),
        });
    }
    Ok(month)
}

fn parse_day(raw: &str) -> Result<u32, DecodeError> {
    let day = fixed_digits("day", raw, 2)?;
    if !(1..=31).contains(&day) {
        return Err(DecodeError::InvalidArgument {
            field: "day",
            value: raw.to_string(),
        });
    }
    Ok(day)
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, DecodeError> {
    parse_canonical_date(raw).ok_or_else(|| DecodeError::InvalidArgument {
        field: "date",
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32, month: u32, year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("date")
    }

    fn every_action() -> Vec<NavAction> {
        vec![
            NavAction::RootMenu,
            NavAction::YearList,
            NavAction::MonthList { year: 2024 },
            NavAction::DayList {
                year: 2024,
                month: 3,
            },
            NavAction::LeafChoice {
                date: date(29, 2, 2024),
            },
            NavAction::ShowText {
                date: date(1, 3, 2024),
            },
            NavAction::ShowGraph {
                date: date(31, 12, 1999),
            },
            NavAction::ShowYearGraph { year: 2023 },
            NavAction::ShowMonthGraph {
                year: 2024,
                month: 12,
            },
            NavAction::ShowAllGraph,
            NavAction::DeleteMenu,
            NavAction::DeleteConfirm,
            NavAction::DeleteAllConfirmed,
            NavAction::DeleteAllCancelled,
            NavAction::DeleteLast,
            NavAction::NotifyMenu,
            NavAction::NotifyEnable,
            NavAction::NotifyDisable,
        ]
    }

    #[test]
    fn unit_every_action_survives_encode_decode() {
        let actions = every_action();
        assert_eq!(actions.len(), ActionTag::ALL.len());
        for action in actions {
            let token = action.encode();
            assert!(token.len() <= MAX_TOKEN_BYTES, "{token} too long");
            assert_eq!(NavAction::decode(&token), Ok(action), "token {token}");
        }
    }

    #[test]
    fn unit_encoded_wire_form_is_tag_then_canonical_args() {
        assert_eq!(
            NavAction::DayList {
                year: 2024,
                month: 3
            }
            .encode(),
            "days|2024|03"
        );
        assert_eq!(
            NavAction::ShowText {
                date: date(1, 3, 2024)
            }
            .encode(),
            "text|01-03-2024"
        );
        assert_eq!(
            NavAction::LeafChoice {
                date: date(5, 4, 2024)
            }
            .encode(),
            "leaf|2024|04|05"
        );
        assert_eq!(NavAction::DeleteAllConfirmed.to_string(), "delete_all_yes");
    }

    #[test]
    fn unit_tags_sharing_a_prefix_decode_independently() {
        assert_eq!(NavAction::decode("delete"), Ok(NavAction::DeleteMenu));
        assert_eq!(NavAction::decode("delete_last"), Ok(NavAction::DeleteLast));
        assert_eq!(
            NavAction::decode("graph_year|2024"),
            Ok(NavAction::ShowYearGraph { year: 2024 })
        );
        assert_eq!(
            NavAction::decode("graph|02-04-2024"),
            Ok(NavAction::ShowGraph {
                date: date(2, 4, 2024)
            })
        );
    }

    #[test]
    fn regression_malformed_tokens_fail_closed() {
        assert_eq!(NavAction::decode(""), Err(DecodeError::Empty));
        assert!(matches!(
            NavAction::decode("month_text_03-2024"),
            Err(DecodeError::UnknownTag(_))
        ));
        assert!(matches!(
            NavAction::decode("days|2024"),
            Err(DecodeError::WrongArity {
                expected: 2,
                actual: 1,
                ..
            })
        ));
        assert!(matches!(
            NavAction::decode("root|extra"),
            Err(DecodeError::WrongArity { .. })
        ));
        assert!(matches!(
            NavAction::decode("days|2024|13"),
            Err(DecodeError::InvalidArgument { field: "month", .. })
        ));
        assert!(matches!(
            NavAction::decode("days|2024|3"),
            Err(DecodeError::InvalidArgument { field: "month", .. })
        ));
        assert!(matches!(
            NavAction::decode("months|24"),
            Err(DecodeError::InvalidArgument { field: "year", .. })
        ));
        assert!(matches!(
            NavAction::decode("months|+024"),
            Err(DecodeError::InvalidArgument { field: "year", .. })
        ));
        assert_eq!(
            NavAction::decode("leaf|2023|02|29"),
            Err(DecodeError::ImpossibleDate {
                year: 2023,
                month: 2,
                day: 29
            })
        );
        assert!(matches!(
            NavAction::decode("text|2024-03-01"),
            Err(DecodeError::InvalidArgument { field: "date", .. })
        ));
        assert!(matches!(
            NavAction::decode("text|01-03-2024|"),
            Err(DecodeError::WrongArity { .. })
        ));
        let oversized = format!("root{}", "|".repeat(MAX_TOKEN_BYTES));
        assert!(matches!(
            NavAction::decode(&oversized),
            Err(DecodeError::TooLong { .. })
        ));
    }

    #[test]
    fn regression_multibyte_input_is_rejected_without_panicking() {
        assert!(NavAction::decode("текст|01-03-2024").is_err());
        assert!(NavAction::decode("days|２０２４|03").is_err());
        assert!(NavAction::decode("|").is_err());
    }
}
