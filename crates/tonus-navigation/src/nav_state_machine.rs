//! Drill-down navigation state machine.
//!
//! The machine is pure: the caller asks [`NavAction::date_scope`] which dates
//! to load, then hands them to [`NavigationStateMachine::transition`], which
//! returns the next menu, a leaf request, or the "no data" outcome.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::nav_token::NavAction;

/// Days shown per menu row in a day list.
pub const DAYS_PER_ROW: usize = 5;

/// Date set a transition needs from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateScope {
    None,
    All,
    Year(i32),
    Month { year: i32, month: u32 },
    Day(NaiveDate),
}

impl DateScope {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            DateScope::None => false,
            DateScope::All => true,
            DateScope::Year(year) => date.year() == year,
            DateScope::Month { year, month } => date.year() == year && date.month() == month,
            DateScope::Day(day) => date == day,
        }
    }
}

impl NavAction {
    /// Which of the user's dates [`NavigationStateMachine::transition`] must see.
    pub fn date_scope(&self) -> DateScope {
        match *self {
            NavAction::RootMenu
            | NavAction::YearList
            | NavAction::ShowAllGraph
            | NavAction::DeleteMenu
            | NavAction::DeleteConfirm
            | NavAction::DeleteLast => DateScope::All,
            NavAction::MonthList { year } | NavAction::ShowYearGraph { year } => {
                DateScope::Year(year)
            }
            NavAction::DayList { year, month } | NavAction::ShowMonthGraph { year, month } => {
                DateScope::Month { year, month }
            }
            NavAction::LeafChoice { date }
            | NavAction::ShowText { date }
            | NavAction::ShowGraph { date } => DateScope::Day(date),
            NavAction::DeleteAllConfirmed
            | NavAction::DeleteAllCancelled
            | NavAction::NotifyMenu
            | NavAction::NotifyEnable
            | NavAction::NotifyDisable => DateScope::None,
        }
    }
}

/// One labelled button and the action its token carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub action: NavAction,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, action: NavAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }

    pub fn token(&self) -> String {
        self.action.encode()
    }
}

/// Prompt plus button rows, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub prompt: String,
    pub rows: Vec<Vec<MenuOption>>,
}

impl Menu {
    pub fn options(&self) -> impl Iterator<Item = &MenuOption> {
        self.rows.iter().flatten()
    }
}

/// Terminal work the caller performs after navigation resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafRequest {
    DayText(NaiveDate),
    DayGraph(NaiveDate),
    YearGraph(i32),
    MonthGraph { year: i32, month: u32 },
    AllTimeGraph,
    DeleteAll,
    CancelDeleteAll,
    DeleteLast,
    EnableNotifications,
    DisableNotifications,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Menu(Menu),
    /// Nothing to show for the scope. Never rendered as an empty menu.
    NoData(DateScope),
    Leaf(LeafRequest),
}

/// Stateless transition function over [`NavAction`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NavigationStateMachine;

impl NavigationStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Computes the outcome of `action`. `dates` may be any superset of the
    /// action's [`DateScope`]; out-of-scope dates are ignored.
    pub fn transition(&self, action: NavAction, dates: &BTreeSet<NaiveDate>) -> NavOutcome {
        let scope = action.date_scope();
        let in_scope = dates
            .iter()
            .copied()
            .filter(|date| scope.contains(*date))
            .collect::<BTreeSet<_>>();
        if scope != DateScope::None && in_scope.is_empty() {
            return NavOutcome::NoData(scope);
        }

        match action {
            NavAction::RootMenu => NavOutcome::Menu(year_menu(&in_scope, true)),
            NavAction::YearList => NavOutcome::Menu(year_menu(&in_scope, false)),
            NavAction::MonthList { year } => NavOutcome::Menu(month_menu(year, &in_scope)),
            NavAction::DayList { year, .. } => NavOutcome::Menu(day_menu(year, &in_scope)),
            NavAction::LeafChoice { date } => NavOutcome::Menu(leaf_menu(date)),
            NavAction::ShowText { date } => NavOutcome::Leaf(LeafRequest::DayText(date)),
            NavAction::ShowGraph { date } => NavOutcome::Leaf(LeafRequest::DayGraph(date)),
            NavAction::ShowYearGraph { year } => NavOutcome::Leaf(LeafRequest::YearGraph(year)),
            NavAction::ShowMonthGraph { year, month } => {
                NavOutcome::Leaf(LeafRequest::MonthGraph { year, month })
            }
            NavAction::ShowAllGraph => NavOutcome::Leaf(LeafRequest::AllTimeGraph),
            NavAction::DeleteMenu => NavOutcome::Menu(Menu {
                prompt: "Delete all information or last record?".to_string(),
                rows: vec![vec![
                    MenuOption::new("Clear data", NavAction::DeleteConfirm),
                    MenuOption::new("Delete last record", NavAction::DeleteLast),
                ]],
            }),
            NavAction::DeleteConfirm => NavOutcome::Menu(Menu {
                prompt: "Are you sure? \nALL saved information will be lost!".to_string(),
                rows: vec![vec![
                    MenuOption::new("Yes", NavAction::DeleteAllConfirmed),
                    MenuOption::new("No", NavAction::DeleteAllCancelled),
                ]],
            }),
            NavAction::DeleteAllConfirmed => NavOutcome::Leaf(LeafRequest::DeleteAll),
            NavAction::DeleteAllCancelled => NavOutcome::Leaf(LeafRequest::CancelDeleteAll),
            NavAction::DeleteLast => NavOutcome::Leaf(LeafRequest::DeleteLast),
            NavAction::NotifyMenu => NavOutcome::Menu(Menu {
                prompt: "Enable or disable notifications:".to_string(),
                rows: vec![vec![
                    MenuOption::new("Enable", NavAction::NotifyEnable),
                    MenuOption::new("Disable", NavAction::NotifyDisable),
                ]],
            }),
            NavAction::NotifyEnable => NavOutcome::Leaf(LeafRequest::EnableNotifications),
            NavAction::NotifyDisable => NavOutcome::Leaf(LeafRequest::DisableNotifications),
        }
    }
}

fn year_menu(dates: &BTreeSet<NaiveDate>, include_all_time: bool) -> Menu {
    let years = dates.iter().map(Datelike::year).collect::<BTreeSet<_>>();
    let mut rows = years
        .into_iter()
        .map(|year| {
            vec![
                MenuOption::new(format!("{year:04}"), NavAction::MonthList { year }),
                MenuOption::new(
                    format!("{year:04} graph"),
                    NavAction::ShowYearGraph { year },
                ),
            ]
        })
        .collect::<Vec<_>>();
    if include_all_time {
        rows.push(vec![MenuOption::new(
            "All-time graph",
            NavAction::ShowAllGraph,
        )]);
    }
    Menu {
        prompt: "Select year:".to_string(),
        rows,
    }
}

fn month_menu(year: i32, dates: &BTreeSet<NaiveDate>) -> Menu {
    let months = dates.iter().map(Datelike::month).collect::<BTreeSet<_>>();
    let mut rows = months
        .into_iter()
        .map(|month| {
            vec![
                MenuOption::new(format!("{month:02}"), NavAction::DayList { year, month }),
                MenuOption::new(
                    format!("{month:02} graph"),
                    NavAction::ShowMonthGraph { year, month },
                ),
            ]
        })
        .collect::<Vec<_>>();
    rows.push(vec![MenuOption::new("Back", NavAction::YearList)]);
    Menu {
        prompt: "Select a month:".to_string(),
        rows,
    }
}

fn day_menu(year: i32, dates: &BTreeSet<NaiveDate>) -> Menu {
    let days = dates.iter().copied().collect::<Vec<_>>();
    let mut rows = days
        .chunks(DAYS_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|date| {
                    MenuOption::new(
                        format!("{:02}", date.day()),
                        NavAction::LeafChoice { date: *date },
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    rows.push(vec![MenuOption::new(
        "Back",
        NavAction::MonthList { year },
    )]);
    Menu {
        prompt: "Select a day:".to_string(),
        rows,
    }
}

fn leaf_menu(date: NaiveDate) -> Menu {
    Menu {
        prompt: "Text or Graph".to_string(),
        rows: vec![vec![
            MenuOption::new("Text", NavAction::ShowText { date }),
            MenuOption::new("Graph", NavAction::ShowGraph { date }),
        ]],
    }
}
