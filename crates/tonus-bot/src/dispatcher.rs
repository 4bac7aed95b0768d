//! Inbound event dispatcher.
//!
//! Commands and button presses resolve through the navigation state machine;
//! free text is either a pending reminder time or a reading triplet.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveTime};
use thiserror::Error;
use tonus_core::{format_canonical_date, format_canonical_time, parse_time_of_day_input, WallClock};
use tonus_navigation::{DateScope, LeafRequest, NavAction, NavOutcome, NavigationStateMachine};
use tonus_store::{Reading, ReadingStore, StoreError, UserId};
use tracing::{debug, instrument, warn};

use crate::bot_facade::{BotFacade, InboundEvent, InboundKind, COMMAND_KEYBOARD};
use crate::bot_replies;
use crate::chart_render::{render_chart, ChartError, ChartPoint};
use crate::ingest_validator::validate_reading;

/// Shared collaborators handed to the dispatcher and the scheduler.
#[derive(Clone)]
pub struct BotContext {
    pub store: Arc<dyn ReadingStore>,
    pub facade: Arc<dyn BotFacade>,
    pub clock: Arc<dyn WallClock>,
}

impl BotContext {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        facade: Arc<dyn BotFacade>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            store,
            facade,
            clock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Reset,
    Get,
    Graph,
    Notify,
    Delete,
    Unknown(String),
}

impl BotCommand {
    /// Parses `/name`, `/name@bot_username` and trailing arguments.
    pub fn parse(raw: &str) -> Option<Self> {
        let first = raw.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default().to_ascii_lowercase();
        let command = match name.as_str() {
            "start" => BotCommand::Start,
            "help" => BotCommand::Help,
            "reset" => BotCommand::Reset,
            "get" => BotCommand::Get,
            "graph" => BotCommand::Graph,
            "notify" => BotCommand::Notify,
            "delete" => BotCommand::Delete,
            _ => BotCommand::Unknown(name),
        };
        Some(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeInputError {
    #[error("expected a 24h time as H:MM or HH:MM, got '{0}'")]
    Malformed(String),
}

pub fn parse_reminder_time(raw: &str) -> Result<NaiveTime, TimeInputError> {
    parse_time_of_day_input(raw).ok_or_else(|| TimeInputError::Malformed(raw.trim().to_string()))
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Processes one inbound event at a time per caller. The only in-process
/// state is the set of users whose next free text is a reminder time.
pub struct BotDispatcher {
    context: BotContext,
    machine: NavigationStateMachine,
    awaiting_time: Mutex<HashSet<UserId>>,
}

impl BotDispatcher {
    pub fn new(context: BotContext) -> Self {
        Self {
            context,
            machine: NavigationStateMachine::new(),
            awaiting_time: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &BotContext {
        &self.context
    }

    pub fn is_awaiting_time(&self, user_id: UserId) -> bool {
        self.awaiting().contains(&user_id)
    }

    /// Handles one event. Store failures are reported to the user and
    /// swallowed; transport failures are returned.
    #[instrument(skip(self, event), fields(user_id = event.user_id, kind = ?event.kind))]
    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        let user_id = event.user_id;
        match self.dispatch(event).await {
            Ok(()) => Ok(()),
            Err(DispatchError::Store(error)) => {
                warn!(user_id, %error, "store operation failed while handling event");
                self.context
                    .facade
                    .send_text(user_id, bot_replies::STORE_FAILURE)
                    .await
            }
            Err(DispatchError::Transport(error)) => Err(error),
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> DispatchResult<()> {
        let InboundEvent {
            user_id,
            kind,
            payload,
        } = event;
        self.context.store.ensure_preference(user_id).await?;

        match kind {
            InboundKind::Command => {
                self.cancel_pending_time(user_id);
                match BotCommand::parse(&payload) {
                    Some(command) => self.handle_command(user_id, command).await,
                    None => self.handle_free_text(user_id, &payload).await,
                }
            }
            InboundKind::ButtonPress => {
                self.cancel_pending_time(user_id);
                match NavAction::decode(&payload) {
                    Ok(action) => self.navigate(user_id, action).await,
                    Err(error) => {
                        debug!(user_id, %error, "rejected navigation token");
                        self.send_text(user_id, bot_replies::NO_DATA_FOR_SELECTION)
                            .await
                    }
                }
            }
            InboundKind::FreeText => self.handle_free_text(user_id, &payload).await,
        }
    }

    async fn handle_command(&self, user_id: UserId, command: BotCommand) -> DispatchResult<()> {
        debug!(user_id, ?command, "command");
        match command {
            BotCommand::Start | BotCommand::Help | BotCommand::Unknown(_) => {
                self.send_text(user_id, bot_replies::HELP_TEXT).await?;
                self.send_keyboard(user_id).await
            }
            BotCommand::Reset => self.send_keyboard(user_id).await,
            BotCommand::Get | BotCommand::Graph => self.navigate(user_id, NavAction::RootMenu).await,
            BotCommand::Notify => {
                let status = match self.context.store.get_preference(user_id).await? {
                    Some(preference) if preference.enabled => match preference.time_of_day {
                        Some(time) => bot_replies::notification_status_enabled(time),
                        None => bot_replies::NOTIFICATION_AWAITING_TIME.to_string(),
                    },
                    _ => bot_replies::NOTIFICATION_OFF.to_string(),
                };
                self.send_text(user_id, &status).await?;
                self.navigate(user_id, NavAction::NotifyMenu).await
            }
            BotCommand::Delete => self.navigate(user_id, NavAction::DeleteMenu).await,
        }
    }

    async fn handle_free_text(&self, user_id: UserId, text: &str) -> DispatchResult<()> {
        if self.is_awaiting_time(user_id) {
            return match parse_reminder_time(text) {
                Ok(time) => {
                    self.context
                        .store
                        .upsert_preference(user_id, Some(time), true)
                        .await?;
                    self.cancel_pending_time(user_id);
                    debug!(user_id, time = %format_canonical_time(time), "reminder time set");
                    self.send_text(user_id, &bot_replies::notifications_enabled_at(time))
                        .await
                }
                Err(error) => {
                    debug!(user_id, %error, "reminder time rejected");
                    self.send_text(user_id, bot_replies::INCORRECT_TIME).await
                }
            };
        }

        match validate_reading(user_id, text, self.context.clock.now()) {
            Ok(draft) => {
                let reading = self.context.store.insert_reading(draft).await?;
                let total = self.context.store.count_readings(user_id).await?;
                debug!(
                    user_id,
                    sequence_id = reading.sequence_id,
                    total,
                    "reading saved"
                );
                self.send_text(user_id, bot_replies::SAVED).await
            }
            Err(error) => {
                debug!(user_id, %error, "reading rejected");
                self.send_text(user_id, bot_replies::validation_reply(error.kind()))
                    .await
            }
        }
    }

    async fn navigate(&self, user_id: UserId, action: NavAction) -> DispatchResult<()> {
        let dates = self.load_dates(user_id, action.date_scope()).await?;
        match self.machine.transition(action, &dates) {
            NavOutcome::Menu(menu) => {
                self.context.facade.send_menu(user_id, &menu).await?;
                Ok(())
            }
            NavOutcome::NoData(scope) => {
                self.send_text(user_id, bot_replies::no_data_reply(scope))
                    .await
            }
            NavOutcome::Leaf(request) => self.perform_leaf(user_id, request).await,
        }
    }

    async fn load_dates(
        &self,
        user_id: UserId,
        scope: DateScope,
    ) -> DispatchResult<BTreeSet<NaiveDate>> {
        let store = &self.context.store;
        let dates = match scope {
            DateScope::None => BTreeSet::new(),
            DateScope::All => store.distinct_dates(user_id).await?,
            DateScope::Year(year) => store.distinct_dates_matching(user_id, year, None).await?,
            DateScope::Month { year, month } => {
                store
                    .distinct_dates_matching(user_id, year, Some(month))
                    .await?
            }
            DateScope::Day(date) => {
                store
                    .distinct_dates_matching(user_id, date.year(), Some(date.month()))
                    .await?
            }
        };
        Ok(dates)
    }

    async fn perform_leaf(&self, user_id: UserId, request: LeafRequest) -> DispatchResult<()> {
        let store = &self.context.store;
        debug!(user_id, ?request, "leaf");
        match request {
            LeafRequest::DayText(date) => {
                let readings = store.readings_on(user_id, date).await?;
                if readings.is_empty() {
                    return self
                        .send_text(user_id, bot_replies::NO_DATA_FOR_SELECTION)
                        .await;
                }
                self.send_text(user_id, &bot_replies::day_listing(date, &readings))
                    .await
            }
            LeafRequest::DayGraph(date) => {
                let readings = store.readings_on(user_id, date).await?;
                let title = format!("Arterial Pressure {}", format_canonical_date(date));
                self.send_chart(user_id, &title, &readings, |reading| {
                    format_canonical_time(reading.time)
                })
                .await
            }
            LeafRequest::YearGraph(year) => {
                let readings = store.readings_matching(user_id, year, None).await?;
                let title = format!("Arterial Pressure {year:04}");
                self.send_chart(user_id, &title, &readings, |reading| {
                    reading.date.format("%d-%m").to_string()
                })
                .await
            }
            LeafRequest::MonthGraph { year, month } => {
                let readings = store.readings_matching(user_id, year, Some(month)).await?;
                let title = format!("Arterial Pressure {month:02}-{year:04}");
                self.send_chart(user_id, &title, &readings, |reading| {
                    format!("{:02}", reading.date.day())
                })
                .await
            }
            LeafRequest::AllTimeGraph => {
                let readings = store.all_readings(user_id).await?;
                self.send_chart(user_id, "Arterial Pressure Summary", &readings, |reading| {
                    format_canonical_date(reading.date)
                })
                .await
            }
            LeafRequest::DeleteAll => {
                let removed = store.delete_all(user_id).await?;
                debug!(user_id, removed, "readings cleared");
                self.send_text(user_id, bot_replies::DATA_CLEARED).await
            }
            LeafRequest::CancelDeleteAll => {
                self.send_text(user_id, bot_replies::DELETION_CANCELED)
                    .await
            }
            LeafRequest::DeleteLast => match store.delete_most_recent(user_id).await? {
                Some(_) => {
                    self.send_text(user_id, bot_replies::LAST_RECORD_REMOVED)
                        .await
                }
                None => self.send_text(user_id, bot_replies::NO_SAVED_DATA).await,
            },
            LeafRequest::EnableNotifications => {
                store.upsert_preference(user_id, None, true).await?;
                self.awaiting().insert(user_id);
                self.send_text(user_id, bot_replies::ENTER_TIME).await
            }
            LeafRequest::DisableNotifications => {
                store.upsert_preference(user_id, None, false).await?;
                self.send_text(user_id, bot_replies::NOTIFICATION_DISABLED)
                    .await
            }
        }
    }

    async fn send_chart(
        &self,
        user_id: UserId,
        title: &str,
        readings: &[Reading],
        label: impl Fn(&Reading) -> String,
    ) -> DispatchResult<()> {
        let points = readings
            .iter()
            .map(|reading| ChartPoint::from_reading(reading, label(reading)))
            .collect::<Vec<_>>();
        match render_chart(title, &points) {
            Ok(chart) => {
                self.context.facade.send_image(user_id, &chart).await?;
                Ok(())
            }
            Err(ChartError::EmptySeries) => {
                self.send_text(user_id, bot_replies::NO_DATA_FOR_SELECTION)
                    .await
            }
            Err(error) => {
                warn!(user_id, %error, "chart rendering failed");
                self.send_text(user_id, bot_replies::STORE_FAILURE).await
            }
        }
    }

    async fn send_keyboard(&self, user_id: UserId) -> DispatchResult<()> {
        self.context
            .facade
            .send_command_keyboard(user_id, bot_replies::KEYBOARD_PROMPT, &COMMAND_KEYBOARD)
            .await?;
        Ok(())
    }

    async fn send_text(&self, user_id: UserId, text: &str) -> DispatchResult<()> {
        self.context.facade.send_text(user_id, text).await?;
        Ok(())
    }

    fn cancel_pending_time(&self, user_id: UserId) {
        if self.awaiting().remove(&user_id) {
            debug!(user_id, "pending reminder time input cancelled");
        }
    }

    fn awaiting(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.awaiting_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests;
