//! Telegram long-poll runtime that feeds updates into the bot dispatcher.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tonus_bot::{BotDispatcher, BotFacade, ChartImage};
use tonus_core::current_unix_timestamp_ms;
use tonus_navigation::Menu;
use tonus_store::UserId;
use tracing::{debug, info, instrument, warn};

mod telegram_api_client;
mod telegram_render_helpers;
mod telegram_state_store;
mod telegram_update_helpers;

use telegram_api_client::TelegramApiClient;
use telegram_render_helpers::{render_command_keyboard, render_inline_keyboard};
use telegram_state_store::TelegramStateStore;
pub use telegram_state_store::TelegramTransportHealth;
use telegram_update_helpers::{normalize_update, TelegramUpdate};

const TELEGRAM_STATE_SCHEMA_VERSION: u32 = 1;
const TELEGRAM_STATE_FILE_NAME: &str = "state.json";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Headroom on top of the long-poll hold time for the HTTP timeout.
const POLL_REQUEST_HEADROOM_MS: u64 = 10_000;

/// Runtime configuration for the Telegram transport loop.
#[derive(Clone)]
pub struct TelegramRuntimeConfig {
    pub api_base: String,
    pub bot_token: String,
    pub state_dir: PathBuf,
    pub poll_timeout_seconds: u64,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
    /// Consecutive failed polls tolerated before the runtime gives up.
    pub max_consecutive_failures: usize,
}

impl Default for TelegramRuntimeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: String::new(),
            state_dir: PathBuf::from(".tonus/telegram"),
            poll_timeout_seconds: 30,
            request_timeout_ms: 15_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            reconnect_delay: Duration::from_secs(5),
            max_consecutive_failures: 10,
        }
    }
}

impl std::fmt::Debug for TelegramRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramRuntimeConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("state_dir", &self.state_dir)
            .field("poll_timeout_seconds", &self.poll_timeout_seconds)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .finish()
    }
}

impl TelegramRuntimeConfig {
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(TELEGRAM_STATE_FILE_NAME)
    }

    fn api_client(&self) -> Result<TelegramApiClient> {
        let poll_floor_ms = self
            .poll_timeout_seconds
            .saturating_mul(1_000)
            .saturating_add(POLL_REQUEST_HEADROOM_MS);
        TelegramApiClient::new(
            &self.api_base,
            &self.bot_token,
            self.request_timeout_ms.max(poll_floor_ms),
            self.retry_max_attempts,
            self.retry_base_delay_ms,
        )
    }
}

/// [`BotFacade`] over the Telegram Bot API. Users are addressed by their
/// private chat, whose id equals the user id.
#[derive(Clone)]
pub struct TelegramBotFacade {
    client: TelegramApiClient,
}

impl TelegramBotFacade {
    pub fn from_config(config: &TelegramRuntimeConfig) -> Result<Self> {
        Ok(Self {
            client: config.api_client()?,
        })
    }
}

#[async_trait]
impl BotFacade for TelegramBotFacade {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<()> {
        let sent = self.client.send_message(user_id, text, None).await?;
        debug!(user_id, message_id = sent.message_id, "telegram text sent");
        Ok(())
    }

    async fn send_menu(&self, user_id: UserId, menu: &Menu) -> Result<()> {
        let markup = render_inline_keyboard(menu);
        let sent = self
            .client
            .send_message(user_id, &menu.prompt, Some(markup))
            .await?;
        debug!(user_id, message_id = sent.message_id, "telegram menu sent");
        Ok(())
    }

    async fn send_image(&self, user_id: UserId, image: &ChartImage) -> Result<()> {
        let sent = self
            .client
            .send_photo(user_id, &image.png, &image.caption)
            .await?;
        debug!(user_id, message_id = sent.message_id, "telegram chart sent");
        Ok(())
    }

    async fn send_command_keyboard(
        &self,
        user_id: UserId,
        text: &str,
        commands: &[&str],
    ) -> Result<()> {
        let markup = render_command_keyboard(commands);
        self.client.send_message(user_id, text, Some(markup)).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollCycleReport {
    pub received_updates: usize,
    pub dispatched_events: usize,
    pub ignored_updates: usize,
    pub failed_events: usize,
}

/// Runs the Telegram poll loop until `shutdown` resolves or polling fails
/// too many times in a row.
pub async fn run_telegram_bot<F>(
    config: TelegramRuntimeConfig,
    dispatcher: Arc<BotDispatcher>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut runtime = TelegramRuntime::new(config, dispatcher)?;
    runtime.run(shutdown).await
}

pub struct TelegramRuntime {
    config: TelegramRuntimeConfig,
    client: TelegramApiClient,
    state_store: TelegramStateStore,
    dispatcher: Arc<BotDispatcher>,
}

impl TelegramRuntime {
    pub fn new(config: TelegramRuntimeConfig, dispatcher: Arc<BotDispatcher>) -> Result<Self> {
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("failed to create {}", config.state_dir.display()))?;
        let client = config.api_client()?;
        let state_store = TelegramStateStore::load(config.state_path())?;
        Ok(Self {
            config,
            client,
            state_store,
            dispatcher,
        })
    }

    pub fn next_update_offset(&self) -> i64 {
        self.state_store.next_update_offset()
    }

    pub fn transport_health(&self) -> &TelegramTransportHealth {
        self.state_store.transport_health()
    }

    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut failure_streak = self.state_store.transport_health().failure_streak;
        info!(
            offset = self.state_store.next_update_offset(),
            "telegram runtime polling"
        );
        loop {
            // Shutdown only interrupts the fetch; a batch that was received
            // is always dispatched to completion.
            let fetched = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("telegram runtime shutdown requested");
                    return Ok(());
                }
                fetched = self.fetch_updates() => fetched,
            };
            let cycle = match fetched {
                Ok(updates) => self.process_batch(&updates).await,
                Err(error) => Err(error),
            };

            match cycle {
                Ok(report) => {
                    failure_streak = 0;
                    if report.received_updates > 0 {
                        debug!(
                            received = report.received_updates,
                            dispatched = report.dispatched_events,
                            failed = report.failed_events,
                            "telegram poll cycle complete"
                        );
                    }
                }
                Err(error) => {
                    failure_streak = failure_streak.saturating_add(1);
                    warn!(failure_streak, error = %format!("{error:#}"), "telegram poll failed");
                    self.record_poll_failure(failure_streak)?;
                    if failure_streak >= self.config.max_consecutive_failures.max(1) {
                        return Err(error.context(format!(
                            "telegram polling failed {failure_streak} consecutive times"
                        )));
                    }
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("telegram runtime shutdown requested");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// Fetches one batch, dispatches it in order and persists the new offset.
    #[instrument(skip(self))]
    pub async fn poll_once(&mut self) -> Result<PollCycleReport> {
        let updates = self.fetch_updates().await?;
        self.process_batch(&updates).await
    }

    async fn fetch_updates(&self) -> Result<Vec<TelegramUpdate>> {
        self.client
            .get_updates(
                self.state_store.next_update_offset(),
                self.config.poll_timeout_seconds,
            )
            .await
    }

    /// The offset is persisted before each update is dispatched, so an
    /// update is never handed to the dispatcher twice across restarts.
    async fn process_batch(&mut self, updates: &[TelegramUpdate]) -> Result<PollCycleReport> {
        let mut report = PollCycleReport {
            received_updates: updates.len(),
            ..PollCycleReport::default()
        };
        for update in updates {
            if !self.state_store.advance_offset(update.next_offset()) {
                debug!(update_id = update.update_id, "update already acknowledged");
                report.ignored_updates += 1;
                continue;
            }
            self.state_store.save().with_context(|| {
                format!("failed to persist offset for update {}", update.update_id)
            })?;
            let Some(normalized) = normalize_update(update) else {
                report.ignored_updates += 1;
                continue;
            };
            if let Some(query_id) = normalized.callback_query_id.as_deref() {
                if let Err(error) = self.client.answer_callback_query(query_id).await {
                    warn!(update_id = update.update_id, %error, "callback query answer failed");
                }
            }
            let user_id = normalized.event.user_id;
            match self.dispatcher.handle_event(normalized.event).await {
                Ok(()) => report.dispatched_events += 1,
                Err(error) => {
                    report.failed_events += 1;
                    warn!(update_id = update.update_id, user_id, %error, "reply delivery failed");
                }
            }
        }

        let previous = self.state_store.transport_health().clone();
        self.state_store
            .update_transport_health(TelegramTransportHealth {
                last_cycle_unix_ms: current_unix_timestamp_ms(),
                last_cycle_updates: report.received_updates,
                last_cycle_failed_events: report.failed_events,
                failure_streak: 0,
                total_updates: previous
                    .total_updates
                    .saturating_add(report.received_updates as u64),
            });
        self.state_store.save()?;
        Ok(report)
    }

    fn record_poll_failure(&mut self, failure_streak: usize) -> Result<()> {
        let mut health = self.state_store.transport_health().clone();
        health.last_cycle_unix_ms = current_unix_timestamp_ms();
        health.last_cycle_updates = 0;
        health.last_cycle_failed_events = 0;
        health.failure_streak = failure_streak;
        if self.state_store.update_transport_health(health) {
            self.state_store.save().with_context(|| {
                format!(
                    "failed to record poll failure in {}",
                    self.state_store.path().display()
                )
            })?;
        }
        Ok(())
    }
}
