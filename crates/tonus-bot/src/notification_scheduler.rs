//! Daily reminder scheduler.
//!
//! Each tick loads every enabled preference and sends the reminder to users
//! whose stored time equals the current wall-clock minute. A per-user stamp of
//! the last fired minute keeps delivery at most once per user per minute no
//! matter how ticks jitter around the boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tonus_core::{
    current_unix_timestamp_ms, duration_until_next_minute, format_canonical_time,
    truncate_time_to_minute, truncate_to_minute, write_text_atomic,
};
use tonus_store::{StoreError, UserId};
use tracing::{debug, info, instrument, warn};

use crate::bot_replies::REMINDER;
use crate::dispatcher::BotContext;

const SCHEDULER_SCHEMA_VERSION: u32 = 1;
const SCHEDULER_STATE_RUNNING: &str = "running";
const SCHEDULER_STATE_STOPPED: &str = "stopped";
const SCHEDULER_STATE_UNKNOWN: &str = "unknown";

fn scheduler_schema_version() -> u32 {
    SCHEDULER_SCHEMA_VERSION
}

fn default_run_state() -> String {
    SCHEDULER_STATE_UNKNOWN.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSchedulerConfig {
    /// Upper bound between ticks. Ticks also wake just after each minute boundary.
    pub interval: Duration,
    /// Delay past the minute boundary before the aligned tick.
    pub boundary_grace: Duration,
    pub state_path: Option<PathBuf>,
}

impl NotificationSchedulerConfig {
    fn interval_ms(&self) -> u64 {
        u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for NotificationSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            boundary_grace: Duration::from_secs(1),
            state_path: None,
        }
    }
}

/// Outcome of one tick, published on the handle's watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerTickReport {
    pub tick_count: u64,
    pub minute: Option<NaiveDateTime>,
    pub enabled_users: usize,
    pub awaiting_time_users: usize,
    pub reminders_sent: usize,
    pub send_failures: usize,
    pub suppressed_duplicates: usize,
    pub total_reminders_sent: u64,
    pub total_send_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSchedulerSnapshot {
    #[serde(default = "scheduler_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub updated_unix_ms: u64,
    #[serde(default = "default_run_state")]
    pub run_state: String,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default)]
    pub tick_count: u64,
    #[serde(default)]
    pub last_tick_unix_ms: u64,
    #[serde(default)]
    pub enabled_users: usize,
    #[serde(default)]
    pub awaiting_time_users: usize,
    #[serde(default)]
    pub reminders_sent: u64,
    #[serde(default)]
    pub send_failures: u64,
}

impl Default for NotificationSchedulerSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEDULER_SCHEMA_VERSION,
            updated_unix_ms: 0,
            run_state: default_run_state(),
            interval_ms: 0,
            tick_count: 0,
            last_tick_unix_ms: 0,
            enabled_users: 0,
            awaiting_time_users: 0,
            reminders_sent: 0,
            send_failures: 0,
        }
    }
}

impl NotificationSchedulerSnapshot {
    fn from_report(
        config: &NotificationSchedulerConfig,
        report: &SchedulerTickReport,
        run_state: &str,
    ) -> Self {
        let now_ms = current_unix_timestamp_ms();
        Self {
            schema_version: SCHEDULER_SCHEMA_VERSION,
            updated_unix_ms: now_ms,
            run_state: run_state.to_string(),
            interval_ms: config.interval_ms(),
            tick_count: report.tick_count,
            last_tick_unix_ms: if report.tick_count == 0 { 0 } else { now_ms },
            enabled_users: report.enabled_users,
            awaiting_time_users: report.awaiting_time_users,
            reminders_sent: report.total_reminders_sent,
            send_failures: report.total_send_failures,
        }
    }
}

/// Tick logic without any timer, so callers and tests drive it with explicit times.
pub struct NotificationScheduler {
    context: BotContext,
    last_fired: HashMap<UserId, NaiveDateTime>,
    tick_count: u64,
    total_reminders_sent: u64,
    total_send_failures: u64,
}

impl NotificationScheduler {
    pub fn new(context: BotContext) -> Self {
        Self {
            context,
            last_fired: HashMap::new(),
            tick_count: 0,
            total_reminders_sent: 0,
            total_send_failures: 0,
        }
    }

    /// Users with a recorded fire stamp. Stamps of users no longer enabled
    /// are dropped on every tick.
    pub fn tracked_users(&self) -> usize {
        self.last_fired.len()
    }

    pub async fn tick_now(&mut self) -> Result<SchedulerTickReport, StoreError> {
        let now = self.context.clock.now();
        self.tick(now).await
    }

    #[instrument(skip(self), fields(tick = self.tick_count + 1))]
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<SchedulerTickReport, StoreError> {
        self.tick_count = self.tick_count.saturating_add(1);
        let minute = truncate_to_minute(now);
        let preferences = self.context.store.list_enabled_preferences().await?;
        self.last_fired
            .retain(|user_id, _| preferences.iter().any(|p| p.user_id == *user_id));

        let mut report = SchedulerTickReport {
            tick_count: self.tick_count,
            minute: Some(minute),
            enabled_users: preferences.len(),
            ..SchedulerTickReport::default()
        };

        for preference in preferences {
            let Some(time_of_day) = preference.time_of_day else {
                report.awaiting_time_users += 1;
                continue;
            };
            if truncate_time_to_minute(time_of_day) != minute.time() {
                continue;
            }
            if self.last_fired.get(&preference.user_id) == Some(&minute) {
                report.suppressed_duplicates += 1;
                continue;
            }

            // Stamp before sending: a failed send is not retried within the minute.
            self.last_fired.insert(preference.user_id, minute);
            match self
                .context
                .facade
                .send_text(preference.user_id, REMINDER)
                .await
            {
                Ok(()) => {
                    report.reminders_sent += 1;
                    info!(
                        user_id = preference.user_id,
                        time = %format_canonical_time(time_of_day),
                        "reminder sent"
                    );
                }
                Err(error) => {
                    report.send_failures += 1;
                    warn!(user_id = preference.user_id, %error, "reminder send failed");
                }
            }
        }

        self.total_reminders_sent += report.reminders_sent as u64;
        self.total_send_failures += report.send_failures as u64;
        report.total_reminders_sent = self.total_reminders_sent;
        report.total_send_failures = self.total_send_failures;
        debug!(
            enabled = report.enabled_users,
            sent = report.reminders_sent,
            suppressed = report.suppressed_duplicates,
            "scheduler tick complete"
        );
        Ok(report)
    }
}

/// Sleep before the next tick: the configured interval, cut short so a tick
/// lands just after the next minute boundary.
pub fn next_tick_delay(config: &NotificationSchedulerConfig, now: NaiveDateTime) -> Duration {
    config
        .interval
        .min(duration_until_next_minute(now) + config.boundary_grace)
}

#[derive(Debug)]
pub struct NotificationSchedulerHandle {
    state_path: Option<PathBuf>,
    reports: watch::Receiver<SchedulerTickReport>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl NotificationSchedulerHandle {
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Receiver of the latest tick report.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerTickReport> {
        self.reports.clone()
    }

    pub fn latest_report(&self) -> SchedulerTickReport {
        self.reports.borrow().clone()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub fn start_notification_scheduler(
    config: NotificationSchedulerConfig,
    context: BotContext,
) -> Result<NotificationSchedulerHandle> {
    if config.interval.is_zero() {
        anyhow::bail!("notification scheduler interval must be greater than zero");
    }
    let runtime = tokio::runtime::Handle::try_current()
        .context("notification scheduler requires an active Tokio runtime")?;

    if let Some(state_path) = &config.state_path {
        let bootstrap = NotificationSchedulerSnapshot::from_report(
            &config,
            &SchedulerTickReport::default(),
            SCHEDULER_STATE_RUNNING,
        );
        persist_scheduler_snapshot(state_path, &bootstrap)?;
    }

    let (report_tx, report_rx) = watch::channel(SchedulerTickReport::default());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let state_path = config.state_path.clone();
    info!(
        interval_ms = config.interval_ms(),
        "notification scheduler started"
    );
    let task = runtime.spawn(async move {
        run_notification_scheduler_loop(config, context, report_tx, shutdown_rx).await;
    });
    Ok(NotificationSchedulerHandle {
        state_path,
        reports: report_rx,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

pub fn inspect_notification_scheduler(state_path: &Path) -> Result<NotificationSchedulerSnapshot> {
    let raw = std::fs::read_to_string(state_path)
        .with_context(|| format!("failed to read {}", state_path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", state_path.display()))
}

async fn run_notification_scheduler_loop(
    config: NotificationSchedulerConfig,
    context: BotContext,
    report_tx: watch::Sender<SchedulerTickReport>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let clock = context.clock.clone();
    let mut scheduler = NotificationScheduler::new(context);
    let mut last_report = SchedulerTickReport::default();
    let mut delay = Duration::ZERO;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                match scheduler.tick_now().await {
                    Ok(report) => {
                        last_report = report;
                        report_tx.send_replace(last_report.clone());
                    }
                    Err(error) => warn!(%error, "scheduler tick could not load preferences"),
                }
                persist_if_configured(&config, &last_report, SCHEDULER_STATE_RUNNING);
                delay = next_tick_delay(&config, clock.now());
            }
            _ = &mut shutdown_rx => {
                persist_if_configured(&config, &last_report, SCHEDULER_STATE_STOPPED);
                info!(ticks = last_report.tick_count, "notification scheduler stopped");
                break;
            }
        }
    }
}

fn persist_if_configured(
    config: &NotificationSchedulerConfig,
    report: &SchedulerTickReport,
    run_state: &str,
) {
    let Some(state_path) = &config.state_path else {
        return;
    };
    let snapshot = NotificationSchedulerSnapshot::from_report(config, report, run_state);
    if let Err(error) = persist_scheduler_snapshot(state_path, &snapshot) {
        warn!(path = %state_path.display(), %error, "scheduler snapshot persist failed");
    }
}

fn persist_scheduler_snapshot(
    state_path: &Path,
    snapshot: &NotificationSchedulerSnapshot,
) -> Result<()> {
    let payload = serde_json::to_string_pretty(snapshot)
        .context("failed to serialize notification scheduler snapshot")?;
    write_text_atomic(state_path, &payload)
}
