//! Resolved process configuration: flags, then the TOML file, then defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tonus_bot::NotificationSchedulerConfig;
use tonus_store::DEFAULT_POOL_SIZE;
use tonus_telegram_runtime::{TelegramRuntimeConfig, DEFAULT_TELEGRAM_API_BASE};

use crate::cli_args::Cli;

const DEFAULT_DATABASE_PATH: &str = ".tonus/tonus.db";
const DEFAULT_STATE_DIR: &str = ".tonus/telegram";
const SCHEDULER_STATE_FILE_NAME: &str = "scheduler.json";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    telegram: TelegramSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    scheduler: SchedulerSection,
    #[serde(default)]
    runtime: RuntimeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelegramSection {
    bot_token: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseSection {
    path: Option<PathBuf>,
    pool_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerSection {
    interval_seconds: Option<u64>,
    state_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuntimeSection {
    state_dir: Option<PathBuf>,
    poll_timeout_seconds: Option<u64>,
    retry_max_attempts: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    max_consecutive_failures: Option<usize>,
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

pub(crate) struct BotConfig {
    pub(crate) database_path: PathBuf,
    pub(crate) pool_size: u32,
    pub(crate) scheduler: NotificationSchedulerConfig,
    pub(crate) telegram: TelegramRuntimeConfig,
}

impl fmt::Display for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "database_path = {}", self.database_path.display())?;
        writeln!(f, "pool_size = {}", self.pool_size)?;
        writeln!(
            f,
            "scheduler_interval_seconds = {}",
            self.scheduler.interval.as_secs()
        )?;
        if let Some(state_path) = &self.scheduler.state_path {
            writeln!(f, "scheduler_state_path = {}", state_path.display())?;
        }
        writeln!(f, "telegram_api_base = {}", self.telegram.api_base)?;
        writeln!(f, "telegram_state_dir = {}", self.telegram.state_dir.display())?;
        writeln!(
            f,
            "poll_timeout_seconds = {}",
            self.telegram.poll_timeout_seconds
        )?;
        writeln!(f, "retry_max_attempts = {}", self.telegram.retry_max_attempts)?;
        write!(
            f,
            "max_consecutive_failures = {}",
            self.telegram.max_consecutive_failures
        )
    }
}

impl BotConfig {
    pub(crate) fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Self::from_sources(cli, file)
    }

    fn from_sources(cli: &Cli, file: ConfigFile) -> Result<Self> {
        let ConfigFile {
            telegram,
            database,
            scheduler,
            runtime,
        } = file;
        let telegram_defaults = TelegramRuntimeConfig::default();
        let scheduler_defaults = NotificationSchedulerConfig::default();

        let bot_token = cli
            .bot_token
            .clone()
            .or(telegram.bot_token)
            .map(|token| token.trim().to_string())
            .unwrap_or_default();
        if bot_token.is_empty() {
            bail!("telegram bot token is required (--bot-token, TONUS_BOT_TOKEN or [telegram] bot_token)");
        }

        let pool_size = cli
            .pool_size
            .or(database.pool_size)
            .unwrap_or(DEFAULT_POOL_SIZE);
        if pool_size == 0 {
            bail!("database pool_size must be greater than 0");
        }

        let interval_seconds = cli
            .scheduler_interval_seconds
            .or(scheduler.interval_seconds)
            .unwrap_or(scheduler_defaults.interval.as_secs());
        if interval_seconds == 0 {
            bail!("scheduler interval_seconds must be greater than 0");
        }

        let state_dir = cli
            .state_dir
            .clone()
            .or(runtime.state_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let scheduler_state_path = cli
            .scheduler_state_path
            .clone()
            .or(scheduler.state_path)
            .unwrap_or_else(|| state_dir.join(SCHEDULER_STATE_FILE_NAME));

        let telegram = TelegramRuntimeConfig {
            api_base: cli
                .api_base
                .clone()
                .or(telegram.api_base)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            bot_token,
            state_dir,
            poll_timeout_seconds: cli
                .poll_timeout_seconds
                .or(runtime.poll_timeout_seconds)
                .unwrap_or(telegram_defaults.poll_timeout_seconds),
            request_timeout_ms: telegram_defaults.request_timeout_ms,
            retry_max_attempts: cli
                .retry_max_attempts
                .or(runtime.retry_max_attempts)
                .unwrap_or(telegram_defaults.retry_max_attempts)
                .max(1),
            retry_base_delay_ms: cli
                .retry_base_delay_ms
                .or(runtime.retry_base_delay_ms)
                .unwrap_or(telegram_defaults.retry_base_delay_ms),
            reconnect_delay: runtime
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(telegram_defaults.reconnect_delay),
            max_consecutive_failures: cli
                .max_consecutive_failures
                .or(runtime.max_consecutive_failures)
                .unwrap_or(telegram_defaults.max_consecutive_failures)
                .max(1),
        };

        Ok(Self {
            database_path: cli
                .database_path
                .clone()
                .or(database.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            pool_size,
            scheduler: NotificationSchedulerConfig {
                interval: Duration::from_secs(interval_seconds),
                state_path: Some(scheduler_state_path),
                ..scheduler_defaults
            },
            telegram,
        })
    }
}
