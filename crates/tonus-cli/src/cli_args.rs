use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

/// Flags override the optional TOML file; unset flags fall back to the file,
/// then to built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "tonus",
    about = "Telegram bot for keeping a blood-pressure diary",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "TONUS_CONFIG",
        help = "Optional TOML config file with [telegram], [database], [scheduler] and [runtime] sections"
    )]
    pub(crate) config: Option<PathBuf>,

    #[arg(
        long,
        env = "TONUS_BOT_TOKEN",
        hide_env_values = true,
        help = "Telegram bot token"
    )]
    pub(crate) bot_token: Option<String>,

    #[arg(
        long,
        env = "TONUS_TELEGRAM_API_BASE",
        help = "Base URL for the Telegram Bot API"
    )]
    pub(crate) api_base: Option<String>,

    #[arg(long, env = "TONUS_DATABASE_PATH", help = "SQLite database file")]
    pub(crate) database_path: Option<PathBuf>,

    #[arg(
        long,
        env = "TONUS_DATABASE_POOL_SIZE",
        value_parser = parse_positive_u32,
        help = "Maximum pooled SQLite connections"
    )]
    pub(crate) pool_size: Option<u32>,

    #[arg(
        long,
        env = "TONUS_SCHEDULER_INTERVAL_SECONDS",
        value_parser = parse_positive_u64,
        help = "Upper bound between reminder scheduler ticks"
    )]
    pub(crate) scheduler_interval_seconds: Option<u64>,

    #[arg(
        long,
        env = "TONUS_SCHEDULER_STATE_PATH",
        help = "Where the scheduler writes its JSON snapshot"
    )]
    pub(crate) scheduler_state_path: Option<PathBuf>,

    #[arg(
        long,
        env = "TONUS_STATE_DIR",
        help = "Directory for the Telegram runtime state file"
    )]
    pub(crate) state_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "TONUS_POLL_TIMEOUT_SECONDS",
        help = "Long-poll hold time passed to getUpdates"
    )]
    pub(crate) poll_timeout_seconds: Option<u64>,

    #[arg(
        long,
        env = "TONUS_RETRY_MAX_ATTEMPTS",
        value_parser = parse_positive_usize,
        help = "Attempts per Telegram API request, including the first"
    )]
    pub(crate) retry_max_attempts: Option<usize>,

    #[arg(
        long,
        env = "TONUS_RETRY_BASE_DELAY_MS",
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub(crate) retry_base_delay_ms: Option<u64>,

    #[arg(
        long,
        env = "TONUS_MAX_CONSECUTIVE_FAILURES",
        value_parser = parse_positive_usize,
        help = "Failed polls in a row before the process exits"
    )]
    pub(crate) max_consecutive_failures: Option<usize>,

    #[arg(
        long,
        help = "Resolve and validate configuration, print it, and exit"
    )]
    pub(crate) check_config: bool,
}
