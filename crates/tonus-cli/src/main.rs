mod bootstrap_helpers;
mod bot_config;
mod cli_args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tonus_bot::{start_notification_scheduler, BotContext, BotDispatcher};
use tonus_core::LocalWallClock;
use tonus_store::SqliteReadingStore;
use tonus_telegram_runtime::{run_telegram_bot, TelegramBotFacade};
use tracing::info;

use crate::bootstrap_helpers::{init_tracing, shutdown_signal};
use crate::bot_config::BotConfig;
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = BotConfig::resolve(&cli)?;
    if cli.check_config {
        println!("{config}");
        return Ok(());
    }
    run_bot(config).await
}

async fn run_bot(config: BotConfig) -> Result<()> {
    let store = SqliteReadingStore::with_pool_size(&config.database_path, config.pool_size)
        .with_context(|| {
            format!(
                "failed to open reading store {}",
                config.database_path.display()
            )
        })?;
    let facade = TelegramBotFacade::from_config(&config.telegram)?;
    let context = BotContext::new(
        Arc::new(store),
        Arc::new(facade),
        Arc::new(LocalWallClock),
    );
    let dispatcher = Arc::new(BotDispatcher::new(context));
    let mut scheduler =
        start_notification_scheduler(config.scheduler.clone(), dispatcher.context().clone())?;

    info!(
        database = %config.database_path.display(),
        state_dir = %config.telegram.state_dir.display(),
        "tonus bot started"
    );
    let result = run_telegram_bot(config.telegram, dispatcher, shutdown_signal()).await;
    scheduler.shutdown().await;
    info!("tonus bot stopped");
    result
}
