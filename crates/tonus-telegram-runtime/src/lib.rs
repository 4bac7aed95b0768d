//! Telegram transport for the Tonus bot.
//!
//! Long-polls `getUpdates`, normalizes messages and button presses into
//! inbound events for the dispatcher, and delivers replies through a
//! [`BotFacade`](tonus_bot::BotFacade) backed by the Bot API.

mod telegram_runtime;

pub use telegram_runtime::{
    run_telegram_bot, PollCycleReport, TelegramBotFacade, TelegramRuntime, TelegramRuntimeConfig,
    TelegramTransportHealth, DEFAULT_TELEGRAM_API_BASE,
};
