//! Telegram update payloads and their normalization into inbound events.

use serde::Deserialize;
use tonus_bot::InboundEvent;

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramUser {
    pub(super) id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramChat {
    pub(super) id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramMessage {
    #[serde(default)]
    pub(super) from: Option<TelegramUser>,
    pub(super) chat: TelegramChat,
    #[serde(default)]
    pub(super) text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramCallbackQuery {
    pub(super) id: String,
    pub(super) from: TelegramUser,
    #[serde(default)]
    pub(super) data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramUpdate {
    pub(super) update_id: i64,
    #[serde(default)]
    pub(super) message: Option<TelegramMessage>,
    #[serde(default)]
    pub(super) callback_query: Option<TelegramCallbackQuery>,
}

impl TelegramUpdate {
    /// Offset that acknowledges this update on the next `getUpdates`.
    pub(super) fn next_offset(&self) -> i64 {
        self.update_id.saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct NormalizedUpdate {
    pub(super) event: InboundEvent,
    /// Set for button presses; the query must be answered to stop the client spinner.
    pub(super) callback_query_id: Option<String>,
}

/// Maps an update to an inbound event. Updates without text or callback data
/// (stickers, photos, edits, joins) yield `None`.
pub(super) fn normalize_update(update: &TelegramUpdate) -> Option<NormalizedUpdate> {
    if let Some(query) = &update.callback_query {
        let data = query.data.as_deref()?;
        return Some(NormalizedUpdate {
            event: InboundEvent::button_press(query.from.id, data),
            callback_query_id: Some(query.id.clone()),
        });
    }

    let message = update.message.as_ref()?;
    let text = message.text.as_deref().map(str::trim)?;
    if text.is_empty() {
        return None;
    }
    let user_id = message
        .from
        .as_ref()
        .map(|user| user.id)
        .unwrap_or(message.chat.id);
    let event = if text.starts_with('/') {
        InboundEvent::command(user_id, text)
    } else {
        InboundEvent::free_text(user_id, text)
    };
    Some(NormalizedUpdate {
        event,
        callback_query_id: None,
    })
}
