//! Transport seam: outbound delivery and normalized inbound events.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tonus_navigation::Menu;
use tonus_store::UserId;

use crate::chart_render::ChartImage;

/// Commands offered on the persistent reply keyboard.
pub const COMMAND_KEYBOARD: [&str; 4] = ["/notify", "/delete", "/get", "/graph"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Command,
    FreeText,
    ButtonPress,
}

/// Inbound event raised by a transport. For `ButtonPress` the payload is the
/// navigation token echoed back by the button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub kind: InboundKind,
    pub payload: String,
}

impl InboundEvent {
    pub fn command(user_id: UserId, payload: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: InboundKind::Command,
            payload: payload.into(),
        }
    }

    pub fn free_text(user_id: UserId, payload: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: InboundKind::FreeText,
            payload: payload.into(),
        }
    }

    pub fn button_press(user_id: UserId, payload: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: InboundKind::ButtonPress,
            payload: payload.into(),
        }
    }
}

/// Outbound delivery to one user. Implementations own formatting details such
/// as inline keyboards and multipart uploads.
#[async_trait]
pub trait BotFacade: Send + Sync {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<()>;
    async fn send_menu(&self, user_id: UserId, menu: &Menu) -> Result<()>;
    async fn send_image(&self, user_id: UserId, image: &ChartImage) -> Result<()>;
    async fn send_command_keyboard(
        &self,
        user_id: UserId,
        text: &str,
        commands: &[&str],
    ) -> Result<()>;
}

/// Message captured by [`RecordingBotFacade`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text {
        user_id: UserId,
        text: String,
    },
    Menu {
        user_id: UserId,
        menu: Menu,
    },
    Image {
        user_id: UserId,
        caption: String,
        png: Vec<u8>,
    },
    CommandKeyboard {
        user_id: UserId,
        text: String,
        commands: Vec<String>,
    },
}

impl OutboundMessage {
    pub fn user_id(&self) -> UserId {
        match self {
            OutboundMessage::Text { user_id, .. }
            | OutboundMessage::Menu { user_id, .. }
            | OutboundMessage::Image { user_id, .. }
            | OutboundMessage::CommandKeyboard { user_id, .. } => *user_id,
        }
    }

    /// Text, menu prompt, image caption or keyboard text.
    pub fn text(&self) -> &str {
        match self {
            OutboundMessage::Text { text, .. } | OutboundMessage::CommandKeyboard { text, .. } => {
                text
            }
            OutboundMessage::Menu { menu, .. } => &menu.prompt,
            OutboundMessage::Image { caption, .. } => caption,
        }
    }
}

/// In-process facade that records every send. Used by tests and dry runs;
/// `fail_sends` makes every send return an error.
#[derive(Debug, Default)]
pub struct RecordingBotFacade {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_sends: bool,
}

impl RecordingBotFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.lock().clone()
    }

    /// Returns and clears everything recorded so far.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutboundMessage>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, message: OutboundMessage) -> Result<()> {
        if self.fail_sends {
            anyhow::bail!("recording facade configured to fail sends to {}", message.user_id());
        }
        self.lock().push(message);
        Ok(())
    }
}

#[async_trait]
impl BotFacade for RecordingBotFacade {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<()> {
        self.record(OutboundMessage::Text {
            user_id,
            text: text.to_string(),
        })
    }

    async fn send_menu(&self, user_id: UserId, menu: &Menu) -> Result<()> {
        self.record(OutboundMessage::Menu {
            user_id,
            menu: menu.clone(),
        })
    }

    async fn send_image(&self, user_id: UserId, image: &ChartImage) -> Result<()> {
        self.record(OutboundMessage::Image {
            user_id,
            caption: image.caption.clone(),
            png: image.png.clone(),
        })
    }

    async fn send_command_keyboard(
        &self,
        user_id: UserId,
        text: &str,
        commands: &[&str],
    ) -> Result<()> {
        self.record(OutboundMessage::CommandKeyboard {
            user_id,
            text: text.to_string(),
            commands: commands.iter().map(|command| command.to_string()).collect(),
        })
    }
}
