use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tonus_core::write_text_atomic;

use super::TELEGRAM_STATE_SCHEMA_VERSION;

/// Outcome of the most recent poll cycles, persisted for operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramTransportHealth {
    #[serde(default)]
    pub last_cycle_unix_ms: u64,
    #[serde(default)]
    pub last_cycle_updates: usize,
    #[serde(default)]
    pub last_cycle_failed_events: usize,
    #[serde(default)]
    pub failure_streak: usize,
    #[serde(default)]
    pub total_updates: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TelegramRuntimeState {
    schema_version: u32,
    #[serde(default)]
    next_update_offset: Option<i64>,
    #[serde(default)]
    health: TelegramTransportHealth,
}

impl Default for TelegramRuntimeState {
    fn default() -> Self {
        Self {
            schema_version: TELEGRAM_STATE_SCHEMA_VERSION,
            next_update_offset: None,
            health: TelegramTransportHealth::default(),
        }
    }
}

pub(super) struct TelegramStateStore {
    path: PathBuf,
    state: TelegramRuntimeState,
}

impl TelegramStateStore {
    pub(super) fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str::<TelegramRuntimeState>(&raw).with_context(|| {
                format!("failed to parse telegram runtime state file {}", path.display())
            })?
        } else {
            TelegramRuntimeState::default()
        };

        if state.schema_version != TELEGRAM_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported telegram runtime state schema: expected {}, found {}",
                TELEGRAM_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }
        Ok(Self { path, state })
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// Zero until the first update is acknowledged.
    pub(super) fn next_update_offset(&self) -> i64 {
        self.state.next_update_offset.unwrap_or(0)
    }

    /// Offsets only move forward.
    pub(super) fn advance_offset(&mut self, offset: i64) -> bool {
        if offset <= self.next_update_offset() {
            return false;
        }
        self.state.next_update_offset = Some(offset);
        true
    }

    pub(super) fn transport_health(&self) -> &TelegramTransportHealth {
        &self.state.health
    }

    pub(super) fn update_transport_health(&mut self, value: TelegramTransportHealth) -> bool {
        if self.state.health == value {
            return false;
        }
        self.state.health = value;
        true
    }

    pub(super) fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.state).context("failed to serialize state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write state file {}", self.path.display()))?;
        Ok(())
    }
}
