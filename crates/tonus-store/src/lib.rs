//! Reading store abstractions and in-memory backend.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use sqlite::{SqliteReadingStore, DEFAULT_POOL_SIZE};

/// Chat platform user identifier. Readings and preferences are keyed by it.
pub type UserId = i64;

/// Result type for reading store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Validated reading waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingDraft {
    pub user_id: UserId,
    pub systolic: u16,
    pub diastolic: u16,
    pub pulse: u16,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Persisted vital-sign triplet. `sequence_id` grows monotonically per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub sequence_id: i64,
    pub user_id: UserId,
    pub systolic: u16,
    pub diastolic: u16,
    pub pulse: u16,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl Reading {
    fn from_draft(sequence_id: i64, draft: ReadingDraft) -> Self {
        Self {
            sequence_id,
            user_id: draft.user_id,
            systolic: draft.systolic,
            diastolic: draft.diastolic,
            pulse: draft.pulse,
            date: draft.date,
            time: draft.time,
        }
    }

    fn chronological_key(&self) -> (NaiveDate, NaiveTime, i64) {
        (self.date, self.time, self.sequence_id)
    }
}

/// Per-user reminder configuration. At most one exists per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub time_of_day: Option<NaiveTime>,
    pub enabled: bool,
}

impl NotificationPreference {
    pub const fn disabled() -> Self {
        Self {
            time_of_day: None,
            enabled: false,
        }
    }
}

/// Row returned by [`ReadingStore::list_enabled_preferences`]. A `None` time
/// means the user enabled reminders and has not supplied a time yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledPreference {
    pub user_id: UserId,
    pub time_of_day: Option<NaiveTime>,
}

/// Async store contract shared by the dispatcher and the notification scheduler.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert_reading(&self, draft: ReadingDraft) -> StoreResult<Reading>;

    async fn distinct_dates(&self, user_id: UserId) -> StoreResult<BTreeSet<NaiveDate>>;
    async fn distinct_dates_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<BTreeSet<NaiveDate>>;

    /// Readings for one day ordered by time of day, then sequence id.
    async fn readings_on(&self, user_id: UserId, date: NaiveDate) -> StoreResult<Vec<Reading>>;
    /// Readings for a year or a month, in chronological order.
    async fn readings_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<Vec<Reading>>;
    async fn all_readings(&self, user_id: UserId) -> StoreResult<Vec<Reading>>;
    async fn count_readings(&self, user_id: UserId) -> StoreResult<u64>;

    /// Removes every reading of the user, returning how many were removed.
    async fn delete_all(&self, user_id: UserId) -> StoreResult<u64>;
    /// Removes the reading with the highest sequence id for the user.
    async fn delete_most_recent(&self, user_id: UserId) -> StoreResult<Option<Reading>>;

    async fn get_preference(&self, user_id: UserId)
        -> StoreResult<Option<NotificationPreference>>;
    /// Single atomic write keyed by user id.
    async fn upsert_preference(
        &self,
        user_id: UserId,
        time_of_day: Option<NaiveTime>,
        enabled: bool,
    ) -> StoreResult<()>;
    /// Creates a disabled preference unless one already exists.
    async fn ensure_preference(&self, user_id: UserId) -> StoreResult<()>;
    async fn list_enabled_preferences(&self) -> StoreResult<Vec<EnabledPreference>>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_sequence_id: i64,
    readings: Vec<Reading>,
    preferences: HashMap<UserId, NotificationPreference>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_period(date: NaiveDate, year: i32, month: Option<u32>) -> bool {
    date.year() == year && month.map_or(true, |month| date.month() == month)
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn insert_reading(&self, draft: ReadingDraft) -> StoreResult<Reading> {
        let mut inner = self.inner.write().await;
        inner.next_sequence_id += 1;
        let reading = Reading::from_draft(inner.next_sequence_id, draft);
        inner.readings.push(reading.clone());
        Ok(reading)
    }

    async fn distinct_dates(&self, user_id: UserId) -> StoreResult<BTreeSet<NaiveDate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id)
            .map(|reading| reading.date)
            .collect())
    }

    async fn distinct_dates_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id)
            .filter(|reading| matches_period(reading.date, year, month))
            .map(|reading| reading.date)
            .collect())
    }

    async fn readings_on(&self, user_id: UserId, date: NaiveDate) -> StoreResult<Vec<Reading>> {
        let inner = self.inner.read().await;
        let mut readings = inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id && reading.date == date)
            .cloned()
            .collect::<Vec<_>>();
        readings.sort_by_key(|reading| (reading.time, reading.sequence_id));
        Ok(readings)
    }

    async fn readings_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<Vec<Reading>> {
        let inner = self.inner.read().await;
        let mut readings = inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id)
            .filter(|reading| matches_period(reading.date, year, month))
            .cloned()
            .collect::<Vec<_>>();
        readings.sort_by_key(Reading::chronological_key);
        Ok(readings)
    }

    async fn all_readings(&self, user_id: UserId) -> StoreResult<Vec<Reading>> {
        let inner = self.inner.read().await;
        let mut readings = inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        readings.sort_by_key(Reading::chronological_key);
        Ok(readings)
    }

    async fn count_readings(&self, user_id: UserId) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .readings
            .iter()
            .filter(|reading| reading.user_id == user_id)
            .count() as u64)
    }

    async fn delete_all(&self, user_id: UserId) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.readings.len();
        inner.readings.retain(|reading| reading.user_id != user_id);
        Ok((before - inner.readings.len()) as u64)
    }

    async fn delete_most_recent(&self, user_id: UserId) -> StoreResult<Option<Reading>> {
        let mut inner = self.inner.write().await;
        let position = inner
            .readings
            .iter()
            .enumerate()
            .filter(|(_, reading)| reading.user_id == user_id)
            .max_by_key(|(_, reading)| reading.sequence_id)
            .map(|(index, _)| index);
        Ok(position.map(|index| inner.readings.remove(index)))
    }

    async fn get_preference(
        &self,
        user_id: UserId,
    ) -> StoreResult<Option<NotificationPreference>> {
        let inner = self.inner.read().await;
        Ok(inner.preferences.get(&user_id).copied())
    }

    async fn upsert_preference(
        &self,
        user_id: UserId,
        time_of_day: Option<NaiveTime>,
        enabled: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.preferences.insert(
            user_id,
            NotificationPreference {
                time_of_day,
                enabled,
            },
        );
        Ok(())
    }

    async fn ensure_preference(&self, user_id: UserId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .preferences
            .entry(user_id)
            .or_insert_with(NotificationPreference::disabled);
        Ok(())
    }

    async fn list_enabled_preferences(&self) -> StoreResult<Vec<EnabledPreference>> {
        let inner = self.inner.read().await;
        let mut enabled = inner
            .preferences
            .iter()
            .filter(|(_, preference)| preference.enabled)
            .map(|(user_id, preference)| EnabledPreference {
                user_id: *user_id,
                time_of_day: preference.time_of_day,
            })
            .collect::<Vec<_>>();
        enabled.sort_by_key(|preference| preference.user_id);
        Ok(enabled)
    }
}
