//! SQLite-backed `ReadingStore` implementation over a pooled connection set.

use crate::{
    EnabledPreference, NotificationPreference, Reading, ReadingDraft, ReadingStore, StoreError,
    StoreResult, UserId,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonus_core::{
    format_canonical_date, format_canonical_time, parse_canonical_date, parse_canonical_time,
};
use tracing::{debug, instrument};

/// Connections kept by the pool when no size is configured.
pub const DEFAULT_POOL_SIZE: u32 = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dates are stored as `DD-MM-YYYY`; this expression yields a sortable `YYYYMMDD`.
const SORTABLE_DATE_SQL: &str = "substr(date, 7, 4) || substr(date, 4, 2) || substr(date, 1, 2)";

type DbConn = PooledConnection<SqliteConnectionManager>;

/// Persistent SQLite store shared by the dispatcher and the scheduler.
///
/// Every operation checks out one pooled connection for its whole duration;
/// the guard hands it back when dropped, whichever way the operation exits.
pub struct SqliteReadingStore {
    db_path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for SqliteReadingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReadingStore")
            .field("db_path", &self.db_path)
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

impl SqliteReadingStore {
    /// Opens the store at `path` with [`DEFAULT_POOL_SIZE`] connections.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    /// Opens the store at `path`, creating parent directories and schema if needed.
    #[instrument(skip(path), fields(db_path = %path.as_ref().display()))]
    pub fn with_pool_size(path: impl AsRef<Path>, pool_size: u32) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(|connection| {
            connection.busy_timeout(BUSY_TIMEOUT)?;
            connection.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)?;

        let store = Self { db_path, pool };
        store.initialize_schema()?;
        debug!(pool_size, "sqlite reading store ready");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> StoreResult<DbConn> {
        Ok(self.pool.get()?)
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let connection = self.connection()?;
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                systolic INTEGER NOT NULL,
                diastolic INTEGER NOT NULL,
                pulse INTEGER NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_user_date ON readings (user_id, date);

            CREATE TABLE IF NOT EXISTS preferences (
                user_id INTEGER PRIMARY KEY,
                notify_time TEXT NULL,
                enabled INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn query_readings(
        &self,
        filter_sql: &str,
        params: &[&dyn rusqlite::ToSql],
        order_sql: &str,
    ) -> StoreResult<Vec<Reading>> {
        let connection = self.connection()?;
        let sql = format!(
            "SELECT id, user_id, systolic, diastolic, pulse, date, time FROM readings \
             WHERE {filter_sql} ORDER BY {order_sql}"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(params, RawReading::from_row)?;
        let mut readings = Vec::new();
        for row in rows {
            readings.push(row?.into_reading()?);
        }
        Ok(readings)
    }

    fn query_dates(
        &self,
        filter_sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        let connection = self.connection()?;
        let sql = format!("SELECT DISTINCT date FROM readings WHERE {filter_sql}");
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(params, |row| row.get::<_, String>(0))?;
        let mut dates = BTreeSet::new();
        for row in rows {
            dates.insert(parse_date_field("readings.date", &row?)?);
        }
        Ok(dates)
    }
}

fn chronological_order() -> String {
    format!("{SORTABLE_DATE_SQL}, time, id")
}

fn year_text(year: i32) -> String {
    format!("{year:04}")
}

fn month_text(month: Option<u32>) -> Option<String> {
    month.map(|month| format!("{month:02}"))
}

#[async_trait]
impl ReadingStore for SqliteReadingStore {
    #[instrument(skip(self, draft), fields(user_id = draft.user_id))]
    async fn insert_reading(&self, draft: ReadingDraft) -> StoreResult<Reading> {
        let connection = self.connection()?;
        connection.execute(
            "INSERT INTO readings (user_id, systolic, diastolic, pulse, date, time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.user_id,
                i64::from(draft.systolic),
                i64::from(draft.diastolic),
                i64::from(draft.pulse),
                format_canonical_date(draft.date),
                format_canonical_time(draft.time),
            ],
        )?;
        let sequence_id = connection.last_insert_rowid();
        Ok(Reading::from_draft(sequence_id, draft))
    }

    async fn distinct_dates(&self, user_id: UserId) -> StoreResult<BTreeSet<NaiveDate>> {
        self.query_dates("user_id = ?1", &[&user_id])
    }

    async fn distinct_dates_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        let year = year_text(year);
        let month = month_text(month);
        self.query_dates(
            "user_id = ?1 AND substr(date, 7, 4) = ?2 AND (?3 IS NULL OR substr(date, 4, 2) = ?3)",
            &[&user_id, &year, &month],
        )
    }

    async fn readings_on(&self, user_id: UserId, date: NaiveDate) -> StoreResult<Vec<Reading>> {
        let date = format_canonical_date(date);
        self.query_readings("user_id = ?1 AND date = ?2", &[&user_id, &date], "time, id")
    }

    async fn readings_matching(
        &self,
        user_id: UserId,
        year: i32,
        month: Option<u32>,
    ) -> StoreResult<Vec<Reading>> {
        let year = year_text(year);
        let month = month_text(month);
        self.query_readings(
            "user_id = ?1 AND substr(date, 7, 4) = ?2 AND (?3 IS NULL OR substr(date, 4, 2) = ?3)",
            &[&user_id, &year, &month],
            &chronological_order(),
        )
    }

    async fn all_readings(&self, user_id: UserId) -> StoreResult<Vec<Reading>> {
        self.query_readings("user_id = ?1", &[&user_id], &chronological_order())
    }

    async fn count_readings(&self, user_id: UserId) -> StoreResult<u64> {
        let connection = self.connection()?;
        let count = connection.query_row(
            "SELECT COUNT(*) FROM readings WHERE user_id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )?;
        i64_to_u64("readings.count", count)
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, user_id: UserId) -> StoreResult<u64> {
        let connection = self.connection()?;
        let removed = connection.execute("DELETE FROM readings WHERE user_id = ?1", params![user_id])?;
        Ok(removed as u64)
    }

    #[instrument(skip(self))]
    async fn delete_most_recent(&self, user_id: UserId) -> StoreResult<Option<Reading>> {
        let mut connection = self.connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let latest = transaction
            .query_row(
                "SELECT id, user_id, systolic, diastolic, pulse, date, time FROM readings
                 WHERE id = (SELECT MAX(id) FROM readings WHERE user_id = ?1)",
                params![user_id],
                RawReading::from_row,
            )
            .optional()?;
        let Some(latest) = latest else {
            return Ok(None);
        };
        transaction.execute("DELETE FROM readings WHERE id = ?1", params![latest.id])?;
        transaction.commit()?;
        Ok(Some(latest.into_reading()?))
    }

    async fn get_preference(
        &self,
        user_id: UserId,
    ) -> StoreResult<Option<NotificationPreference>> {
        let connection = self.connection()?;
        let row = connection
            .query_row(
                "SELECT notify_time, enabled FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        row.map(|(notify_time, enabled)| {
            Ok(NotificationPreference {
                time_of_day: parse_optional_time(notify_time)?,
                enabled: enabled != 0,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn upsert_preference(
        &self,
        user_id: UserId,
        time_of_day: Option<NaiveTime>,
        enabled: bool,
    ) -> StoreResult<()> {
        let connection = self.connection()?;
        connection.execute(
            "INSERT INTO preferences (user_id, notify_time, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                notify_time = excluded.notify_time,
                enabled = excluded.enabled",
            params![user_id, time_of_day.map(format_canonical_time), enabled],
        )?;
        Ok(())
    }

    async fn ensure_preference(&self, user_id: UserId) -> StoreResult<()> {
        let connection = self.connection()?;
        connection.execute(
            "INSERT INTO preferences (user_id, notify_time, enabled) VALUES (?1, NULL, 0)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id],
        )?;
        Ok(())
    }

    async fn list_enabled_preferences(&self) -> StoreResult<Vec<EnabledPreference>> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT user_id, notify_time FROM preferences WHERE enabled = 1 ORDER BY user_id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut enabled = Vec::new();
        for row in rows {
            let (user_id, notify_time) = row?;
            enabled.push(EnabledPreference {
                user_id,
                time_of_day: parse_optional_time(notify_time)?,
            });
        }
        Ok(enabled)
    }
}

struct RawReading {
    id: i64,
    user_id: i64,
    systolic: i64,
    diastolic: i64,
    pulse: i64,
    date: String,
    time: String,
}

impl RawReading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            systolic: row.get(2)?,
            diastolic: row.get(3)?,
            pulse: row.get(4)?,
            date: row.get(5)?,
            time: row.get(6)?,
        })
    }

    fn into_reading(self) -> StoreResult<Reading> {
        Ok(Reading {
            sequence_id: self.id,
            user_id: self.user_id,
            systolic: i64_to_u16("readings.systolic", self.systolic)?,
            diastolic: i64_to_u16("readings.diastolic", self.diastolic)?,
            pulse: i64_to_u16("readings.pulse", self.pulse)?,
            date: parse_date_field("readings.date", &self.date)?,
            time: parse_time_field("readings.time", &self.time)?,
        })
    }
}

fn parse_date_field(field: &'static str, value: &str) -> StoreResult<NaiveDate> {
    parse_canonical_date(value).ok_or_else(|| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn parse_time_field(field: &'static str, value: &str) -> StoreResult<NaiveTime> {
    parse_canonical_time(value).ok_or_else(|| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn parse_optional_time(value: Option<String>) -> StoreResult<Option<NaiveTime>> {
    value
        .as_deref()
        .map(|value| parse_time_field("preferences.notify_time", value))
        .transpose()
}

fn i64_to_u16(field: &'static str, value: i64) -> StoreResult<u16> {
    u16::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn i64_to_u64(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::SqliteReadingStore;
    use crate::{NotificationPreference, ReadingDraft, ReadingStore, StoreError};
    use chrono::{NaiveDate, NaiveTime};
    use rusqlite::{params, Connection};
    use tempfile::tempdir;

    fn date(day: u32, month: u32, year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("date")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("time")
    }

    fn draft(user_id: i64, day: NaiveDate, at: NaiveTime, systolic: u16) -> ReadingDraft {
        ReadingDraft {
            user_id,
            systolic,
            diastolic: 80,
            pulse: 64,
            date: day,
            time: at,
        }
    }

    #[tokio::test]
    async fn persists_readings_and_preferences_across_reopen() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("nested").join("readings.sqlite");

        {
            let store = SqliteReadingStore::new(&db_path).expect("create sqlite store");
            store
                .insert_reading(draft(11, date(1, 3, 2024), time(8, 15), 121))
                .await
                .expect("insert reading");
            store
                .upsert_preference(11, Some(time(8, 0)), true)
                .await
                .expect("upsert preference");
        }

        let reopened = SqliteReadingStore::new(&db_path).expect("reopen sqlite store");
        let readings = reopened
            .readings_on(11, date(1, 3, 2024))
            .await
            .expect("readings on");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].systolic, 121);
        assert_eq!(readings[0].time, time(8, 15));
        assert_eq!(
            reopened.get_preference(11).await.expect("preference"),
            Some(NotificationPreference {
                time_of_day: Some(time(8, 0)),
                enabled: true,
            })
        );
    }

    #[tokio::test]
    async fn functional_period_queries_sort_chronologically_not_lexically() {
        let temp = tempdir().expect("create tempdir");
        let store = SqliteReadingStore::with_pool_size(temp.path().join("r.sqlite"), 2)
            .expect("create sqlite store");
        for (day, at, systolic) in [
            (date(15, 3, 2024), time(9, 0), 130),
            (date(2, 4, 2024), time(9, 0), 140),
            (date(1, 3, 2024), time(21, 0), 125),
            (date(1, 3, 2024), time(7, 30), 120),
            (date(31, 12, 2023), time(7, 30), 110),
        ] {
            store
                .insert_reading(draft(3, day, at, systolic))
                .await
                .expect("insert");
        }

        let march = store
            .distinct_dates_matching(3, 2024, Some(3))
            .await
            .expect("march dates");
        assert_eq!(
            march.into_iter().collect::<Vec<_>>(),
            vec![date(1, 3, 2024), date(15, 3, 2024)]
        );

        let year = store
            .readings_matching(3, 2024, None)
            .await
            .expect("year readings");
        let systolic = year.iter().map(|r| r.systolic).collect::<Vec<_>>();
        assert_eq!(systolic, vec![120, 125, 130, 140]);

        let all = store.all_readings(3).await.expect("all readings");
        assert_eq!(all.first().map(|r| r.systolic), Some(110));
        assert_eq!(store.count_readings(3).await.expect("count"), 5);
        assert_eq!(store.distinct_dates(3).await.expect("dates").len(), 4);
    }

    #[tokio::test]
    async fn functional_delete_most_recent_uses_max_sequence_id() {
        let temp = tempdir().expect("create tempdir");
        let store =
            SqliteReadingStore::new(temp.path().join("r.sqlite")).expect("create sqlite store");
        store
            .insert_reading(draft(1, date(5, 3, 2024), time(8, 0), 120))
            .await
            .expect("first");
        store
            .insert_reading(draft(2, date(5, 3, 2024), time(8, 0), 150))
            .await
            .expect("other user");
        let latest = store
            .insert_reading(draft(1, date(1, 1, 2024), time(6, 0), 135))
            .await
            .expect("latest insert with older date");

        let removed = store
            .delete_most_recent(1)
            .await
            .expect("delete most recent")
            .expect("removed row");
        assert_eq!(removed.sequence_id, latest.sequence_id);
        assert_eq!(removed.systolic, 135);
        assert_eq!(store.count_readings(1).await.expect("count"), 1);
        assert_eq!(store.count_readings(2).await.expect("count other"), 1);

        assert_eq!(store.delete_all(1).await.expect("delete all"), 1);
        assert!(store.all_readings(1).await.expect("empty").is_empty());
        assert!(store
            .delete_most_recent(1)
            .await
            .expect("delete on empty")
            .is_none());
    }

    #[tokio::test]
    async fn functional_ensure_preference_keeps_existing_row() {
        let temp = tempdir().expect("create tempdir");
        let store =
            SqliteReadingStore::new(temp.path().join("r.sqlite")).expect("create sqlite store");
        store.ensure_preference(4).await.expect("ensure");
        assert_eq!(
            store.get_preference(4).await.expect("get"),
            Some(NotificationPreference::disabled())
        );
        store
            .upsert_preference(4, None, true)
            .await
            .expect("enable pending time");
        store.ensure_preference(4).await.expect("ensure again");

        let enabled = store.list_enabled_preferences().await.expect("enabled");
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].user_id, 4);
        assert_eq!(enabled[0].time_of_day, None);

        store.upsert_preference(4, None, false).await.expect("off");
        store.upsert_preference(4, None, false).await.expect("off twice");
        assert_eq!(
            store.get_preference(4).await.expect("get"),
            Some(NotificationPreference::disabled())
        );
        assert!(store
            .list_enabled_preferences()
            .await
            .expect("none enabled")
            .is_empty());
    }

    #[tokio::test]
    async fn regression_corrupt_date_surfaces_invalid_persisted_value() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("r.sqlite");
        let store = SqliteReadingStore::new(&db_path).expect("create sqlite store");
        {
            let raw = Connection::open(&db_path).expect("open raw connection");
            raw.execute(
                "INSERT INTO readings (user_id, systolic, diastolic, pulse, date, time)
                 VALUES (?1, 120, 80, 60, '2024-03-01', '08:00')",
                params![9_i64],
            )
            .expect("insert corrupt row");
        }

        let error = store.all_readings(9).await.expect_err("corrupt date");
        assert!(matches!(
            error,
            StoreError::InvalidPersistedValue {
                field: "readings.date",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn regression_single_connection_pool_survives_error_paths() {
        let temp = tempdir().expect("create tempdir");
        let db_path = temp.path().join("r.sqlite");
        let store = SqliteReadingStore::with_pool_size(&db_path, 1).expect("create sqlite store");
        {
            let raw = Connection::open(&db_path).expect("open raw connection");
            raw.execute(
                "INSERT INTO preferences (user_id, notify_time, enabled) VALUES (1, 'late', 1)",
                [],
            )
            .expect("insert corrupt preference");
        }

        for _ in 0..3 {
            assert!(store.list_enabled_preferences().await.is_err());
            assert!(store.delete_most_recent(1).await.expect("empty").is_none());
        }
        store
            .insert_reading(draft(1, date(1, 3, 2024), time(8, 0), 120))
            .await
            .expect("pool still serves connections");
    }
}
