//! Durable storage for the governor's day records.
//!
//! One row per trading date, the whole record as one JSON document,
//! replaced wholesale on every write; there is no field-level merge.
//! Storage sits behind a trait so the full stack runs in tests against an
//! in-memory database.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use twd_risk::DailyState;

/// Whole-document persistence for [`DailyState`].
pub trait StateStore: Send + Sync {
    /// The record for one date, if any.
    fn load_day(&self, date: NaiveDate) -> Result<Option<DailyState>>;

    /// The record with the most recent date in the store.
    fn load_latest(&self) -> Result<Option<DailyState>>;

    /// Insert or replace the record keyed by `day.date`.
    fn save_day(&self, day: &DailyState) -> Result<()>;
}

/// SQLite-backed store. The connection sits behind a mutex so one store
/// can be shared across async tasks as `Arc<dyn StateStore>`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).context("opening state database")?;
        Self::init(conn)
    }

    /// Private throwaway database for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("opening in-memory state database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS daily_state (
                date TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("state database mutex poisoned"))
    }
}

impl StateStore for SqliteStore {
    fn load_day(&self, date: NaiveDate) -> Result<Option<DailyState>> {
        let conn = self.lock()?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM daily_state WHERE date = ?1",
                params![date.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| serde_json::from_str(&d).context("decoding stored day record"))
            .transpose()
    }

    fn load_latest(&self) -> Result<Option<DailyState>> {
        let conn = self.lock()?;
        // ISO dates sort lexicographically in chronological order.
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM daily_state ORDER BY date DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| serde_json::from_str(&d).context("decoding stored day record"))
            .transpose()
    }

    fn save_day(&self, day: &DailyState) -> Result<()> {
        let doc = serde_json::to_string(day).context("encoding day record")?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO daily_state (date, doc, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET
                 doc = excluded.doc,
                 updated_at = excluded.updated_at",
            params![day.date.to_string(), doc, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
