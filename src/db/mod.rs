use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod memory;
pub mod models;

use crate::drift::BaselineSnapshot;
pub use memory::MemoryStore;
use models::PredictionRecord;

/// Persistence adapter for the prediction history and its frozen baseline.
///
/// `put` is an upsert keyed by record id; `range` returns records whose
/// timestamp falls in `[from, to]`, oldest first.
pub trait PredictionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<PredictionRecord>>;

    fn put(&self, record: &PredictionRecord) -> Result<()>;

    fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PredictionRecord>>;

    /// Delete records by id. Unknown ids are ignored.
    fn remove(&self, ids: &[String]) -> Result<()>;

    fn get_baseline(&self) -> Result<Option<BaselineSnapshot>>;

    /// Store the baseline, or clear it with `None`.
    fn put_baseline(&self, baseline: Option<&BaselineSnapshot>) -> Result<()>;

    /// Swap the entire contents for `records` and `baseline` atomically.
    fn replace_all(
        &self,
        records: &[PredictionRecord],
        baseline: Option<&BaselineSnapshot>,
    ) -> Result<()>;
}

/// Durable SQLite-backed prediction store (single connection with mutex)
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Throwaway database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Number of stored predictions
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let n = conn.query_row("SELECT COUNT(*) FROM predictions", [], |r| r.get(0))?;
        Ok(n)
    }
}

impl PredictionStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<PredictionRecord>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM predictions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| decode_record(&p))
            .transpose()
    }

    fn put(&self, record: &PredictionRecord) -> Result<()> {
        let conn = self.lock()?;
        upsert(&conn, record)
    }

    fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PredictionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM predictions
             WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms ASC, rowid ASC",
        )?;
        let payloads = stmt
            .query_map(
                params![from.timestamp_millis(), to.timestamp_millis()],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        payloads.iter().map(|p| decode_record(p)).collect()
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM predictions WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_baseline(&self) -> Result<Option<BaselineSnapshot>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM baseline WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).context("Corrupt baseline payload"))
            .transpose()
    }

    fn put_baseline(&self, baseline: Option<&BaselineSnapshot>) -> Result<()> {
        let conn = self.lock()?;
        write_baseline(&conn, baseline)
    }

    fn replace_all(
        &self,
        records: &[PredictionRecord],
        baseline: Option<&BaselineSnapshot>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM predictions", [])?;
        for record in records {
            upsert(&tx, record)?;
        }
        write_baseline(&tx, baseline)?;
        tx.commit().context("Failed to commit prediction import")?;
        Ok(())
    }
}

fn upsert(conn: &Connection, record: &PredictionRecord) -> Result<()> {
    let payload = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO predictions (id, timestamp_ms, league, settled, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            timestamp_ms=excluded.timestamp_ms,
            league=excluded.league,
            settled=excluded.settled,
            payload=excluded.payload",
        params![
            record.id,
            record.timestamp.timestamp_millis(),
            record.league,
            record.is_settled(),
            payload,
        ],
    )?;
    Ok(())
}

fn write_baseline(conn: &Connection, baseline: Option<&BaselineSnapshot>) -> Result<()> {
    match baseline {
        Some(b) => {
            conn.execute(
                "INSERT INTO baseline (id, payload) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET payload=excluded.payload",
                params![serde_json::to_string(b)?],
            )?;
        }
        None => {
            conn.execute("DELETE FROM baseline", [])?;
        }
    }
    Ok(())
}

fn decode_record(payload: &str) -> Result<PredictionRecord> {
    serde_json::from_str(payload).context("Corrupt prediction payload")
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id           TEXT    PRIMARY KEY,
    timestamp_ms INTEGER NOT NULL,
    league       TEXT    NOT NULL,
    settled      INTEGER NOT NULL DEFAULT 0,
    payload      TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_predictions_league ON predictions(league);

-- Single-row table holding the frozen drift baseline
CREATE TABLE IF NOT EXISTS baseline (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT    NOT NULL
);
"#;
