use crate::error::Result;
use crate::{WindowCheckpoint, WindowSnapshot};
use chrono::Utc;
use printwatch_common::types::Sample;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CHECKPOINT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS window_checkpoints (
    device_id TEXT NOT NULL,
    parameter TEXT NOT NULL,
    samples TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, parameter)
);
";

const CHECKPOINT_FILE: &str = "checkpoints.db";

/// SQLite-backed [`WindowCheckpoint`]: one row per (device, parameter)
/// holding the JSON-encoded samples.
pub struct SqliteCheckpoint {
    conn: Mutex<Connection>,
}

impl SqliteCheckpoint {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(CHECKPOINT_FILE))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CHECKPOINT_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WindowCheckpoint for SqliteCheckpoint {
    fn save(&self, device_id: &str, parameter: &str, samples: &[Sample]) -> Result<()> {
        let encoded = serde_json::to_string(samples)?;
        let conn = self.lock_conn();
        conn.prepare_cached(
            "INSERT INTO window_checkpoints (device_id, parameter, samples, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id, parameter)
             DO UPDATE SET samples = excluded.samples, updated_at = excluded.updated_at",
        )?
        .execute(params![
            device_id,
            parameter,
            encoded,
            Utc::now().timestamp_millis()
        ])?;
        Ok(())
    }

    fn load(&self, device_id: &str) -> Result<WindowSnapshot> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT parameter, samples FROM window_checkpoints WHERE device_id = ?1",
        )?;
        let rows = stmt.query_map(params![device_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = WindowSnapshot::new();
        for row in rows {
            let (parameter, encoded) = row?;
            let samples: Vec<Sample> = serde_json::from_str(&encoded)?;
            snapshot.insert(parameter, samples);
        }
        Ok(snapshot)
    }

    fn remove(&self, device_id: &str) -> Result<usize> {
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM window_checkpoints WHERE device_id = ?1",
            params![device_id],
        )?;
        if removed > 0 {
            tracing::debug!(device_id, removed, "Dropped window checkpoint");
        }
        Ok(removed)
    }
}
