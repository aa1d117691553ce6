use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension};
use sos_activation::{AlertReport, AlertRepository};
use uuid::Uuid;

use crate::preferences::PreferenceStore;
use crate::{Result, StorageError};

pub const DATA_DIR_NAME: &str = "emergency-sos";
pub const DATABASE_FILE_NAME: &str = "sos.db";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open the database at [`Database::default_path`], creating the
    /// directory if needed.
    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&path)
    }

    /// `<data dir>/emergency-sos/sos.db` for the current user.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        Ok(base.join(DATA_DIR_NAME).join(DATABASE_FILE_NAME))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                activation INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                delivered INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                report_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    pub fn get_alert(&self, id: &Uuid) -> Result<AlertReport> {
        let json: String = self
            .conn()
            .query_row(
                "SELECT report_json FROM alerts WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(format!("alert {id}")),
                other => StorageError::DatabaseError(other),
            })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn clear_alerts(&self) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM alerts", [])?)
    }
}

impl PreferenceStore for Database {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

impl AlertRepository for Database {
    type Error = StorageError;

    fn save_alert(&self, report: &AlertReport) -> Result<()> {
        let json = serde_json::to_string(report)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO alerts (id, activation, created_at, delivered, failed, report_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                report.alert.id.to_string(),
                report.alert.activation.0 as i64,
                report.alert.timestamp.timestamp_millis(),
                report.delivered() as i64,
                report.failed() as i64,
                json,
            ),
        )?;
        tracing::debug!(alert_id = %report.alert.id, "alert saved");
        Ok(())
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, report_json FROM alerts ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut reports = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match serde_json::from_str(&json) {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!(alert_id = %id, "skipping unreadable alert: {}", e),
            }
        }
        Ok(reports)
    }
}
