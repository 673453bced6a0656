//! SQLite persistence for study plans and generation history.

mod history;
mod schema;
mod study_plans;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::Stats;

pub use study_plans::PlanWrite;

const DB_FILENAME: &str = "study-planner.db";

/// Handle to the study planner database.
///
/// Cheap to clone; all clones share one connection behind a mutex, so every
/// read-modify-write done while the lock is held is atomic with respect to
/// the scheduler and the API.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tracing::info!("Opening database at {}", path.display());

        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Ok(Self::from_connection(conn))
    }

    /// Open the database in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "study-planner")
            .ok_or_else(|| anyhow!("could not determine a data directory"))?;
        Self::open(&dirs.data_dir().join(DB_FILENAME))
    }

    pub fn open_in_memory() -> Result<Self> {
        tracing::debug!("Opening in-memory database");
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Apply the schema. Safe to call on every start.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("database lock poisoned: {e}"))
    }

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(Stats {
            notes_generated: count("SELECT COUNT(*) FROM history")?,
            plans_total: count("SELECT COUNT(*) FROM study_plans")?,
            plans_completed: count("SELECT COUNT(*) FROM study_plans WHERE status = 'completed'")?,
            plans_pending: count(
                "SELECT COUNT(*) FROM study_plans WHERE status IN ('not_started', 'pending', 'processing')",
            )?,
            plans_failed: count("SELECT COUNT(*) FROM study_plans WHERE status = 'failed'")?,
        })
    }
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Fixed-width RFC 3339 so that SQL string comparison orders like time.
pub(crate) fn to_sql_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, format!("bad id {raw:?}: {e}")))
}

pub(crate) fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sql_time_is_fixed_width_utc() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(to_sql_time(at), "2024-01-01T00:00:00.000Z");
        assert_eq!(parse_time(0, &to_sql_time(at)).unwrap(), at);
    }

    #[test]
    fn open_creates_file_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join(DB_FILENAME);

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        db.migrate().unwrap();

        assert!(path.exists());
        assert_eq!(db.stats().unwrap(), Stats::default());
    }
}
