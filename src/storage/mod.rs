//! Reading persistence: SQLite-backed and in-memory repositories.

pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::reading::Reading;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Persistence collaborator for the history store. Always deals in the full
/// newest-first sequence.
pub trait HistoryRepository: Send + Sync {
    fn load(&self) -> Result<Vec<Reading>>;
    fn save(&self, readings: &[Reading]) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores readings in the `readings` table.
pub struct SqliteRepository {
    pool: Pool,
}

impl SqliteRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_pool(path)?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl HistoryRepository for SqliteRepository {
    fn load(&self) -> Result<Vec<Reading>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, download_mbps, upload_mbps, ping_ms
             FROM readings ORDER BY id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;

        let mut readings = Vec::new();
        for r in rows {
            let (id, ts, download_speed, upload_speed, ping) = r?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .with_context(|| format!("reading {} has malformed timestamp '{}'", id, ts))?
                .with_timezone(&Utc);
            readings.push(Reading {
                id,
                timestamp,
                download_speed,
                upload_speed,
                ping,
            });
        }
        Ok(readings)
    }

    fn save(&self, readings: &[Reading]) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM readings", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO readings (id, timestamp, download_mbps, upload_mbps, ping_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in readings {
                insert.execute(params![
                    r.id,
                    r.timestamp.to_rfc3339(),
                    r.download_speed,
                    r.upload_speed,
                    r.ping
                ])?;
            }
        }
        tx.commit().context("failed to commit reading history")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM readings", [])?;
        Ok(())
    }
}

/// Process-local repository; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    readings: Mutex<Vec<Reading>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(readings: Vec<Reading>) -> Self {
        Self {
            readings: Mutex::new(readings),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Reading>>> {
        self.readings
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository lock poisoned"))
    }
}

impl HistoryRepository for MemoryRepository {
    fn load(&self) -> Result<Vec<Reading>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, readings: &[Reading]) -> Result<()> {
        *self.lock()? = readings.to_vec();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<Reading> {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        vec![
            Reading::clamped(3, t0 + chrono::Duration::seconds(10), 88.25, 21.5, 14.0),
            Reading::clamped(2, t0 + chrono::Duration::seconds(5), 64.0, 18.75, 16.5),
            Reading::clamped(1, t0, 0.1, 0.1, 1.0),
        ]
    }

    #[test]
    fn test_sqlite_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = SqliteRepository::open(&dir.path().join("history.db"))?;

        assert!(repo.load()?.is_empty());
        repo.save(&sample())?;
        assert_eq!(repo.load()?, sample());

        // Saving a shorter sequence replaces the old one
        repo.save(&sample()[..1])?;
        assert_eq!(repo.load()?.len(), 1);

        repo.clear()?;
        assert!(repo.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_sqlite_persists_across_pools() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("history.db");
        SqliteRepository::open(&path)?.save(&sample())?;
        assert_eq!(SqliteRepository::open(&path)?.load()?, sample());
        Ok(())
    }

    #[test]
    fn test_sqlite_corrupt_row_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = SqliteRepository::open(&dir.path().join("history.db"))?;
        repo.pool().get()?.execute(
            "INSERT INTO readings (id, timestamp, download_mbps, upload_mbps, ping_ms)
             VALUES (1, 'yesterday-ish', 1.0, 1.0, 1.0)",
            [],
        )?;
        assert!(repo.load().is_err());
        Ok(())
    }

    #[test]
    fn test_memory_repository() -> Result<()> {
        let repo = MemoryRepository::new();
        repo.save(&sample())?;
        assert_eq!(repo.load()?, sample());
        repo.clear()?;
        assert!(repo.load()?.is_empty());
        Ok(())
    }
}
