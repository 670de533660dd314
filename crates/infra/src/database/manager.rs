//! Connection manager backed by an r2d2 SQLite pool.
//!
//! The pool validates handles on checkout, so a connection that died while
//! idle is replaced transparently; on top of that, acquisition retries a
//! few times with a short backoff before a failure surfaces as a store
//! error. There is no fallback path: if the store cannot be reached, the
//! caller gets the error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use duesync_domain::{DueSyncError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{info, warn};

use crate::errors::{map_pool, map_sql};

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const ACQUIRE_ATTEMPTS: u32 = 3;
const ACQUIRE_BACKOFF: Duration = Duration::from_millis(100);

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Exclusive custodian of the connection pool.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(map_pool)?;

        info!(db_path = %path.display(), pool_size = pool_size.max(1), "sqlite pool initialised");
        Ok(Self { pool, path })
    }

    /// Acquire a live connection, retrying transient pool failures.
    pub fn get_connection(&self) -> Result<DbConnection> {
        let mut last_err = None;
        for attempt in 1..=ACQUIRE_ATTEMPTS {
            match self.pool.get() {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    warn!(attempt, error = %err, "connection acquisition failed");
                    last_err = Some(err);
                    if attempt < ACQUIRE_ATTEMPTS {
                        std::thread::sleep(ACQUIRE_BACKOFF * attempt);
                    }
                }
            }
        }
        Err(last_err.map(map_pool).unwrap_or_else(|| {
            DueSyncError::Database("connection acquisition failed without an error".into())
        }))
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at)
             VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database is reachable and responding.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn migrations_create_the_schema() {
        let dir = TempDir::new().expect("temp dir");
        let manager = DbManager::new(dir.path().join("test.db"), 4).expect("manager");
        manager.run_migrations().expect("migrations");

        let conn = manager.get_connection().expect("connection");
        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .expect("version row");
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'due_%'",
                [],
                |row| row.get(0),
            )
            .expect("table count");
        assert_eq!(tables, 23);
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let manager = DbManager::new(dir.path().join("test.db"), 2).expect("manager");
        manager.run_migrations().expect("first run");
        manager.run_migrations().expect("second run");
        manager.health_check().expect("healthy");
    }
}
