//! `SQLite` storage: connection pool, migrations, and the [`SqliteStore`]
//! handle shared by the archive and session-record stores.

pub mod migrations;

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT_MS: u32 = 30_000;

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};\
             PRAGMA synchronous = NORMAL;"
        ))
    }
}

fn build_pool(manager: SqliteConnectionManager, pool_size: u32) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(pool_size.max(1))
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

/// Pooled handle to the archive database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let pool = build_pool(SqliteConnectionManager::file(path), pool_size)?;
        Self::migrated(pool)
    }

    /// Single-connection in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let pool = build_pool(SqliteConnectionManager::memory(), 1)?;
        Self::migrated(pool)
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = migrations::run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    pub(crate) fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}
