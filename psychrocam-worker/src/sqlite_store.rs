//! SQLite-backed shared store
//!
//! Several worker processes open the same database file; WAL journaling and a
//! busy timeout let them read and write concurrently. Expiry is lazy: expired
//! rows are invisible to every query and removed when next touched.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;
use psychrocam_core::{KeyValueStore, StoreError, StoreResult, SystemTime, TimeSource};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER
);";

const LIVE: &str = "(expires_at IS NULL OR expires_at > ?2)";

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// [`KeyValueStore`] persisted in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn TimeSource>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemTime))
    }

    /// Open with an explicit time source for expiry
    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn TimeSource>) -> StoreResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path.as_ref(), flags).map_err(db_err)?;
        apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("Opened shared store at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemTime),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn now(&self) -> i64 {
        i64::try_from(self.clock.now()).unwrap_or(i64::MAX)
    }
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;").map_err(db_err)?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(db_err)?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT value FROM kv WHERE key = ?1 AND {LIVE}"),
            params![key, self.now()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL",
            params![key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM kv WHERE key = ?1 AND {LIVE}"),
                params![key, self.now()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    fn delete(&self, keys: &[&str]) -> StoreResult<usize> {
        let now = self.now();
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        let mut removed = 0;
        for key in keys {
            removed += tx
                .execute(&format!("DELETE FROM kv WHERE key = ?1 AND {LIVE}"), params![key, now])
                .map_err(db_err)?;
            // Expired leftovers
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(removed)
    }

    fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        let updated = conn
            .execute(
                &format!("UPDATE kv SET expires_at = ?3 WHERE key = ?1 AND {LIVE}"),
                params![key, now, now.saturating_add(ttl_ms)],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key FROM kv WHERE substr(key, 1, ?3) = ?1 AND {LIVE} ORDER BY key"
            ))
            .map_err(db_err)?;
        let width = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![prefix, self.now(), width], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}
