//! Render-cache storage (spec §4.3): SQLite metadata index over a
//! content-addressed directory of rendered page/crop bytes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, warn};

use crate::key::CacheKey;

#[derive(Debug, Error)]
pub enum RenderCacheError {
    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache index error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type RenderCacheResult<T> = Result<T, RenderCacheError>;

/// A process-wide evidence render cache: a directory of payload files plus a
/// SQLite index of `(cache_key, source_id, source_version, file_path,
/// size_bytes, created_at, last_access_at)` rows.
///
/// One `RenderCache` is shared behind an `Arc` for the life of the process;
/// all access is serialised through the inner `Mutex<Connection>`.
pub struct RenderCache {
    dir: PathBuf,
    conn: Mutex<Connection>,
    max_bytes: u64,
    ttl_seconds: i64,
}

impl RenderCache {
    /// Opens (creating if absent) the cache directory and its SQLite index.
    pub fn open(dir: impl AsRef<Path>, max_mb: u64, ttl_days: u64) -> RenderCacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index_path = dir.join("index.sqlite3");
        let conn = Connection::open(index_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_version TEXT NOT NULL,
                file_name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_access_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_entries_source ON cache_entries(source_id);
            CREATE INDEX IF NOT EXISTS idx_cache_entries_last_access ON cache_entries(last_access_at);",
        )?;

        Ok(Self {
            dir,
            conn: Mutex::new(conn),
            max_bytes: max_mb.saturating_mul(1024 * 1024),
            ttl_seconds: (ttl_days as i64).saturating_mul(86_400),
        })
    }

    fn payload_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Returns the cached bytes for `key` if an unexpired, present entry
    /// exists. A row whose backing file went missing is lazily deleted and
    /// treated as a miss.
    pub fn get(&self, key: &CacheKey) -> RenderCacheResult<Option<Vec<u8>>> {
        let cache_key = key.as_string();
        let conn = self.conn.lock().expect("render cache mutex poisoned");

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT file_name, created_at FROM cache_entries WHERE cache_key = ?1",
                params![cache_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((file_name, created_at)) = row else {
            return Ok(None);
        };

        if self.ttl_seconds > 0 && now_unix() - created_at > self.ttl_seconds {
            delete_entry(&conn, &cache_key, &self.payload_path(&file_name))?;
            return Ok(None);
        }

        let path = self.payload_path(&file_name);
        match fs::read(&path) {
            Ok(bytes) => {
                conn.execute(
                    "UPDATE cache_entries SET last_access_at = ?1 WHERE cache_key = ?2",
                    params![now_unix(), cache_key],
                )?;
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(cache_key, "render cache payload missing on disk, evicting stale row");
                conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", params![cache_key])?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `bytes` under `key`, upserting the metadata row, then sweeps
    /// and evicts to stay under the configured size budget.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> RenderCacheResult<()> {
        let cache_key = key.as_string();
        let file_name = key.file_name();
        let path = self.payload_path(&file_name);

        fs::write(&path, bytes)?;

        let size_bytes = bytes.len() as i64;
        let now = now_unix();
        {
            let conn = self.conn.lock().expect("render cache mutex poisoned");
            conn.execute(
                "INSERT INTO cache_entries
                    (cache_key, source_id, source_version, file_name, size_bytes, created_at, last_access_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(cache_key) DO UPDATE SET
                    file_name = excluded.file_name,
                    size_bytes = excluded.size_bytes,
                    created_at = excluded.created_at,
                    last_access_at = excluded.last_access_at",
                params![cache_key, key.source_id, key.source_version, file_name, size_bytes, now],
            )?;
        }

        self.ensure_space(size_bytes as u64)
    }

    /// Removes every entry belonging to `source_id`, across all versions.
    pub fn invalidate(&self, source_id: &str) -> RenderCacheResult<()> {
        let prefix = CacheKey::source_prefix(source_id);
        let conn = self.conn.lock().expect("render cache mutex poisoned");

        let mut stmt = conn.prepare("SELECT cache_key, file_name FROM cache_entries WHERE source_id = ?1")?;
        let rows: Vec<(String, String)> = stmt
            .query_map(params![source_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        for (cache_key, file_name) in rows {
            delete_entry(&conn, &cache_key, &self.payload_path(&file_name))?;
        }

        debug!(source_id, prefix, "invalidated render cache entries");
        Ok(())
    }

    /// Sweeps TTL-expired rows, then evicts least-recently-used entries
    /// until the index total plus `needed` fits the configured budget.
    fn ensure_space(&self, needed: u64) -> RenderCacheResult<()> {
        let conn = self.conn.lock().expect("render cache mutex poisoned");

        if self.ttl_seconds > 0 {
            let cutoff = now_unix() - self.ttl_seconds;
            let mut stmt = conn.prepare("SELECT cache_key, file_name FROM cache_entries WHERE created_at < ?1")?;
            let expired: Vec<(String, String)> = stmt
                .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?;
            drop(stmt);
            for (cache_key, file_name) in expired {
                delete_entry(&conn, &cache_key, &self.payload_path(&file_name))?;
            }
        }

        let total: i64 = conn.query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries", [], |row| row.get(0))?;
        let mut total = total as u64;

        if total.saturating_add(needed) <= self.max_bytes {
            return Ok(());
        }

        let mut stmt = conn.prepare(
            "SELECT cache_key, file_name, size_bytes FROM cache_entries ORDER BY last_access_at ASC",
        )?;
        let candidates: Vec<(String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        for (cache_key, file_name, size_bytes) in candidates {
            if total.saturating_add(needed) <= self.max_bytes {
                break;
            }
            delete_entry(&conn, &cache_key, &self.payload_path(&file_name))?;
            total = total.saturating_sub(size_bytes as u64);
        }

        Ok(())
    }
}

fn delete_entry(conn: &Connection, cache_key: &str, path: &Path) -> RenderCacheResult<()> {
    conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", params![cache_key])?;
    match fs::remove_file(path) {
        Ok(()) | Err(_) if !path.exists() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
