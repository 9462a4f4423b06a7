//! Durable key-value store
//!
//! SQLite-backed store with two namespaces: the queue namespace keeps
//! full-record JSON values keyed by entry id, the cache namespace keeps
//! TTL-stamped values that are treated as absent once expired.
//!
//! The store knows nothing about queue entries or business payloads; it
//! moves opaque JSON in and out. Callers that need richer semantics
//! (ordering, status transitions) build them on top.
//!
//! `open_or_fallback` is the entry point for long-running processes: if
//! the database cannot be opened or fails its write-read-delete self
//! check, the store degrades to an in-memory database so the application
//! keeps working, at the cost of durability across restarts.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

/// Key used by the write-read-delete self check
const SELF_CHECK_KEY: &str = "__stoq_self_check__";

/// Durable store shared between the queue and its background tasks
#[derive(Debug)]
pub struct DurableStore {
    conn: Mutex<Connection>,
    persistent: bool,
}

impl DurableStore {
    /// Open or create the database under the configured data directory
    pub fn open(config: &Config) -> StorageResult<Self> {
        let path = config.db_path();
        Self::open_at(&path)
    }

    /// Open or create the database at a specific path
    pub fn open_at(path: &PathBuf) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            persistent: true,
        })
    }

    /// Open an in-memory database (tests, degraded mode)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            persistent: false,
        })
    }

    /// Open the durable database, falling back to in-memory when it is
    /// unusable
    ///
    /// The fallback keeps the engine running with queue semantics intact
    /// for the life of the process; entries will not survive a restart.
    /// Errors only if even the in-memory database cannot be opened.
    pub fn open_or_fallback(config: &Config) -> StorageResult<Self> {
        match Self::open(config).and_then(|store| {
            store.self_check()?;
            Ok(store)
        }) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config.db_path().display(),
                    "durable storage unavailable, falling back to in-memory queue"
                );
                Self::open_in_memory()
            }
        }
    }

    /// Whether entries written here survive a restart
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Verify the store is usable with a write-read-delete round trip
    pub fn self_check(&self) -> StorageResult<()> {
        let token = Utc::now().timestamp_millis().to_string();
        self.set(SELF_CHECK_KEY, &token)?;

        let read: Option<String> = self.get(SELF_CHECK_KEY)?;
        self.remove(SELF_CHECK_KEY)?;

        match read {
            Some(value) if value == token => Ok(()),
            Some(_) => Err(StorageError::SelfCheck {
                details: "read back a different value than written".to_string(),
            }),
            None => Err(StorageError::SelfCheck {
                details: "written value was not readable".to_string(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== Queue namespace ====================

    /// Write a full record under `key`, replacing any previous value
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::InvalidRecord {
            key: key.to_string(),
            source: e,
        })?;

        self.lock().execute(
            "INSERT OR REPLACE INTO queue_entries (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Read the record under `key`, if present
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let json: Option<String> = self
            .lock()
            .query_row(
                "SELECT value FROM queue_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => {
                let value =
                    serde_json::from_str(&json).map_err(|e| StorageError::InvalidRecord {
                        key: key.to_string(),
                        source: e,
                    })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Remove the record under `key`; returns whether it existed
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let affected = self
            .lock()
            .execute("DELETE FROM queue_entries WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Read every record in the queue namespace
    ///
    /// Order is unspecified; callers sort by their own criteria.
    pub fn iter_all<T: DeserializeOwned>(&self) -> StorageResult<Vec<T>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM queue_entries")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut values = Vec::new();
        for row in rows {
            let (key, json) = row?;
            let value = serde_json::from_str(&json).map_err(|e| StorageError::InvalidRecord {
                key,
                source: e,
            })?;
            values.push(value);
        }
        Ok(values)
    }

    /// Number of records in the queue namespace
    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM queue_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove every record in the queue namespace
    pub fn clear(&self) -> StorageResult<()> {
        self.lock().execute("DELETE FROM queue_entries", [])?;
        Ok(())
    }

    // ==================== Cache namespace ====================

    /// Write a cached value with a time-to-live
    pub fn cache_set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::InvalidRecord {
            key: key.to_string(),
            source: e,
        })?;

        self.lock().execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, stored_at, ttl_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                json,
                Utc::now().timestamp_millis(),
                ttl.as_millis() as i64
            ],
        )?;
        Ok(())
    }

    /// Read a cached value; expired entries are deleted and reported absent
    pub fn cache_get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let row: Option<(String, i64, i64)> = self
            .lock()
            .query_row(
                "SELECT value, stored_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((json, stored_at, ttl_ms)) = row else {
            return Ok(None);
        };

        if Utc::now().timestamp_millis() - stored_at >= ttl_ms {
            self.cache_remove(key)?;
            return Ok(None);
        }

        let value = serde_json::from_str(&json).map_err(|e| StorageError::InvalidRecord {
            key: key.to_string(),
            source: e,
        })?;
        Ok(Some(value))
    }

    /// Remove a cached value; returns whether it existed
    pub fn cache_remove(&self, key: &str) -> StorageResult<bool> {
        let affected = self
            .lock()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Number of rows in the cache namespace, expired included
    pub fn cache_count(&self) -> StorageResult<u64> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete every expired cache row; returns how many were removed
    pub fn cache_evict_expired(&self) -> StorageResult<usize> {
        let now = Utc::now().timestamp_millis();
        let affected = self.lock().execute(
            "DELETE FROM cache_entries WHERE ?1 - stored_at >= ttl_ms",
            params![now],
        )?;
        Ok(affected)
    }
}
