//! Durable key/value store trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

/// A payload read back from the store.
#[derive(Debug, Clone)]
pub struct StoredValue {
  /// Serialized JSON payload
  pub data: Vec<u8>,
  /// When the payload was written
  pub stored_at: DateTime<Utc>,
}

/// One step of an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
  Set { key: String, data: Vec<u8> },
  Remove { key: String },
}

/// Trait for durable storage backends.
///
/// Writes to the same key are serialized by the implementation: the last write
/// wins and readers never observe a partially written value.
pub trait DurableStore: Send + Sync {
  /// Read the payload stored under `key`.
  fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

  /// Store `data` under `key`, replacing any previous payload.
  fn set(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;

  /// All keys currently stored.
  fn keys(&self) -> Result<Vec<String>, StoreError>;

  /// Apply every operation or none of them.
  fn write_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError>;

  /// Push buffered writes to durable media.
  fn flush(&self) -> Result<(), StoreError>;
}

/// In-memory store, lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredValue>>, StoreError> {
    self
      .entries
      .lock()
      .map_err(|e| StoreError::Poisoned(e.to_string()))
  }
}

impl DurableStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
    self.lock()?.insert(
      key.to_string(),
      StoredValue {
        data: data.to_vec(),
        stored_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, StoreError> {
    Ok(self.lock()?.keys().cloned().collect())
  }

  fn write_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
    // Holding the lock for the whole batch makes it atomic to other callers.
    let mut entries = self.lock()?;
    let now = Utc::now();
    for op in ops {
      match op {
        WriteOp::Set { key, data } => {
          entries.insert(
            key.clone(),
            StoredValue {
              data: data.clone(),
              stored_at: now,
            },
          );
        }
        WriteOp::Remove { key } => {
          entries.remove(key);
        }
      }
    }
    Ok(())
  }

  fn flush(&self) -> Result<(), StoreError> {
    Ok(())
  }
}

/// SQLite-based durable store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Backend(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Backend(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Poisoned(e.to_string()))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    self
      .lock()?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| StoreError::Backend(format!("Failed to run cache migrations: {}", e)))
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const UPSERT: &str = "INSERT OR REPLACE INTO kv_store (key, data, stored_at)
   VALUES (?, ?, datetime('now'))";

impl DurableStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, stored_at FROM kv_store WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((data, stored_at)) => Ok(Some(StoredValue {
        data,
        stored_at: parse_datetime(&stored_at)?,
      })),
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
    self.lock()?.execute(UPSERT, params![key, data])?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self
      .lock()?
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
    let keys = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }

  fn write_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    for op in ops {
      match op {
        WriteOp::Set { key, data } => {
          tx.execute(UPSERT, params![key, data])?;
        }
        WriteOp::Remove { key } => {
          tx.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        }
      }
    }

    // Dropping the transaction without commit rolls everything back.
    tx.commit()?;
    Ok(())
  }

  fn flush(&self) -> Result<(), StoreError> {
    self.lock()?.cache_flush()?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Serialization(format!("Failed to parse datetime '{}': {}", s, e)))
}
