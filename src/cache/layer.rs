//! Cache layer that orchestrates network fetching with fallback to the store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::result::CacheResult;
use super::storage::{DurableStore, WriteOp};
use crate::error::{CacheError, RemoteError, StoreError};

/// A typed value read back from the store.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  pub value: T,
  pub stored_at: DateTime<Utc>,
}

/// Cache layer that manages write-through caching and offline fallback.
///
/// This layer sits between the application and the remote client. Every read
/// goes to the network first; the store is only consulted when that fails.
pub struct CacheLayer {
  store: Arc<dyn DurableStore>,
}

impl CacheLayer {
  /// Create a new cache layer over the given store.
  pub fn new(store: Arc<dyn DurableStore>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<dyn DurableStore> {
    &self.store
  }

  /// Fetch with network-first strategy.
  ///
  /// 1. Call the fetcher and normalize its payload
  /// 2. On success, overwrite the stored copy under `key` and return it
  /// 3. On failure, return the stored copy (offline mode)
  /// 4. With nothing stored, fail with `StorageMiss` wrapping the remote error
  pub async fn fetch_with_fallback<R, T, F, Fut, N>(
    &self,
    key: &CacheKey,
    fetcher: F,
    normalize: N,
  ) -> Result<CacheResult<T>, CacheError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, RemoteError>>,
    N: FnOnce(R) -> Result<T, RemoteError>,
  {
    let remote_error = match fetcher().await.and_then(normalize) {
      Ok(data) => {
        // A failed write-through must not hide fresh data from the caller.
        if let Err(e) = self.write(key, &data) {
          warn!(key = %key, error = %e, "write-through failed for {}", key.description());
        }
        debug!(key = %key, "fetched {} from network", key.description());
        return Ok(CacheResult::from_network(data));
      }
      Err(e) => e,
    };

    match self.load::<T>(key) {
      Ok(Some(cached)) => {
        warn!(
          key = %key,
          error = %remote_error,
          "serving cached {} while offline",
          key.description()
        );
        Ok(CacheResult::offline(cached.value, cached.stored_at))
      }
      Ok(None) => Err(CacheError::StorageMiss {
        key: key.storage_key(),
        source: remote_error,
      }),
      Err(e) => {
        warn!(key = %key, error = %e, "cached {} unusable", key.description());
        Err(CacheError::StorageMiss {
          key: key.storage_key(),
          source: remote_error,
        })
      }
    }
  }

  /// Read and deserialize the value stored under `key`.
  ///
  /// A payload that fails to deserialize is reported as `CorruptEntry`.
  pub fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<Cached<T>>, CacheError> {
    let Some(stored) = self.store.get(&key.storage_key())? else {
      return Ok(None);
    };

    match serde_json::from_slice(&stored.data) {
      Ok(value) => Ok(Some(Cached {
        value,
        stored_at: stored.stored_at,
      })),
      Err(e) => {
        warn!(key = %key, error = %e, "failed to deserialize {}", key.description());
        Err(CacheError::CorruptEntry {
          key: key.storage_key(),
        })
      }
    }
  }

  /// Serialize `value` and store it under `key`.
  pub fn write<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), StoreError> {
    self.store.set(&key.storage_key(), &encode(value)?)
  }

  pub fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
    self.store.remove(&key.storage_key())
  }

  pub fn contains(&self, key: &CacheKey) -> Result<bool, StoreError> {
    Ok(self.store.get(&key.storage_key())?.is_some())
  }

  pub fn write_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
    self.store.write_batch(ops)
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}

/// Serialize a value into the stored payload format.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
  serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Build a batch `Set` for `value` under `key`.
pub fn set_op<T: Serialize>(key: &CacheKey, value: &T) -> Result<WriteOp, StoreError> {
  Ok(WriteOp::Set {
    key: key.storage_key(),
    data: encode(value)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStore;
  use crate::cache::CacheSource;

  fn layer() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryStore::new()))
  }

  fn key() -> CacheKey {
    CacheKey::sections("c1")
  }

  #[tokio::test]
  async fn test_success_writes_through() {
    let cache = layer();
    let result = cache
      .fetch_with_fallback(&key(), || async { Ok(vec![1u32, 2]) }, |v| Ok(v))
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec![1, 2]);
    let cached = cache.load::<Vec<u32>>(&key()).unwrap().unwrap();
    assert_eq!(cached.value, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_failure_serves_previous_value() {
    let cache = layer();
    cache
      .fetch_with_fallback(&key(), || async { Ok(vec![7u32]) }, |v| Ok(v))
      .await
      .unwrap();

    let result = cache
      .fetch_with_fallback(
        &key(),
        || async { Err::<Vec<u32>, _>(RemoteError::Timeout) },
        |v| Ok(v),
      )
      .await
      .unwrap();

    assert!(result.is_offline());
    assert_eq!(result.data, vec![7]);
    assert!(result.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_failure_without_cache_is_storage_miss() {
    let cache = layer();
    let err = cache
      .fetch_with_fallback(
        &key(),
        || async { Err::<Vec<u32>, _>(RemoteError::Status { status: 503 }) },
        |v| Ok(v),
      )
      .await
      .unwrap_err();

    match err {
      CacheError::StorageMiss { key, source } => {
        assert_eq!(key, "Sc1");
        assert_eq!(source, RemoteError::Status { status: 503 });
      }
      other => panic!("expected StorageMiss, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_corrupt_entry_is_a_miss() {
    let cache = layer();
    cache.store().set("Sc1", b"{not json").unwrap();

    assert!(matches!(
      cache.load::<Vec<u32>>(&key()),
      Err(CacheError::CorruptEntry { .. })
    ));

    let err = cache
      .fetch_with_fallback(
        &key(),
        || async { Err::<Vec<u32>, _>(RemoteError::Timeout) },
        |v| Ok(v),
      )
      .await
      .unwrap_err();
    assert!(err.is_miss());
  }

  #[tokio::test]
  async fn test_invalid_payload_takes_fallback_path() {
    let cache = layer();
    cache.write(&key(), &vec![3u32]).unwrap();

    let result = cache
      .fetch_with_fallback(
        &key(),
        || async { Ok(vec![0u32]) },
        |_| Err::<Vec<u32>, _>(RemoteError::Invalid("empty id".to_string())),
      )
      .await
      .unwrap();

    assert!(result.is_offline());
    assert_eq!(result.data, vec![3]);
  }
}
