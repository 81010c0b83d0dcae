//! Error taxonomy for the cache and synchronization layer.

use thiserror::Error;

/// Failures talking to the remote content service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteError {
  #[error("network unreachable: {0}")]
  Network(String),

  #[error("request timed out")]
  Timeout,

  #[error("remote returned status {status}")]
  Status { status: u16 },

  #[error("failed to decode remote payload: {0}")]
  Decode(String),

  /// The payload decoded but failed validation during normalization.
  #[error("invalid remote payload: {0}")]
  Invalid(String),
}

impl From<reqwest::Error> for RemoteError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      RemoteError::Timeout
    } else if let Some(status) = e.status() {
      RemoteError::Status {
        status: status.as_u16(),
      }
    } else if e.is_decode() {
      RemoteError::Decode(e.to_string())
    } else {
      RemoteError::Network(e.to_string())
    }
  }
}

/// Failures of the durable key/value store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
  #[error("storage backend error: {0}")]
  Backend(String),

  #[error("serialization error: {0}")]
  Serialization(String),

  #[error("lock poisoned: {0}")]
  Poisoned(String),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::Backend(e.to_string())
  }
}

/// Errors surfaced to callers of the cache layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  /// The remote call failed and nothing usable was cached under `key`.
  #[error("no data available for {key}: {source}")]
  StorageMiss {
    key: String,
    #[source]
    source: RemoteError,
  },

  #[error("stored entry {key} could not be read")]
  CorruptEntry { key: String },

  #[error(transparent)]
  Store(#[from] StoreError),

  /// The local progress record does not know the course or section the
  /// component belongs to and must be refreshed first.
  #[error("component {component_id} not found in progress record for course {course_id}")]
  ComponentNotFound {
    course_id: String,
    component_id: String,
  },

  #[error("session value {key} is not available")]
  SessionMissing { key: String },
}

impl CacheError {
  /// True when the error means "no data available" rather than a hard failure.
  pub fn is_miss(&self) -> bool {
    matches!(
      self,
      CacheError::StorageMiss { .. } | CacheError::CorruptEntry { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_storage_miss_keeps_remote_cause() {
    let err = CacheError::StorageMiss {
      key: "S42".to_string(),
      source: RemoteError::Timeout,
    };
    assert!(err.is_miss());
    assert_eq!(err.to_string(), "no data available for S42: request timed out");
    let source = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("request timed out"));
  }

  #[test]
  fn test_component_not_found_is_not_a_miss() {
    let err = CacheError::ComponentNotFound {
      course_id: "c1".to_string(),
      component_id: "l1".to_string(),
    };
    assert!(!err.is_miss());
  }
}
