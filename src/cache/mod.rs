//! Durable caching layer for offline support.
//!
//! This module provides a content-agnostic caching mechanism that:
//! - Persists serialized payloads under typed string keys
//! - Reads network-first and writes every successful fetch through to the store
//! - Falls back to the stored copy when the network is unavailable
//! - Applies multi-key writes atomically

mod keys;
mod layer;
mod result;
mod storage;

pub use keys::CacheKey;
pub use layer::{encode, set_op, CacheLayer, Cached};
pub use result::{CacheResult, CacheSource};
pub use storage::{DurableStore, MemoryStore, SqliteStore, StoredValue, WriteOp};
