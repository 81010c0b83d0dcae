//! Session values owned by the authentication collaborator.
//!
//! This layer only reads them; they are written at login and cleared at logout.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{CacheKey, CacheLayer};
use crate::error::CacheError;

/// Profile stored under `@userInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
  pub id: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub email: String,
}

/// The logged-in user as seen by the cache layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub user_id: String,
  pub user_info: Option<UserInfo>,
  pub login_token: Option<String>,
}

impl Session {
  /// Read the session from the store. Only `@userId` is required.
  ///
  /// `@userId` and `@loginToken` hold plain strings; a JSON-quoted value is
  /// accepted too. An empty or non UTF-8 value counts as absent.
  pub fn load(cache: &CacheLayer) -> Result<Self, CacheError> {
    let user_id = Self::raw_string(cache, &CacheKey::UserId)?.ok_or_else(|| {
      CacheError::SessionMissing {
        key: CacheKey::UserId.storage_key(),
      }
    })?;

    Ok(Self {
      user_id,
      user_info: Self::user_info(cache)?,
      login_token: Self::raw_string(cache, &CacheKey::LoginToken)?,
    })
  }

  fn raw_string(cache: &CacheLayer, key: &CacheKey) -> Result<Option<String>, CacheError> {
    let Some(stored) = cache.store().get(&key.storage_key())? else {
      return Ok(None);
    };
    let Ok(text) = String::from_utf8(stored.data) else {
      warn!(key = %key, "ignoring non UTF-8 session value");
      return Ok(None);
    };

    let text = text.trim();
    let value = if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
      serde_json::from_str::<String>(text).unwrap_or_else(|_| text.to_string())
    } else {
      text.to_string()
    };
    Ok(Some(value).filter(|v| !v.is_empty()))
  }

  fn user_info(cache: &CacheLayer) -> Result<Option<UserInfo>, CacheError> {
    match cache.load::<UserInfo>(&CacheKey::UserInfo) {
      Ok(v) => Ok(v.map(|c| c.value)),
      Err(CacheError::CorruptEntry { .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Token for authenticated submissions.
  pub fn token(&self) -> Result<&str, CacheError> {
    self
      .login_token
      .as_deref()
      .ok_or_else(|| CacheError::SessionMissing {
        key: CacheKey::LoginToken.storage_key(),
      })
  }
}
