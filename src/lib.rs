//! Offline content cache and progress synchronization for course content.
//!
//! Every read goes to the remote service first and falls back to the local
//! store when the network is unavailable. Whole courses can be mirrored for
//! offline use, and completion events are reconciled with the server's
//! authoritative progress record.

pub mod cache;
pub mod config;
pub mod content;
pub mod download;
pub mod error;
pub mod logging;
pub mod media;
pub mod model;
pub mod progress;
pub mod remote;
pub mod session;
pub mod sync;
pub mod time;

use std::sync::Arc;
use tracing::info;

pub use cache::{CacheKey, CacheLayer, CacheResult, CacheSource, DurableStore, MemoryStore, SqliteStore};
pub use config::Config;
pub use content::ContentCache;
pub use download::DownloadManager;
pub use error::{CacheError, RemoteError, StoreError};
pub use media::{ImagePayload, VideoJob, VideoQueue};
pub use progress::ProgressTracker;
pub use remote::{HttpContentService, RemoteContentService};
pub use session::Session;
pub use sync::{Completion, SyncReconciler};
pub use time::Clock;

/// The cache layer wired together for the logged-in user.
///
/// Owns every component; the host creates one per session and calls
/// [`OfflineCourses::shutdown`] when the session ends.
pub struct OfflineCourses {
  session: Session,
  content: ContentCache,
  downloads: DownloadManager,
  progress: ProgressTracker,
  sync: SyncReconciler,
}

impl OfflineCourses {
  /// Open the SQLite store and HTTP client described by `config`.
  pub async fn open(config: &Config, videos: Option<VideoQueue>) -> color_eyre::Result<Self> {
    let store = SqliteStore::open(&config.database_path()?)?;
    let remote = HttpContentService::new(config)?;

    let courses = Self::with_parts(
      Arc::new(store),
      Arc::new(remote),
      Clock::System,
      config.cache.retention_days,
      videos,
    )
    .await?;
    Ok(courses)
  }

  /// Assemble from explicit parts. Requires a logged-in session in the store.
  pub async fn with_parts(
    store: Arc<dyn DurableStore>,
    remote: Arc<dyn RemoteContentService>,
    clock: Clock,
    retention_days: u32,
    videos: Option<VideoQueue>,
  ) -> Result<Self, CacheError> {
    let cache = CacheLayer::new(store);
    let session = Session::load(&cache)?;

    let sync = SyncReconciler::new(Arc::clone(&remote), cache.clone(), session.clone());
    sync.load().await?;

    let content = ContentCache::new(Arc::clone(&remote), cache.clone(), &session.user_id);
    let downloads = DownloadManager::new(
      remote,
      cache,
      &session.user_id,
      clock,
      retention_days,
      videos,
    );
    let progress = ProgressTracker::new(content.clone(), sync.clone());

    info!(user_id = %session.user_id, "offline cache ready");
    Ok(Self {
      session,
      content,
      downloads,
      progress,
      sync,
    })
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn content(&self) -> &ContentCache {
    &self.content
  }

  pub fn downloads(&self) -> &DownloadManager {
    &self.downloads
  }

  pub fn progress(&self) -> &ProgressTracker {
    &self.progress
  }

  pub fn sync(&self) -> &SyncReconciler {
    &self.sync
  }

  /// Persist the in-memory progress record and flush the store.
  pub async fn shutdown(self) -> Result<(), CacheError> {
    self.sync.flush().await?;
    info!(user_id = %self.session.user_id, "offline cache shut down");
    Ok(())
  }
}
