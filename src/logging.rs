//! Tracing setup for hosts embedding the cache layer.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const DEFAULT_FILTER: &str = "offline_courses=info";

/// Install a global subscriber writing to a daily rolling file.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let directory = config.log_directory()?;
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let appender = tracing_appender::rolling::daily(&directory, "offline-courses.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(env_filter(config.log.filter.as_deref()))
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}

/// RUST_LOG wins over the configured directive, which wins over the default.
fn env_filter(configured: Option<&str>) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_FILTER)))
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{CacheConfig, LogConfig, RemoteConfig};

  #[test]
  fn test_second_init_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
      remote: RemoteConfig {
        url: "https://edu.example.org".to_string(),
        timeout_ms: 1200,
      },
      cache: CacheConfig::default(),
      log: LogConfig {
        directory: Some(dir.path().join("logs")),
        filter: Some("offline_courses=debug".to_string()),
      },
    };

    let _guard = init(&config).unwrap();
    assert!(dir.path().join("logs").is_dir());
    assert!(init(&config).is_err());
  }
}
