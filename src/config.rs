use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "offline-courses";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  pub url: String,
  /// Per-request timeout; a timeout is an ordinary remote failure
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
  1200
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Downloaded courses older than this many days are evicted
  #[serde(default = "default_retention_days")]
  pub retention_days: u32,
  /// SQLite file (defaults to the platform data directory)
  pub database_path: Option<PathBuf>,
}

fn default_retention_days() -> u32 {
  30
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      retention_days: default_retention_days(),
      database_path: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for rolling log files (defaults next to the database)
  pub directory: Option<PathBuf>,
  /// `EnvFilter` directive, overridden by RUST_LOG
  pub filter: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// The explicit path wins; otherwise the first existing candidate path is
  /// used. `OFFLINE_COURSES_URL` overrides the remote url afterwards.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if !p.exists() => return Err(eyre!("Config file not found: {}", p.display())),
      Some(p) => p.to_path_buf(),
      None => Self::candidate_paths()
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
          eyre!(
            "No configuration file found. Create one at ~/.config/{}/config.yaml",
            APP_DIR
          )
        })?,
    };

    let mut config = Self::load_from_path(&path)?;
    if let Some(url) = Self::url_override() {
      config.remote.url = url;
    }
    Ok(config)
  }

  /// `./offline-courses.yaml`, then `$XDG_CONFIG_HOME/offline-courses/config.yaml`.
  fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(format!("{}.yaml", APP_DIR))];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join(APP_DIR).join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    config
      .validate()
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;
    Ok(config)
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.remote.url.trim().is_empty() {
      return Err(eyre!("remote.url must not be empty"));
    }
    if self.remote.timeout_ms == 0 {
      return Err(eyre!("remote.timeout_ms must be positive"));
    }
    if self.cache.retention_days == 0 {
      return Err(eyre!("cache.retention_days must be at least 1"));
    }
    Ok(())
  }

  /// Remote url from OFFLINE_COURSES_URL, if set.
  fn url_override() -> Option<String> {
    std::env::var("OFFLINE_COURSES_URL")
      .ok()
      .filter(|u| !u.trim().is_empty())
  }

  /// Configured database path, or the platform default.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.cache.database_path {
      Some(p) => Ok(p.clone()),
      None => Self::default_database_path(),
    }
  }

  /// Get the default database path.
  pub fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_DIR).join("cache.db"))
  }

  /// Log directory, defaulting to a `logs` directory beside the database.
  pub fn log_directory(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.log.directory {
      return Ok(dir.clone());
    }
    let db = self.database_path()?;
    let parent = db
      .parent()
      .ok_or_else(|| eyre!("Database path {} has no parent", db.display()))?;
    Ok(parent.join("logs"))
  }
}
