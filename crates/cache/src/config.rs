//! Configuration for the thumbnail pipeline.
//!
//! Covers cache budgets for the memory and disk levels, the negative-result
//! cache size, the concurrency window of the coordinator, and the background
//! worker count. Configuration can be loaded from a TOML file, from
//! environment variables, or built programmatically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default in-memory budget for decoded thumbnails.
pub const DEFAULT_MEMORY_CACHE_BYTES: usize = 5 * 1024 * 1024;
/// Default on-disk budget for encoded thumbnails.
pub const DEFAULT_DISK_CACHE_BYTES: usize = 10 * 1024 * 1024;
/// Default number of content ids remembered as "no thumbnail".
pub const DEFAULT_NEGATIVE_CACHE_ENTRIES: usize = 100;
/// Default number of keys that may be generating at once.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

const ENV_MEMORY_CACHE_BYTES: &str = "THUMBNAIL_MEMORY_CACHE_BYTES";
const ENV_DISK_CACHE_BYTES: &str = "THUMBNAIL_DISK_CACHE_BYTES";
const ENV_NEGATIVE_CACHE_ENTRIES: &str = "THUMBNAIL_NEGATIVE_CACHE_ENTRIES";
const ENV_MAX_CONCURRENT_REQUESTS: &str = "THUMBNAIL_MAX_CONCURRENT_REQUESTS";
const ENV_WORKER_THREADS: &str = "THUMBNAIL_WORKER_THREADS";
const ENV_CACHE_DIR: &str = "THUMBNAIL_CACHE_DIR";

/// Configuration for the thumbnail pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Memory cache limit in bytes of decoded pixels
    pub memory_cache_bytes: usize,
    /// Disk store limit in bytes of encoded thumbnails
    pub disk_cache_bytes: usize,
    /// Maximum number of content ids in the negative-result cache
    pub negative_cache_entries: usize,
    /// Maximum number of distinct keys with outstanding disk/generation work
    pub max_concurrent_requests: usize,
    /// Background worker threads; 0 runs jobs inline on the coordinator's thread
    pub worker_threads: usize,
    /// Directory holding the disk store
    pub disk_cache_dir: PathBuf,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            disk_cache_bytes: DEFAULT_DISK_CACHE_BYTES,
            negative_cache_entries: DEFAULT_NEGATIVE_CACHE_ENTRIES,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            worker_threads: default_worker_threads(),
            disk_cache_dir: Self::default_cache_dir(),
        }
    }
}

impl ThumbnailConfig {
    pub fn with_memory_cache_bytes(mut self, bytes: usize) -> Self {
        self.memory_cache_bytes = bytes;
        self
    }

    pub fn with_disk_cache_bytes(mut self, bytes: usize) -> Self {
        self.disk_cache_bytes = bytes;
        self
    }

    pub fn with_negative_cache_entries(mut self, entries: usize) -> Self {
        self.negative_cache_entries = entries;
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = limit;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_disk_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Only one key may be generating at a time.
    pub fn single_request_mode(self) -> Self {
        self.with_max_concurrent_requests(1)
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/thumbnails
    /// - Linux: ~/.cache/thumbnails
    /// - Windows: %LOCALAPPDATA%\thumbnails
    pub fn default_cache_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(cache_dir) => cache_dir.join("thumbnails"),
            None => PathBuf::from("cache/thumbnails"),
        }
    }

    /// Rejects budgets that would make a cache level unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("memory_cache_bytes", self.memory_cache_bytes),
            ("disk_cache_bytes", self.disk_cache_bytes),
            ("negative_cache_entries", self.negative_cache_entries),
            ("max_concurrent_requests", self.max_concurrent_requests),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `THUMBNAIL_MEMORY_CACHE_BYTES`
    /// - `THUMBNAIL_DISK_CACHE_BYTES`
    /// - `THUMBNAIL_NEGATIVE_CACHE_ENTRIES`
    /// - `THUMBNAIL_MAX_CONCURRENT_REQUESTS`
    /// - `THUMBNAIL_WORKER_THREADS`
    /// - `THUMBNAIL_CACHE_DIR`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        env_override(ENV_MEMORY_CACHE_BYTES, &mut config.memory_cache_bytes)?;
        env_override(ENV_DISK_CACHE_BYTES, &mut config.disk_cache_bytes)?;
        env_override(ENV_NEGATIVE_CACHE_ENTRIES, &mut config.negative_cache_entries)?;
        env_override(ENV_MAX_CONCURRENT_REQUESTS, &mut config.max_concurrent_requests)?;
        env_override(ENV_WORKER_THREADS, &mut config.worker_threads)?;

        if let Ok(val) = std::env::var(ENV_CACHE_DIR) {
            config.disk_cache_dir = PathBuf::from(val);
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// ```toml
    /// memory_cache_bytes = 5242880
    /// disk_cache_bytes = 10485760
    /// negative_cache_entries = 100
    /// max_concurrent_requests = 8
    /// worker_threads = 4
    /// disk_cache_dir = "/path/to/cache"
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(name) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    }
    Ok(())
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
