//! Registrar settings
//!
//! Paths and timeouts can come from a YAML file, from `CHARTKEEP_*`
//! environment variables, or from defaults under the user's config and cache
//! directories.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Environment variable overriding the repository file path
pub const ENV_REPOSITORY_CONFIG: &str = "CHARTKEEP_REPOSITORY_CONFIG";
/// Environment variable overriding the index cache directory
pub const ENV_REPOSITORY_CACHE: &str = "CHARTKEEP_REPOSITORY_CACHE";
/// Environment variable overriding the lock timeout (e.g. `45s`)
pub const ENV_LOCK_TIMEOUT: &str = "CHARTKEEP_LOCK_TIMEOUT";

/// Longest accepted lock timeout
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// What to do when the repository file lock is not acquired in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockTimeoutPolicy {
    /// Fail the operation with `RepoError::LockTimeout`
    #[default]
    Fail,

    /// Continue without the lock; concurrent writers may race
    Proceed,
}

/// Registrar settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Path to `repositories.yaml`
    pub repository_config: PathBuf,

    /// Directory where downloaded indexes are cached
    pub repository_cache: PathBuf,

    /// Maximum time to wait for the repository file lock
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,

    /// Delay between two lock attempts
    #[serde(with = "humantime_serde")]
    pub lock_poll_interval: Duration,

    /// Timeout of a single index request
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    pub lock_timeout_policy: LockTimeoutPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            repository_config: config_dir.join("chartkeep").join("repositories.yaml"),
            repository_cache: cache_dir.join("chartkeep").join("repository"),
            lock_timeout: Duration::from_secs(30),
            lock_poll_interval: Duration::from_secs(1),
            http_timeout: Duration::from_secs(30),
            lock_timeout_policy: LockTimeoutPolicy::Fail,
        }
    }
}

impl Settings {
    /// Settings rooted at explicit paths, other fields defaulted
    pub fn new(repository_config: impl Into<PathBuf>, repository_cache: impl Into<PathBuf>) -> Self {
        Self {
            repository_config: repository_config.into(),
            repository_cache: repository_cache.into(),
            ..Default::default()
        }
    }

    /// Defaults with `CHARTKEEP_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load settings from a YAML file; missing fields keep their defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RepoError::storage(path, e))?;
        let settings: Self = serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = set(ENV_REPOSITORY_CONFIG) {
            self.repository_config = PathBuf::from(path);
        }
        if let Some(path) = set(ENV_REPOSITORY_CACHE) {
            self.repository_cache = PathBuf::from(path);
        }
        if let Some(value) = set(ENV_LOCK_TIMEOUT) {
            self.lock_timeout =
                humantime_serde::re::humantime::parse_duration(&value).map_err(|e| {
                    RepoError::InvalidConfig {
                        message: format!("{}={}: {}", ENV_LOCK_TIMEOUT, value, e),
                    }
                })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject timeouts the lock loop cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout > MAX_LOCK_TIMEOUT {
            return Err(RepoError::InvalidConfig {
                message: format!(
                    "lock timeout {} exceeds {}",
                    humantime_serde::re::humantime::format_duration(self.lock_timeout),
                    humantime_serde::re::humantime::format_duration(MAX_LOCK_TIMEOUT)
                ),
            });
        }
        Ok(())
    }
}
