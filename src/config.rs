//! Configuration types for feed-reloader

use crate::error::{Error, Result};
use crate::types::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Reload behavior configuration (concurrency, timeouts, HTTP identity)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Maximum number of feeds fetched at the same time (default: 10)
    #[serde(default = "default_max_concurrent_reloads")]
    pub max_concurrent_reloads: usize,

    /// Connection timeout for one fetch, in seconds (default: 30)
    #[serde(default = "default_connection_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reloads: default_max_concurrent_reloads(),
            connection_timeout: default_connection_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retention limits applied when merging feeds
///
/// Both limits are unset by default, meaning nothing is ever cleaned up.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep at most this many items per bookmark
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Drop items older than this many days
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl RetentionConfig {
    /// Retention policy for these settings
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_items: self.max_items,
            max_age_days: self.max_age_days,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./feeds.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Authentication prompt policy
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// After the user cancels a synchronized-account login, skip automatic
    /// batch reloads of that account for this many seconds (0 = never skip)
    #[serde(default, with = "duration_serde")]
    pub sync_cancel_backoff: Duration,
}

/// Main configuration for the reload orchestrator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Concurrency, timeouts and HTTP identity
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Retention limits
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Storage location
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Authentication prompt policy
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reload.max_concurrent_reloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_reloads must be at least 1".to_string(),
                key: Some("max_concurrent_reloads".to_string()),
            });
        }
        if self.reload.connection_timeout.is_zero() {
            return Err(Error::Config {
                message: "connection_timeout must be greater than zero".to_string(),
                key: Some("connection_timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent_reloads() -> usize {
    10
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("feed-reloader/{}", env!("CARGO_PKG_VERSION"))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("feeds.db")
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
