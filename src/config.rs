//! Configuration types for customizing the update engine and item store.
//!
//! The configuration system covers the knobs the core consumes: worker pool
//! size, default refresh interval, cache limits, network timeout, proxy
//! settings, and whether transient fetch failures are retried. Most users can
//! rely on [`CoreConfig::default`], but persistent deployments can load the
//! same keys from a JSON file via [`CoreConfig::from_json_file`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyndError};

/// The worker pool never shrinks below this, because the first worker serves
/// the high-priority queue exclusively.
pub const MIN_UPDATE_CONCURRENCY: usize = 2;

const DEFAULT_UPDATE_CONCURRENCY: usize = 4;

/// Configuration settings for a [`FeedCore`](crate::FeedCore) instance.
///
/// # Examples
///
/// Using defaults:
/// ```rust
/// # use syndikit::CoreConfig;
/// let config = CoreConfig::default();
/// assert_eq!(config.update_concurrency, 4);
/// ```
///
/// Custom configuration:
/// ```rust
/// # use syndikit::CoreConfig;
/// # use std::time::Duration;
/// let config = CoreConfig {
///     update_concurrency: 8,
///     network_timeout: Duration::from_secs(60),
///     ..CoreConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// User agent string sent with every fetch.
    pub user_agent: String,

    /// Number of concurrent fetch workers (`UPDATE_THREAD_CONCURRENCY`).
    /// Values below 2 are raised to the default at init.
    pub update_concurrency: usize,

    /// Default refresh interval in minutes (`DEFAULT_UPDATE_INTERVAL`),
    /// applied when a subscription neither sets its own interval nor gets one
    /// from the feed (`ttl`, `syn:updatePeriod`).
    pub default_update_interval: u32,

    /// Cache limit per feed (`DEFAULT_MAX_ITEMS`): merged itemsets are pruned
    /// down to this many items, flagged items exempt. 0 disables pruning.
    pub default_max_items: usize,

    /// Socket timeout for HTTP fetches (`NETWORK_TIMEOUT`).
    #[serde(with = "seconds")]
    pub network_timeout: Duration,

    /// Proxy URL (`PROXY_*`); `None` uses the system environment.
    pub proxy: Option<String>,

    /// Hosts excluded from proxying.
    pub proxy_exceptions: Vec<String>,

    /// Whether transient fetch failures are retried (`ENABLE_FETCH_RETRIES`).
    pub enable_fetch_retries: bool,

    /// Location of the SQLite item store. `None` places `syndikit.db` in the
    /// platform cache directory.
    pub cache_db_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("syndikit/", env!("CARGO_PKG_VERSION")).to_string(),
            update_concurrency: DEFAULT_UPDATE_CONCURRENCY,
            default_update_interval: 60,
            default_max_items: 100,
            network_timeout: Duration::from_secs(30),
            proxy: None,
            proxy_exceptions: Vec::new(),
            enable_fetch_retries: true,
            cache_db_path: None,
        }
    }
}

impl CoreConfig {
    /// Loads configuration from a JSON file. Missing keys fall back to the
    /// defaults, so a partial file is fine.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The effective worker count: configured value, but never below
    /// [`MIN_UPDATE_CONCURRENCY`]. Misconfigured values (0 or 1) fall back to
    /// the default instead of being clamped, matching the historical
    /// behavior of the `UPDATE_THREAD_CONCURRENCY` setting.
    pub fn effective_concurrency(&self) -> usize {
        if self.update_concurrency < MIN_UPDATE_CONCURRENCY {
            DEFAULT_UPDATE_CONCURRENCY
        } else {
            self.update_concurrency
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.user_agent.is_empty() {
            return Err(SyndError::ConfigError("user agent must not be empty".into()));
        }
        if self.network_timeout.is_zero() {
            return Err(SyndError::ConfigError(
                "network timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// (De)serializes `Duration` as whole seconds so the JSON file can say
/// `"network_timeout": 30`.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
