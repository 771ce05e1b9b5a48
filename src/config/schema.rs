//! Configuration schema for imgcache
//!
//! Configuration is stored at `~/.config/imgcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache storage settings
    pub cache: CacheConfig,

    /// Download settings
    pub fetch: FetchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cached files and the record document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Maximum total cache size in MB before eviction kicks in
    pub max_total_mb: u64,

    /// Delay between entry lock acquisition attempts
    pub lock_retry_ms: u64,

    /// Repair records and files against each other when the cache is opened
    pub reconcile_on_open: bool,
}

impl CacheConfig {
    /// The eviction budget in bytes
    pub fn budget_bytes(&self) -> u64 {
        self.max_total_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_total_mb: 50,
            lock_retry_ms: 100,
            reconcile_on_open: false,
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Overall timeout for a single download
    pub timeout_secs: u64,

    /// User-Agent header sent with downloads
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("imgcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[fetch]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.max_total_mb, 50);
        assert_eq!(config.cache.lock_retry_ms, 100);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            max_total_mb = 2
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.budget_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.fetch.timeout_secs, 30); // default preserved
    }
}
