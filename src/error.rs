//! Error types for imgcache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imgcache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in imgcache
#[derive(Error, Debug)]
pub enum CacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Orchestration errors
    #[error("Duplicate cache id: {0} is already being loaded")]
    DuplicateKey(String),

    // Record store errors
    #[error("Record store commit rejected: {0}")]
    Commit(String),

    #[error("Record document corrupt at {path}: {reason}")]
    RecordsCorrupt { path: PathBuf, reason: String },

    // Fetch errors
    #[error("Download of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a fetch error
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is transient, i.e. a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Commit(_) | Self::Fetch { .. } | Self::Io { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateKey(_) => Some("Each cache id may only be loaded once at a time"),
            Self::RecordsCorrupt { .. } => {
                Some("Delete records.json in the cache directory, then run: imgcache reconcile")
            }
            Self::ConfigInvalid { .. } => Some("Run: imgcache config init --force"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::DuplicateKey("avatar-42".to_string());
        assert!(err.to_string().contains("avatar-42"));
    }

    #[test]
    fn error_hint() {
        let err = CacheError::DuplicateKey("k".to_string());
        assert!(err.hint().is_some());
        assert_eq!(CacheError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn error_transient() {
        assert!(CacheError::fetch("http://x/a.png", "timeout").is_transient());
        assert!(CacheError::Commit("disk full".to_string()).is_transient());
        assert!(!CacheError::DuplicateKey("k".to_string()).is_transient());
    }
}
