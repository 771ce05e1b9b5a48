//! Content key derivation and size helpers
//!
//! A content URL maps to a cache filename of the form `<sha256-hex>.<ext>`.
//! The same URL always yields the same filename, which doubles as the entry
//! lock key.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Extension used when the URL does not carry a plausible one
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Guess the file extension from the text after the last `.` of the URL
///
/// Accepted only when it is 3 or 4 ASCII alphanumeric characters, so
/// `photo.png` gives `png` while `example.com/img` or `a.b?x=1` fall back
/// to [`DEFAULT_EXTENSION`].
pub fn extension_for(url: &str) -> &str {
    let candidate = url.rsplit_once('.').map_or(url, |(_, ext)| ext);
    let plausible = (3..=4).contains(&candidate.len())
        && candidate.chars().all(|c| c.is_ascii_alphanumeric());

    if plausible {
        candidate
    } else {
        DEFAULT_EXTENSION
    }
}

/// Derive the cache filename (content key) for a URL
pub fn content_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{}.{}", hex::encode(hasher.finalize()), extension_for(url))
}

/// Full path of the cached file for a URL inside `cache_dir`
pub fn file_path(cache_dir: &Path, url: &str) -> PathBuf {
    cache_dir.join(content_key(url))
}

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Cache size status relative to the configured budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSizeStatus {
    /// Under 80% of budget
    Ok,
    /// Between 80% and 100% of budget
    Warning,
    /// At or over the budget
    Exceeded,
}

impl CacheSizeStatus {
    /// Determine status based on current usage and budget
    pub fn from_usage(current_bytes: u64, limit_bytes: u64) -> Self {
        if limit_bytes == 0 {
            return Self::Ok;
        }
        let percent = Self::percentage(current_bytes, limit_bytes);
        if percent >= 100.0 {
            Self::Exceeded
        } else if percent >= 80.0 {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    /// Get percentage of budget used
    pub fn percentage(current_bytes: u64, limit_bytes: u64) -> f64 {
        if limit_bytes == 0 {
            return 0.0;
        }
        (current_bytes as f64 / limit_bytes as f64) * 100.0
    }
}
