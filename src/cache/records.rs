//! Record types persisted by the cache
//!
//! Two tables: content entries keyed by content URL, and logical bindings
//! keyed by cache id. Both live in one [`Records`] document so a single
//! commit covers every table a transaction touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One physically cached blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Canonical remote identifier of the content
    pub content_url: String,

    /// Number of logical keys bound to this content (never 0 once persisted)
    pub reference_count: u32,

    /// Size of the cached file on disk
    pub byte_size: u64,

    /// Unix seconds of creation or last rebind onto this entry
    pub last_touch: i64,
}

/// A stable logical key and the content URL it currently resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalBinding {
    /// Caller-supplied cache id
    pub logical_key: String,

    /// Content URL the key resolves to
    pub resolved_url: String,
}

/// The full record document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Records {
    pub(crate) contents: BTreeMap<String, ContentEntry>,
    pub(crate) bindings: BTreeMap<String, LogicalBinding>,
}

impl Records {
    /// Look up the content entry for a URL
    pub fn content(&self, url: &str) -> Option<&ContentEntry> {
        self.contents.get(url)
    }

    /// Look up the binding for a logical key
    pub fn binding(&self, logical_key: &str) -> Option<&LogicalBinding> {
        self.bindings.get(logical_key)
    }

    /// All content entries, ordered by URL
    pub fn contents(&self) -> impl Iterator<Item = &ContentEntry> {
        self.contents.values()
    }

    /// All bindings, ordered by logical key
    pub fn bindings(&self) -> impl Iterator<Item = &LogicalBinding> {
        self.bindings.values()
    }

    /// Logical keys currently resolving to `url`
    pub fn keys_bound_to<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.bindings
            .values()
            .filter(move |b| b.resolved_url == url)
            .map(|b| b.logical_key.as_str())
    }

    /// Sum of `byte_size` over all live entries
    pub fn total_bytes(&self) -> u64 {
        self.contents.values().map(|e| e.byte_size).sum()
    }

    /// Whether the document holds no records at all
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.bindings.is_empty()
    }

    /// The entry with the smallest touch time, ties broken by URL
    pub fn least_recently_touched(&self) -> Option<&ContentEntry> {
        self.contents
            .values()
            .min_by(|a, b| {
                a.last_touch
                    .cmp(&b.last_touch)
                    .then_with(|| a.content_url.cmp(&b.content_url))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, touch: i64, size: u64) -> ContentEntry {
        ContentEntry {
            content_url: url.to_string(),
            reference_count: 1,
            byte_size: size,
            last_touch: touch,
        }
    }

    fn records(entries: &[ContentEntry]) -> Records {
        let mut records = Records::default();
        for e in entries {
            records.contents.insert(e.content_url.clone(), e.clone());
        }
        records
    }

    #[test]
    fn least_recently_touched_orders_by_time() {
        let r = records(&[entry("c", 30, 1), entry("a", 20, 1), entry("b", 10, 1)]);
        assert_eq!(r.least_recently_touched().unwrap().content_url, "b");
    }

    #[test]
    fn least_recently_touched_breaks_ties_by_url() {
        let r = records(&[entry("z", 5, 1), entry("m", 5, 1), entry("q", 9, 1)]);
        assert_eq!(r.least_recently_touched().unwrap().content_url, "m");
    }

    #[test]
    fn empty_document_has_no_candidate() {
        assert!(Records::default().least_recently_touched().is_none());
        assert!(Records::default().is_empty());
    }

    #[test]
    fn total_bytes_sums_entries() {
        let r = records(&[entry("a", 1, 600), entry("b", 2, 400)]);
        assert_eq!(r.total_bytes(), 1000);
    }

    #[test]
    fn document_serializes_both_tables() {
        let mut r = records(&[entry("https://x/a.png", 1, 3)]);
        r.bindings.insert(
            "k1".to_string(),
            LogicalBinding {
                logical_key: "k1".to_string(),
                resolved_url: "https://x/a.png".to_string(),
            },
        );

        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"contents\""));
        assert!(json.contains("\"bindings\""));

        let parsed: Records = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r);
        assert_eq!(parsed.keys_bound_to("https://x/a.png").count(), 1);
    }
}
