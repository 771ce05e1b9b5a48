//! Size-bounded eviction
//!
//! Runs inline after an acquisition grows usage. Entries go in ascending
//! touch order (ties by URL) and are removed outright, together with every
//! cache id bound to them, whatever their reference count.

use crate::cache::records::ContentEntry;
use crate::cache::store::Transaction;
use tracing::{info, warn};

/// What an eviction pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed, oldest first
    pub evicted: Vec<ContentEntry>,
    /// Usage after the pass
    pub remaining: u64,
    /// False when the store emptied before usage fell under budget
    pub satisfied: bool,
}

impl Transaction<'_> {
    /// Evict until `projected_usage` is below `budget_bytes`
    pub fn enforce_budget(&mut self, projected_usage: u64, budget_bytes: u64) -> EvictionReport {
        let mut usage = projected_usage;
        let mut evicted = Vec::new();

        while usage >= budget_bytes {
            let Some(url) = self
                .records()
                .least_recently_touched()
                .map(|e| e.content_url.clone())
            else {
                warn!(usage, budget_bytes, "Cache budget unsatisfiable, store is empty");
                return EvictionReport {
                    evicted,
                    remaining: usage,
                    satisfied: false,
                };
            };

            if let Some(entry) = self.purge(&url) {
                usage = usage.saturating_sub(entry.byte_size);
                info!(
                    url = %entry.content_url,
                    bytes = entry.byte_size,
                    refs = entry.reference_count,
                    "Evicted cache entry"
                );
                evicted.push(entry);
            }
        }

        EvictionReport {
            evicted,
            remaining: usage,
            satisfied: true,
        }
    }

    /// Enforce `budget_bytes` if this transaction created entries so far
    pub fn settle_budget(&mut self, budget_bytes: u64) -> Option<EvictionReport> {
        if self.effects.added_bytes == 0 {
            return None;
        }
        let usage = self.usage();
        Some(self.enforce_budget(usage, budget_bytes))
    }
}
