//! Logical-key map and the rebind protocol
//!
//! A cache id resolves to one content URL at a time. Rebinding moves the
//! key's reference from the old URL to the new one inside the same
//! transaction, so no observer sees both counts adjusted or neither.

use crate::cache::content::{Acquired, ReleaseOutcome};
use crate::cache::records::LogicalBinding;
use crate::cache::store::Transaction;
use tracing::debug;

/// Result of resolving a logical key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The key was bound (first time, rebind, or re-realized)
    Bound {
        /// Reference taken on the target URL
        acquired: Acquired,
        /// URL the key pointed at before, with the release outcome
        previous: Option<(String, ReleaseOutcome)>,
    },
    /// The key already resolved to the target; nothing was written
    Unchanged,
}

impl Transaction<'_> {
    /// Bind `logical_key` to `target_url`, moving its reference if it
    /// previously resolved elsewhere
    pub fn resolve(&mut self, logical_key: &str, target_url: &str, size: Option<u64>) -> Resolution {
        let previous_url = self
            .records
            .binding(logical_key)
            .map(|b| b.resolved_url.clone());

        match previous_url {
            Some(url) if url == target_url => {
                if self.records.content(target_url).is_some() {
                    return Resolution::Unchanged;
                }
                // Binding exists but its entry is gone; take the reference again.
                debug!(key = %logical_key, url = %target_url, "Re-realizing binding");
                let acquired = self.acquire(target_url, size);
                Resolution::Bound {
                    acquired,
                    previous: None,
                }
            }
            Some(old_url) => {
                self.put_binding(logical_key, target_url);
                let acquired = self.acquire(target_url, size);
                let released = self.release(&old_url);
                debug!(
                    key = %logical_key,
                    from = %old_url,
                    to = %target_url,
                    ?released,
                    "Rebound cache id"
                );
                Resolution::Bound {
                    acquired,
                    previous: Some((old_url, released)),
                }
            }
            None => {
                self.put_binding(logical_key, target_url);
                let acquired = self.acquire(target_url, size);
                debug!(key = %logical_key, url = %target_url, "Bound cache id");
                Resolution::Bound {
                    acquired,
                    previous: None,
                }
            }
        }
    }

    fn put_binding(&mut self, logical_key: &str, url: &str) {
        self.records.bindings.insert(
            logical_key.to_string(),
            LogicalBinding {
                logical_key: logical_key.to_string(),
                resolved_url: url.to_string(),
            },
        );
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::records::Records;

    fn count(records: &Records, url: &str) -> Option<u32> {
        records.content(url).map(|e| e.reference_count)
    }

    /// Sum of bindings per URL must equal each entry's reference count
    fn assert_conserved(records: &Records) {
        for entry in records.contents() {
            let bound = records.keys_bound_to(&entry.content_url).count() as u32;
            assert_eq!(bound, entry.reference_count, "url {}", entry.content_url);
        }
    }

    #[test]
    fn shared_content_and_rebind_scenario() {
        let mut records = Records::default();
        let mut tx = Transaction::new(&mut records, 1);

        tx.resolve("k1", "a", Some(10));
        assert_eq!(count(tx.records(), "a"), Some(1));
        tx.resolve("k2", "a", Some(10));
        assert_eq!(count(tx.records(), "a"), Some(2));
        assert_conserved(tx.records());

        tx.resolve("k1", "b", Some(20));
        assert_eq!(count(tx.records(), "a"), Some(1));
        assert_eq!(count(tx.records(), "b"), Some(1));
        assert_conserved(tx.records());

        let resolution = tx.resolve("k2", "b", Some(20));
        assert_eq!(count(tx.records(), "a"), None);
        assert_eq!(count(tx.records(), "b"), Some(2));
        assert_conserved(tx.records());

        match resolution {
            Resolution::Bound {
                previous: Some((old, ReleaseOutcome::Released(entry))),
                ..
            } => {
                assert_eq!(old, "a");
                assert_eq!(entry.byte_size, 10);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn identical_resolve_is_unchanged_and_clean() {
        let mut records = Records::default();
        Transaction::new(&mut records, 1).resolve("k", "a", Some(3));
        let before = records.clone();

        let mut tx = Transaction::new(&mut records, 99);
        assert_eq!(tx.resolve("k", "a", Some(3)), Resolution::Unchanged);
        assert!(!tx.dirty);
        assert!(tx.effects.is_empty());
        assert_eq!(records, before);
    }

    #[test]
    fn rebind_moves_exactly_one_reference() {
        let mut records = Records::default();
        {
            let mut tx = Transaction::new(&mut records, 1);
            tx.resolve("k1", "a", Some(1));
            tx.resolve("k2", "a", Some(1));
            tx.resolve("k3", "b", Some(1));
        }

        let mut tx = Transaction::new(&mut records, 2);
        tx.resolve("k1", "b", None);

        assert_eq!(count(tx.records(), "a"), Some(1));
        assert_eq!(count(tx.records(), "b"), Some(2));
        assert_eq!(tx.records().content("b").unwrap().last_touch, 2);
        assert_conserved(tx.records());
    }

    #[test]
    fn binding_without_entry_is_realized_again() {
        let mut records = Records::default();
        Transaction::new(&mut records, 1).resolve("k", "a", Some(4));
        records.contents.clear();

        let mut tx = Transaction::new(&mut records, 2);
        let resolution = tx.resolve("k", "a", Some(4));

        assert!(matches!(
            resolution,
            Resolution::Bound {
                acquired: Acquired::Created,
                previous: None
            }
        ));
        assert_eq!(count(tx.records(), "a"), Some(1));
    }
}
