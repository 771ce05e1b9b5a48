//! Content record operations
//!
//! Reference counting over content entries. A count never persists at zero:
//! the release that would reach zero removes the entry and hands it back as
//! an effect so the caller deletes the file and shrinks usage.

use crate::cache::records::ContentEntry;
use crate::cache::store::Transaction;

/// Result of acquiring a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// A new entry was created with one reference
    Created,
    /// An existing entry gained a reference; holds the new count
    Incremented(u32),
}

/// Result of releasing a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The last reference went away and the entry was removed
    Released(ContentEntry),
    /// Other references remain; holds the new count
    Decremented(u32),
    /// No entry exists for the URL
    NotFound,
}

impl Transaction<'_> {
    /// Take a reference on `url`, creating the entry if needed
    ///
    /// `size` is only used when the entry is created; a missing size records
    /// the entry as zero bytes.
    pub fn acquire(&mut self, url: &str, size: Option<u64>) -> Acquired {
        self.dirty = true;
        let now = self.now;

        if let Some(entry) = self.records.contents.get_mut(url) {
            entry.reference_count = entry.reference_count.saturating_add(1);
            entry.last_touch = now;
            return Acquired::Incremented(entry.reference_count);
        }

        let byte_size = size.unwrap_or(0);
        self.records.contents.insert(
            url.to_string(),
            ContentEntry {
                content_url: url.to_string(),
                reference_count: 1,
                byte_size,
                last_touch: now,
            },
        );
        self.effects.added_bytes += byte_size;
        Acquired::Created
    }

    /// Drop a reference on `url`
    pub fn release(&mut self, url: &str) -> ReleaseOutcome {
        let Some(entry) = self.records.contents.get_mut(url) else {
            return ReleaseOutcome::NotFound;
        };
        self.dirty = true;

        if entry.reference_count > 1 {
            entry.reference_count -= 1;
            return ReleaseOutcome::Decremented(entry.reference_count);
        }

        match self.records.contents.remove(url) {
            Some(removed) => {
                self.effects.removed.push(removed.clone());
                ReleaseOutcome::Released(removed)
            }
            None => ReleaseOutcome::NotFound,
        }
    }

    /// Remove the entry for `url` and every binding resolving to it,
    /// regardless of its reference count
    pub(crate) fn purge(&mut self, url: &str) -> Option<ContentEntry> {
        let removed = self.records.contents.remove(url)?;
        self.records.bindings.retain(|_, b| b.resolved_url != url);
        self.mark_dirty();
        self.effects.removed.push(removed.clone());
        Some(removed)
    }

    /// Remove every entry and binding; returns the number of entries removed
    pub(crate) fn purge_all(&mut self) -> usize {
        if self.records.is_empty() {
            return 0;
        }
        let removed = std::mem::take(&mut self.records.contents);
        self.records.bindings.clear();
        self.mark_dirty();

        let count = removed.len();
        self.effects.removed.extend(removed.into_values());
        count
    }
}
