//! Reference-counted, size-bounded image cache
//!
//! Content is addressed by URL: each distinct URL maps to one file whose name
//! is derived from the URL. Callers ask for content through a cache id (a
//! logical key); a cache id resolves to one URL at a time and holds one
//! reference on it. Files whose last reference goes away are deleted, and an
//! LRU pass keeps total usage under the configured budget.
//!
//! # Layers
//!
//! | Module | Concern |
//! |--------|---------|
//! | `paths` | URL to file name, size formatting |
//! | `records` | Content entries and bindings |
//! | `store` | Transactions, persistence, usage total |
//! | `content` | Acquire/release reference counting |
//! | `binding` | The rebind protocol |
//! | `eviction` | Budget enforcement |
//! | `lock` | Entry locks and active cache ids |
//! | `orchestrator` | Per-request load state machine |

pub mod binding;
pub mod content;
pub mod eviction;
pub mod fetch;
pub mod fs;
pub mod lock;
pub mod orchestrator;
pub mod paths;
pub mod records;
pub mod store;

pub use binding::Resolution;
pub use content::{Acquired, ReleaseOutcome};
pub use eviction::EvictionReport;
pub use fetch::{Download, Fetcher, HttpFetcher};
pub use fs::{Filesystem, LocalFs};
pub use lock::{ActiveKeys, EntryLocks, KeyGuard};
pub use orchestrator::{Cache, CacheOptions, CacheStats, LoadHandle, LoadState, ReconcileReport};
pub use paths::{content_key, format_bytes, CacheSizeStatus};
pub use records::{ContentEntry, LogicalBinding, Records};
pub use store::{JsonFileBackend, MemoryBackend, RecordStore, StorageBackend};
