//! The cache context and the per-request load state machine
//!
//! [`Cache`] owns everything that is process-wide: the record store (with
//! the usage total), the entry locks, the set of active cache ids and the
//! filesystem and fetch collaborators. A request for a cache id moves
//! `Loading -> LoadedLocal | Unloaded`:
//!
//! 1. derive the content key from the URL and take its entry lock
//! 2. if the file exists, publish it and bind the cache id to the URL
//! 3. otherwise download it; on success publish and bind, on failure
//!    publish `Unloaded`
//!
//! Every bind that creates an entry enforces the budget inside the same
//! transaction, whichever path created it.
//!
//! The entry lock is held from the existence check until bookkeeping is
//! done, so two requests for the same content never both download it.

use crate::cache::binding::Resolution;
use crate::cache::content::{Acquired, ReleaseOutcome};
use crate::cache::eviction::EvictionReport;
use crate::cache::fetch::{Fetcher, HttpFetcher};
use crate::cache::fs::{Filesystem, LocalFs};
use crate::cache::lock::{ActiveKeys, EntryLocks, KeyGuard};
use crate::cache::paths::{self, CacheSizeStatus};
use crate::cache::records::{ContentEntry, LogicalBinding};
use crate::cache::store::{Effects, JsonFileBackend, RecordStore, RECORDS_FILE};
use crate::config::{Config, ConfigManager};
use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable state of one cache id request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Lock wait, existence check or download in progress
    Loading,
    /// Content is available at the path
    LoadedLocal(PathBuf),
    /// Content could not be obtained; show the original or a placeholder
    Unloaded,
}

impl LoadState {
    /// Whether this is a final state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    /// Local path if the content is available
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::LoadedLocal(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::LoadedLocal(path) => write!(f, "loaded {}", path.display()),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Construction parameters for a [`Cache`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Directory holding cached files
    pub dir: PathBuf,
    /// Eviction budget in bytes
    pub budget_bytes: u64,
    /// Delay between entry lock attempts
    pub lock_retry: Duration,
}

impl CacheOptions {
    /// Options taken from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: ConfigManager::cache_dir(config),
            budget_bytes: config.cache.budget_bytes(),
            lock_retry: Duration::from_millis(config.cache.lock_retry_ms),
        }
    }
}

/// Point-in-time figures about the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Live content entries
    pub entries: usize,
    /// Cache ids with a binding
    pub bindings: usize,
    /// Sum of entry sizes
    pub usage_bytes: u64,
    /// Configured budget
    pub budget_bytes: u64,
    /// Cache ids currently being loaded in this process
    pub active_loads: usize,
}

impl CacheStats {
    /// Usage relative to budget
    pub fn status(&self) -> CacheSizeStatus {
        CacheSizeStatus::from_usage(self.usage_bytes, self.budget_bytes)
    }
}

/// What a reconcile pass found (and, unless dry-run, repaired)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries whose file is missing
    pub dangling_records: Vec<ContentEntry>,
    /// Files no entry accounts for
    pub orphan_files: Vec<PathBuf>,
    /// Usage after the pass
    pub usage_bytes: u64,
}

impl ReconcileReport {
    /// Whether records and files already agreed
    pub fn is_clean(&self) -> bool {
        self.dangling_records.is_empty() && self.orphan_files.is_empty()
    }
}

/// Handle to a load running in the background
///
/// Dropping the handle (or calling [`LoadHandle::cancel`]) is teardown: the
/// cache id stops being active and a pending lock wait is abandoned. A
/// download that already started still completes and records its result.
pub struct LoadHandle {
    logical_key: String,
    state: watch::Receiver<LoadState>,
    task: JoinHandle<()>,
    _cancel: oneshot::Sender<()>,
    _active: KeyGuard,
}

impl LoadHandle {
    /// The cache id being loaded
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Current state
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// A receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.clone()
    }

    /// Wait for a terminal state
    pub async fn finished(&mut self) -> LoadState {
        if let Ok(state) = self.state.wait_for(LoadState::is_terminal).await {
            return state.clone();
        }
        // The task exited without a final state (lock wait abandoned)
        self.state()
    }

    /// Whether the background task has exited
    pub fn is_done(&self) -> bool {
        self.task.is_finished()
    }

    /// Tear down the request
    pub fn cancel(self) {
        debug!(key = %self.logical_key, "Load cancelled");
    }
}

/// Process-scoped cache context
pub struct Cache {
    dir: PathBuf,
    budget_bytes: u64,
    store: RecordStore,
    fs: Arc<dyn Filesystem>,
    fetcher: Arc<dyn Fetcher>,
    locks: EntryLocks,
    active: ActiveKeys,
}

impl Cache {
    /// Assemble a cache from its collaborators
    pub fn new(
        options: CacheOptions,
        store: RecordStore,
        fs: Arc<dyn Filesystem>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            dir: options.dir,
            budget_bytes: options.budget_bytes,
            store,
            fs,
            fetcher,
            locks: EntryLocks::new(options.lock_retry),
            active: ActiveKeys::default(),
        }
    }

    /// Open the on-disk cache described by `config`
    pub async fn open(config: &Config) -> CacheResult<Self> {
        let options = CacheOptions::from_config(config);
        LocalFs.create_dir_all(&options.dir).await?;

        let store = RecordStore::open(Arc::new(JsonFileBackend::in_dir(&options.dir))).await?;
        let cache = Self::new(
            options,
            store,
            Arc::new(LocalFs),
            Arc::new(HttpFetcher::new(&config.fetch)),
        );
        info!(
            dir = %cache.dir.display(),
            usage = cache.usage(),
            budget = cache.budget_bytes,
            "Cache opened"
        );

        if config.cache.reconcile_on_open {
            let report = cache.reconcile(false).await?;
            if !report.is_clean() {
                info!(
                    dangling = report.dangling_records.len(),
                    orphans = report.orphan_files.len(),
                    "Reconciled cache on open"
                );
            }
        }

        Ok(cache)
    }

    /// Directory holding cached files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Eviction budget in bytes
    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Bytes held by live entries
    pub fn usage(&self) -> u64 {
        self.store.usage()
    }

    /// The entry locks of this cache
    pub fn locks(&self) -> &EntryLocks {
        &self.locks
    }

    /// Whether a load for `logical_key` is in progress
    pub fn is_active(&self, logical_key: &str) -> bool {
        self.active.is_active(logical_key)
    }

    /// Where the content of `url` is cached
    pub fn file_path(&self, url: &str) -> PathBuf {
        paths::file_path(&self.dir, url)
    }

    /// Take a reference on `url` in its own transaction
    ///
    /// Creating an entry enforces the budget in the same transaction.
    pub async fn acquire(&self, url: &str, size: Option<u64>) -> CacheResult<Acquired> {
        let budget = self.budget_bytes;
        let ((acquired, report), effects) = self
            .store
            .transaction(|tx| {
                let acquired = tx.acquire(url, size);
                (acquired, tx.settle_budget(budget))
            })
            .await?;
        self.apply(effects).await;
        self.log_eviction(url, report);
        Ok(acquired)
    }

    /// Drop a reference on `url` in its own transaction
    pub async fn release(&self, url: &str) -> CacheResult<ReleaseOutcome> {
        let (outcome, effects) = self.store.transaction(|tx| tx.release(url)).await?;
        self.apply(effects).await;
        Ok(outcome)
    }

    /// The entry eviction would pick next
    pub async fn least_recently_touched(&self) -> Option<ContentEntry> {
        self.store.snapshot().await.least_recently_touched().cloned()
    }

    /// Bind `logical_key` to `url`, moving its reference atomically
    ///
    /// Creating an entry enforces the budget in the same transaction.
    pub async fn resolve(
        &self,
        logical_key: &str,
        url: &str,
        size: Option<u64>,
    ) -> CacheResult<Resolution> {
        let budget = self.budget_bytes;
        let ((resolution, report), effects) = self
            .store
            .transaction(|tx| {
                let resolution = tx.resolve(logical_key, url, size);
                (resolution, tx.settle_budget(budget))
            })
            .await?;
        self.apply(effects).await;
        self.log_eviction(url, report);
        Ok(resolution)
    }

    /// Evict until usage is below budget
    pub async fn enforce_budget(&self) -> CacheResult<EvictionReport> {
        let budget = self.budget_bytes;
        let (report, effects) = self
            .store
            .transaction(|tx| {
                let usage = tx.usage();
                tx.enforce_budget(usage, budget)
            })
            .await?;
        self.apply(effects).await;
        Ok(report)
    }

    /// Load `url` for `logical_key` and wait for the outcome
    pub async fn fetch(&self, logical_key: &str, url: &str) -> CacheResult<LoadState> {
        let _active = self.activate(logical_key)?;
        let (state, _observer) = watch::channel(LoadState::Loading);
        let guard = self.locks.acquire(&paths::content_key(url)).await;
        Ok(self.load_locked(logical_key, url, guard, &state).await)
    }

    /// Start loading `url` for `logical_key` in the background
    pub fn load(self: &Arc<Self>, logical_key: &str, url: &str) -> CacheResult<LoadHandle> {
        let active = self.activate(logical_key)?;
        let (state_tx, state_rx) = watch::channel(LoadState::Loading);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let cache = Arc::clone(self);
        let key = logical_key.to_string();
        let url = url.to_string();
        let task = tokio::spawn(async move {
            let content_key = paths::content_key(&url);
            let guard = tokio::select! {
                biased;
                guard = cache.locks.acquire(&content_key) => guard,
                _ = cancel_rx => {
                    debug!(key = %key, content = %content_key, "Abandoned lock wait");
                    return;
                }
            };
            cache.load_locked(&key, &url, guard, &state_tx).await;
        });

        Ok(LoadHandle {
            logical_key: logical_key.to_string(),
            state: state_rx,
            task,
            _cancel: cancel_tx,
            _active: active,
        })
    }

    fn activate(&self, logical_key: &str) -> CacheResult<KeyGuard> {
        self.active.try_activate(logical_key).ok_or_else(|| {
            warn!(key = %logical_key, "Duplicate cache id");
            CacheError::DuplicateKey(logical_key.to_string())
        })
    }

    /// Steps 3-5 of a load; `guard` holds the entry lock and is released on return
    ///
    /// Only this content key is locked. Eviction on behalf of another key
    /// may delete this file between the size check and the resolve; the
    /// entry is then recorded for a missing file until `reconcile` runs.
    async fn load_locked(
        &self,
        logical_key: &str,
        url: &str,
        guard: KeyGuard,
        state: &watch::Sender<LoadState>,
    ) -> LoadState {
        let path = self.dir.join(guard.key());

        // A file that vanishes between the existence and size checks is a miss
        let local_size = if self.fs.exists(&path).await {
            self.fs.file_size(&path).await
        } else {
            None
        };

        let outcome = if let Some(size) = local_size {
            let loaded = LoadState::LoadedLocal(path.clone());
            state.send_replace(loaded.clone());
            self.record_reference(logical_key, url, size).await;
            loaded
        } else {
            match self.fetcher.download_to(url, &path).await {
                Ok(download) if download.is_success() => {
                    let loaded = LoadState::LoadedLocal(path.clone());
                    state.send_replace(loaded.clone());
                    debug!(url = %url, bytes = download.bytes_written, "Downloaded");
                    self.record_reference(logical_key, url, download.bytes_written).await;
                    loaded
                }
                Ok(download) => {
                    warn!(url = %url, status = download.status, "Download failed");
                    state.send_replace(LoadState::Unloaded);
                    LoadState::Unloaded
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Download failed");
                    state.send_replace(LoadState::Unloaded);
                    LoadState::Unloaded
                }
            }
        };

        drop(guard);
        outcome
    }

    async fn record_reference(&self, logical_key: &str, url: &str, bytes: u64) {
        if let Err(e) = self.resolve(logical_key, url, Some(bytes)).await {
            warn!(key = %logical_key, url = %url, error = %e, "Reference not recorded");
        }
    }

    fn log_eviction(&self, url: &str, report: Option<EvictionReport>) {
        let Some(report) = report else {
            return;
        };
        if !report.satisfied {
            warn!(
                remaining = report.remaining,
                budget = self.budget_bytes,
                "Over budget with nothing left to evict"
            );
        } else if report.evicted.iter().any(|e| e.content_url == url) {
            warn!(url = %url, budget = self.budget_bytes, "New entry evicted, larger than budget");
        }
    }

    /// Apply post-commit effects: delete the files of removed entries
    async fn apply(&self, effects: Effects) {
        for entry in effects.removed {
            let path = self.file_path(&entry.content_url);
            self.fs.remove(&path).await;
            debug!(url = %entry.content_url, path = %path.display(), "Deleted cached file");
        }
    }

    /// Snapshot of all content entries
    pub async fn entries(&self) -> Vec<ContentEntry> {
        self.store.snapshot().await.contents().cloned().collect()
    }

    /// Snapshot of all bindings
    pub async fn bindings(&self) -> Vec<LogicalBinding> {
        self.store.snapshot().await.bindings().cloned().collect()
    }

    /// Current figures
    pub async fn stats(&self) -> CacheStats {
        let records = self.store.snapshot().await;
        CacheStats {
            entries: records.contents().count(),
            bindings: records.bindings().count(),
            usage_bytes: self.usage(),
            budget_bytes: self.budget_bytes,
            active_loads: self.active.len(),
        }
    }

    /// Remove every record and cached file; returns the number of entries removed
    pub async fn clear(&self) -> CacheResult<usize> {
        let (removed, effects) = self.store.transaction(|tx| tx.purge_all()).await?;
        self.apply(effects).await;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Bring records and files back into agreement
    ///
    /// Entries whose file is gone are removed with their bindings; files no
    /// entry accounts for are deleted; usage is recounted. Intended for idle
    /// or startup use: a download that has not been bound yet looks orphaned.
    pub async fn reconcile(&self, dry_run: bool) -> CacheResult<ReconcileReport> {
        let snapshot = self.store.snapshot().await;

        let mut dangling = Vec::new();
        for entry in snapshot.contents() {
            if !self.fs.exists(&self.file_path(&entry.content_url)).await {
                dangling.push(entry.clone());
            }
        }

        let known: HashSet<String> = snapshot
            .contents()
            .map(|e| paths::content_key(&e.content_url))
            .collect();
        let orphan_files: Vec<PathBuf> = self
            .fs
            .list_files(&self.dir)
            .await?
            .into_iter()
            .filter(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                !known.contains(&name)
                    && !name.starts_with(RECORDS_FILE)
                    && !name.ends_with(".part")
            })
            .collect();

        if dry_run {
            return Ok(ReconcileReport {
                dangling_records: dangling,
                orphan_files,
                usage_bytes: self.usage(),
            });
        }

        let (dangling_records, effects) = self
            .store
            .transaction(|tx| {
                dangling
                    .iter()
                    .filter_map(|e| tx.purge(&e.content_url))
                    .collect::<Vec<_>>()
            })
            .await?;
        self.apply(effects).await;

        for path in &orphan_files {
            self.fs.remove(path).await;
            debug!(path = %path.display(), "Deleted orphan file");
        }

        let usage_bytes = self.store.recount_usage().await;
        Ok(ReconcileReport {
            dangling_records,
            orphan_files,
            usage_bytes,
        })
    }
}
