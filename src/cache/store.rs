//! Transactional record store
//!
//! [`RecordStore`] owns the live [`Records`] document and a
//! [`StorageBackend`] that persists it. A transaction runs a closure against
//! a working copy; the copy is committed to the backend and only then
//! published, so a rejected commit leaves the store untouched and observers
//! never see half of a multi-table write.
//!
//! Several processes may share one cache directory. Each transaction holds
//! the backend's exclusive lock and starts from the document as last
//! committed by anyone, so no process overwrites another's commit.

use crate::cache::records::{ContentEntry, Records};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tracing::{debug, warn};

/// File name of the record document inside the cache directory
pub const RECORDS_FILE: &str = "records.json";

/// Source of "now" in unix seconds
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall clock in unix seconds
pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp())
}

/// Persistence engine behind the record store
///
/// A commit either fully applies the given document or returns an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the last committed document (empty if none exists yet)
    async fn load(&self) -> CacheResult<Records>;

    /// Persist a complete document
    async fn commit(&self, records: &Records) -> CacheResult<()>;

    /// Exclusive access to the persisted document for one transaction
    ///
    /// Backends that are never shared between processes need no guard.
    async fn lock(&self) -> CacheResult<Option<RecordsLock>> {
        Ok(None)
    }
}

/// Advisory lock on a file next to the record document; released on drop
pub struct RecordsLock {
    file: File,
    path: PathBuf,
}

impl RecordsLock {
    /// Block until the exclusive lock on `path` is held
    pub fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RecordsLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release records lock");
        }
    }
}

/// Record document stored as JSON, replaced atomically on each commit
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Backend writing to an explicit file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Backend writing [`RECORDS_FILE`] inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(RECORDS_FILE))
    }

    /// Path of the record document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load(&self) -> CacheResult<Records> {
        if !self.path.exists() {
            debug!("No record document at {}, starting empty", self.path.display());
            return Ok(Records::default());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            CacheError::io(format!("reading records from {}", self.path.display()), e)
        })?;

        serde_json::from_str(&content).map_err(|e| CacheError::RecordsCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn commit(&self, records: &Records) -> CacheResult<()> {
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.tmp_path();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Commit(format!("creating {}: {}", parent.display(), e)))?;
        }

        fs::write(&tmp, content)
            .await
            .map_err(|e| CacheError::Commit(format!("writing {}: {}", tmp.display(), e)))?;

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CacheError::Commit(format!("replacing {}: {}", self.path.display(), e)))
    }

    async fn lock(&self) -> CacheResult<Option<RecordsLock>> {
        let path = self.lock_path();
        let context = format!("locking {}", path.display());

        let lock = tokio::task::spawn_blocking(move || RecordsLock::acquire(&path))
            .await
            .map_err(|e| CacheError::Internal(format!("records lock task failed: {e}")))?
            .map_err(|e| CacheError::io(context, e))?;
        Ok(Some(lock))
    }
}

/// In-process backend; commits can be made to fail on demand
#[derive(Default)]
pub struct MemoryBackend {
    committed: Mutex<Records>,
    reject: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail (or succeed again)
    pub fn reject_commits(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> CacheResult<Records> {
        Ok(self
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn commit(&self, records: &Records) -> CacheResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(CacheError::Commit("memory backend rejecting writes".to_string()));
        }
        *self.committed.lock().unwrap_or_else(PoisonError::into_inner) = records.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Work left for the caller after a commit: usage to add and entries whose
/// files must be deleted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    /// Bytes of newly created entries
    pub added_bytes: u64,
    /// Entries removed from the store
    pub removed: Vec<ContentEntry>,
}

impl Effects {
    /// Bytes of all removed entries
    pub fn removed_bytes(&self) -> u64 {
        self.removed.iter().map(|e| e.byte_size).sum()
    }

    /// Whether nothing outside the store needs doing
    pub fn is_empty(&self) -> bool {
        self.added_bytes == 0 && self.removed.is_empty()
    }
}

/// A working copy of the records plus the effects accumulated so far
///
/// Operations are added by the `content`, `binding` and `eviction` modules.
pub struct Transaction<'a> {
    pub(crate) records: &'a mut Records,
    pub(crate) effects: Effects,
    pub(crate) now: i64,
    pub(crate) dirty: bool,
    base_usage: u64,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(records: &'a mut Records, now: i64) -> Self {
        let base_usage = records.total_bytes();
        Self {
            records,
            effects: Effects::default(),
            now,
            dirty: false,
            base_usage,
        }
    }

    /// Process usage as it will be once this transaction commits
    pub fn usage(&self) -> u64 {
        (self.base_usage + self.effects.added_bytes).saturating_sub(self.effects.removed_bytes())
    }

    /// Read access to the working copy
    pub fn records(&self) -> &Records {
        &*self.records
    }

    /// Timestamp shared by every write in this transaction
    pub fn now(&self) -> i64 {
        self.now
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// The live record document, its transaction boundary and the
/// process-wide usage total
///
/// Usage is recomputed from the document each transaction starts from, so
/// it also picks up commits made by other processes, and is updated before
/// the next transaction can start.
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    records: tokio::sync::Mutex<Records>,
    usage: AtomicU64,
    clock: Clock,
}

impl RecordStore {
    /// Open the store, loading the last committed document from `backend`
    pub async fn open(backend: Arc<dyn StorageBackend>) -> CacheResult<Self> {
        let records = backend.load().await?;
        debug!(
            contents = records.contents.len(),
            bindings = records.bindings.len(),
            "Record store opened"
        );
        Ok(Self {
            backend,
            usage: AtomicU64::new(records.total_bytes()),
            records: tokio::sync::Mutex::new(records),
            clock: system_clock(),
        })
    }

    /// Bytes held by live entries
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::SeqCst)
    }

    /// Reset usage to the sum over the committed document
    pub async fn recount_usage(&self) -> u64 {
        let live = self.records.lock().await;
        let total = live.total_bytes();
        self.usage.store(total, Ordering::SeqCst);
        total
    }

    /// Replace the clock used to stamp writes
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// A copy of the current committed document
    pub async fn snapshot(&self) -> Records {
        self.records.lock().await.clone()
    }

    /// Run `f` atomically
    ///
    /// Transactions are serialized within the process and, through the
    /// backend lock, across processes. `f` runs against a fresh load of the
    /// committed document. If `f` changed anything the working copy is
    /// committed; a commit failure discards it and returns the error.
    /// Effects are handed back for the caller to apply outside the store.
    pub async fn transaction<T, F>(&self, f: F) -> CacheResult<(T, Effects)>
    where
        F: FnOnce(&mut Transaction<'_>) -> T,
    {
        let mut live = self.records.lock().await;
        let _exclusive = self.backend.lock().await?;
        let mut working = self.backend.load().await?;

        let (value, effects, dirty, usage) = {
            let mut tx = Transaction::new(&mut working, (self.clock)());
            let value = f(&mut tx);
            let usage = tx.usage();
            (value, tx.effects, tx.dirty, usage)
        };

        if dirty {
            self.backend.commit(&working).await?;
        }
        *live = working;
        self.usage.store(usage, Ordering::SeqCst);

        Ok((value, effects))
    }
}
