//! In-memory cache of decoded buckets.
//!
//! While the process is alive the cache is the source of truth: the file
//! store is read once per bucket (on first access) and written on flush.
//!
//! # Concurrency
//!
//! Each bucket lives behind its own `Arc<Mutex<Vec<FlightSession>>>`.
//! Callers lock the bucket, mutate the array in place, and write it back
//! through [`HistoryCache::write_locked`] before releasing the guard, so
//! "load, merge, flush" is one critical section per bucket. Two saves for
//! different drones in the same week queue up on that mutex instead of
//! overwriting each other's changes.

use std::collections::HashMap;
use std::sync::Arc;

use skywatch_protocol::FlightSession;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{FileStore, StoreError};

/// A cached bucket, shared by reference.
pub type SharedBucket = Arc<Mutex<Vec<FlightSession>>>;

/// Lazily populated map from bucket filename to its session array.
pub struct HistoryCache {
    store: FileStore,
    /// Held across the first load of a bucket so two tasks never load
    /// the same file twice and end up with diverging arrays.
    buckets: Mutex<HashMap<String, SharedBucket>>,
}

impl HistoryCache {
    pub fn new(store: FileStore) -> Self {
        Self {
            store,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying file store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Returns the cached bucket, loading it from disk on first access.
    ///
    /// The loaded array is cached even when empty. A corrupt file is
    /// logged and replaced in memory by an empty bucket: losing one
    /// unreadable week is preferable to refusing every save into it.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the file exists but can't be read. Nothing
    /// is cached in that case, so the next call retries the load.
    pub async fn get(&self, filename: &str) -> Result<SharedBucket, StoreError> {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get(filename) {
            return Ok(Arc::clone(bucket));
        }

        let sessions = match self.store.load(filename).await {
            Ok(sessions) => sessions,
            Err(StoreError::CorruptData { path, source }) => {
                error!(
                    path = %path.display(),
                    error = %source,
                    "history bucket is corrupt, continuing with an empty bucket"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        debug!(%filename, sessions = sessions.len(), "bucket loaded into cache");
        let bucket = Arc::new(Mutex::new(sessions));
        buckets.insert(filename.to_string(), Arc::clone(&bucket));
        Ok(bucket)
    }

    /// Returns the bucket only if it is already cached.
    pub async fn cached(&self, filename: &str) -> Option<SharedBucket> {
        self.buckets.lock().await.get(filename).cloned()
    }

    /// Writes the current contents of a cached bucket to disk.
    ///
    /// Returns `false` if the bucket isn't cached or is empty.
    pub async fn flush(&self, filename: &str) -> Result<bool, StoreError> {
        let Some(bucket) = self.cached(filename).await else {
            return Ok(false);
        };
        let sessions = bucket.lock().await;
        self.store.save(filename, &sessions).await
    }

    /// Writes `sessions` for `filename` while the caller still holds the
    /// bucket's guard. This is the flush used inside a critical section;
    /// calling [`flush`](Self::flush) there would deadlock on the same
    /// mutex.
    pub async fn write_locked(
        &self,
        filename: &str,
        sessions: &[FlightSession],
    ) -> Result<bool, StoreError> {
        self.store.save(filename, sessions).await
    }

    /// Flushes every cached bucket. Used at shutdown.
    ///
    /// Every bucket is attempted even if an earlier one fails; the first
    /// failure is returned. On success, returns how many files were written.
    pub async fn flush_all(&self) -> Result<usize, StoreError> {
        let entries: Vec<(String, SharedBucket)> = self
            .buckets
            .lock()
            .await
            .iter()
            .map(|(name, bucket)| (name.clone(), Arc::clone(bucket)))
            .collect();

        let mut written = 0;
        let mut first_error = None;
        for (filename, bucket) in entries {
            let sessions = bucket.lock().await;
            match self.store.save(&filename, &sessions).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(%filename, error = %e, "failed to flush bucket");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Names of all cached buckets, sorted.
    pub async fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
