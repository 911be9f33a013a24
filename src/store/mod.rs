//! Bounded, per-owner dataset history.
//!
//! The retention store keeps at most `max_history` datasets per owner scope,
//! newest first. Every insert holds the scope's write lock from loading the
//! stored history through eviction and persistence, so concurrent writers in
//! this process or in other processes sharing the storage never lose each
//! other's datasets. Different scopes never wait on each other.

pub mod backend;
pub mod blob;

#[cfg(test)]
pub use backend::MemoryBackend;
pub use backend::{HistoryBackend, JsonDirBackend};
#[cfg(test)]
pub use blob::NullBlobStore;
pub use blob::{BlobStore, FsBlobStore};

use crate::error::StoreError;
use crate::models::{Dataset, DatasetId, NewDataset, OwnerScope};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Default number of datasets kept per owner scope.
pub const DEFAULT_MAX_HISTORY: usize = 5;

/// Append-only, bounded history of datasets keyed by owner scope.
pub struct RetentionStore {
    max_history: usize,
    backend: Box<dyn HistoryBackend>,
    blobs: Arc<dyn BlobStore>,
    writers: Mutex<HashMap<OwnerScope, Arc<Mutex<()>>>>,
}

impl RetentionStore {
    /// Open a store over `backend`.
    ///
    /// Histories persisted under a larger bound are trimmed to `max_history`
    /// right away, releasing the raw files of the trimmed datasets.
    pub fn open(
        backend: Box<dyn HistoryBackend>,
        blobs: Arc<dyn BlobStore>,
        max_history: usize,
    ) -> Result<Self, StoreError> {
        let store = Self {
            max_history: max_history.max(1),
            backend,
            blobs,
            writers: Mutex::new(HashMap::new()),
        };

        for (scope, history) in store.backend.load_all()? {
            debug!("Scope '{}' holds {} datasets", scope, history.len());
            if history.len() > store.max_history {
                store.trim(&scope)?;
            }
        }

        Ok(store)
    }

    /// A store that lives in memory only and keeps no raw files.
    #[cfg(test)]
    pub fn in_memory(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            backend: Box::new(MemoryBackend::new()),
            blobs: Arc::new(NullBlobStore),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// The blob store used to release evicted raw files.
    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.blobs)
    }

    /// Store a new dataset at the head of `scope`'s history.
    ///
    /// Assigns the next id and, when the draft has none, the current time.
    /// The timestamp is raised to the current head's if it is older, so the
    /// new dataset always becomes the head and is never evicted by its own
    /// insert. Datasets pushed past the bound are evicted oldest first and
    /// their raw files released. If persisting fails nothing changes.
    pub fn insert(&self, scope: &OwnerScope, new: NewDataset) -> Result<Dataset, StoreError> {
        let writer = self.writer(scope)?;
        let _local = lock(&writer)?;
        let _shared = self.backend.lock_scope(scope)?;

        let mut current = self.backend.load_scope(scope)?;
        sort_newest_first(&mut current);

        let id = self.backend.next_id()?;
        let mut created_at = new.created_at.unwrap_or_else(Utc::now);
        if let Some(head) = current.first() {
            if created_at < head.created_at {
                debug!(
                    "Raising timestamp of dataset {} from {} to head {}",
                    id, created_at, head.created_at
                );
                created_at = head.created_at;
            }
        }
        let dataset = Dataset::from_new(id, created_at, scope.clone(), new);

        let mut updated = Vec::with_capacity(current.len() + 1);
        updated.push(dataset.clone());
        updated.extend(current);

        let evicted = if updated.len() > self.max_history {
            updated.split_off(self.max_history)
        } else {
            Vec::new()
        };

        self.backend.save_scope(scope, &updated)?;

        info!(
            "Stored dataset {} ({}, {} records) for '{}'",
            dataset.id, dataset.source_name, dataset.record_count, scope
        );

        for old in &evicted {
            info!(
                "Evicted dataset {} ({}) from '{}'",
                old.id, old.source_name, scope
            );
            release_raw_file(self.blobs.as_ref(), old);
        }

        Ok(dataset)
    }

    /// Datasets of `scope`, newest first.
    pub fn list(&self, scope: &OwnerScope) -> Result<Vec<Dataset>, StoreError> {
        let mut history = self.backend.load_scope(scope)?;
        sort_newest_first(&mut history);
        history.truncate(self.max_history);
        Ok(history)
    }

    /// The dataset with `id` in `scope`'s current history.
    pub fn get(&self, scope: &OwnerScope, id: DatasetId) -> Result<Dataset, StoreError> {
        self.list(scope)?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound {
                scope: scope.clone(),
                id,
            })
    }

    /// Cut `scope`'s stored history down to the bound.
    fn trim(&self, scope: &OwnerScope) -> Result<(), StoreError> {
        let writer = self.writer(scope)?;
        let _local = lock(&writer)?;
        let _shared = self.backend.lock_scope(scope)?;

        let mut history = self.backend.load_scope(scope)?;
        if history.len() <= self.max_history {
            return Ok(());
        }
        sort_newest_first(&mut history);
        let evicted = history.split_off(self.max_history);
        self.backend.save_scope(scope, &history)?;

        for dataset in &evicted {
            info!(
                "Evicted dataset {} ({}) from '{}' on open",
                dataset.id, dataset.source_name, scope
            );
            release_raw_file(self.blobs.as_ref(), dataset);
        }
        Ok(())
    }

    /// In-process write lock of `scope`, created on first write.
    fn writer(&self, scope: &OwnerScope) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut writers = lock(&self.writers)?;
        Ok(Arc::clone(writers.entry(scope.clone()).or_default()))
    }
}

fn release_raw_file(blobs: &dyn BlobStore, dataset: &Dataset) {
    if let Some(path) = &dataset.raw_file {
        blobs.release(path);
    }
}

/// Newest first; the higher id wins when timestamps are equal.
fn sort_newest_first(history: &mut [Dataset]) {
    history.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Unavailable {
        message: "history lock poisoned".to_string(),
    })
}
