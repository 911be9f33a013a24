//! Durable backends for dataset histories.
//!
//! A backend loads and saves whole per-scope histories, hands out dataset
//! ids and provides the write lock of a scope. Ordering and bounds are the
//! retention store's job.

use crate::error::StoreError;
use crate::models::{Dataset, DatasetId, OwnerScope};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Persistence collaborator keyed by owner scope.
pub trait HistoryBackend: Send + Sync {
    /// Load every stored scope with its datasets.
    fn load_all(&self) -> Result<Vec<(OwnerScope, Vec<Dataset>)>, StoreError>;

    /// Load the stored history of `scope`, empty when it has none.
    fn load_scope(&self, scope: &OwnerScope) -> Result<Vec<Dataset>, StoreError>;

    /// Replace the stored history of `scope` with `history`.
    fn save_scope(&self, scope: &OwnerScope, history: &[Dataset]) -> Result<(), StoreError>;

    /// Take the write lock of `scope`, held until the returned guard drops.
    ///
    /// Excludes writers of the same scope in other processes sharing the
    /// storage. Writers within one process are serialized by the store.
    fn lock_scope(&self, scope: &OwnerScope) -> Result<ScopeLock, StoreError>;

    /// Reserve the next dataset id. Ids are never handed out twice, across
    /// scopes and across processes sharing the storage.
    fn next_id(&self) -> Result<DatasetId, StoreError>;
}

/// Exclusive advisory lock on a file, released on drop.
#[derive(Debug)]
struct LockFile {
    file: File,
}

impl LockFile {
    /// Open (creating if needed) and lock `path`, blocking until the lock is free.
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            while unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(err.into());
                }
            }
        }

        Ok(Self { file })
    }

    fn read_content(&mut self) -> std::io::Result<String> {
        let mut content = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut content)?;
        Ok(content)
    }

    fn replace_content(&mut self, content: &str) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(content.as_bytes())?;
        self.file.sync_all()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays; removing it would let a waiter lock a deleted inode.
    }
}

/// Guard returned by [`HistoryBackend::lock_scope`].
#[derive(Debug)]
pub struct ScopeLock {
    _file: Option<LockFile>,
}

impl ScopeLock {
    /// A guard for backends with no state shared outside the process.
    #[cfg(test)]
    pub fn unshared() -> Self {
        Self { _file: None }
    }

    fn file(file: LockFile) -> Self {
        Self { _file: Some(file) }
    }
}

/// Backend that keeps histories in process memory only.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    scopes: std::sync::Mutex<std::collections::HashMap<OwnerScope, Vec<Dataset>>>,
    last_id: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn scopes(
        &self,
    ) -> Result<
        std::sync::MutexGuard<'_, std::collections::HashMap<OwnerScope, Vec<Dataset>>>,
        StoreError,
    > {
        self.scopes.lock().map_err(|_| StoreError::Unavailable {
            message: "memory backend lock poisoned".to_string(),
        })
    }
}

#[cfg(test)]
impl HistoryBackend for MemoryBackend {
    fn load_all(&self) -> Result<Vec<(OwnerScope, Vec<Dataset>)>, StoreError> {
        Ok(self
            .scopes()?
            .iter()
            .map(|(scope, history)| (scope.clone(), history.clone()))
            .collect())
    }

    fn load_scope(&self, scope: &OwnerScope) -> Result<Vec<Dataset>, StoreError> {
        Ok(self.scopes()?.get(scope).cloned().unwrap_or_default())
    }

    fn save_scope(&self, scope: &OwnerScope, history: &[Dataset]) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        let max_id = history.iter().map(|d| d.id).max().unwrap_or(0);
        self.last_id.fetch_max(max_id, Ordering::SeqCst);
        self.scopes()?.insert(scope.clone(), history.to_vec());
        Ok(())
    }

    fn lock_scope(&self, _scope: &OwnerScope) -> Result<ScopeLock, StoreError> {
        Ok(ScopeLock::unshared())
    }

    fn next_id(&self) -> Result<DatasetId, StoreError> {
        use std::sync::atomic::Ordering;
        Ok(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// On-disk form of one scope's history.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    scope: OwnerScope,
    datasets: Vec<Dataset>,
}

const DOCUMENT_PREFIX: &str = "history-";
const DOCUMENT_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";
const ID_COUNTER_FILE: &str = "last-id";

/// Backend storing one JSON document per scope in a directory.
///
/// Documents are written to a temporary file in the same directory and
/// renamed into place, so a crash never leaves a half-written history.
/// Each scope has a sibling `.lock` file for its write lock, and the last
/// assigned id is kept in a `last-id` counter file.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the document for `scope`. Scope names are hex-encoded so any
    /// owner name maps to a distinct, filesystem-safe file name.
    fn document_path(&self, scope: &OwnerScope) -> PathBuf {
        self.scope_file(scope, DOCUMENT_EXTENSION)
    }

    fn lock_path(&self, scope: &OwnerScope) -> PathBuf {
        self.scope_file(scope, LOCK_EXTENSION)
    }

    fn scope_file(&self, scope: &OwnerScope, extension: &str) -> PathBuf {
        let encoded: String = scope
            .as_str()
            .bytes()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.dir
            .join(format!("{}{}.{}", DOCUMENT_PREFIX, encoded, extension))
    }

    fn read_document(path: &Path) -> Result<HistoryDocument, StoreError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Highest id in any stored document, 0 when there is none.
    fn max_stored_id(&self) -> Result<DatasetId, StoreError> {
        Ok(self
            .load_all()?
            .iter()
            .flat_map(|(_, history)| history.iter().map(|d| d.id))
            .max()
            .unwrap_or(0))
    }

    fn is_document(path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.starts_with(DOCUMENT_PREFIX)
            && path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
    }
}

impl HistoryBackend for JsonDirBackend {
    fn load_all(&self) -> Result<Vec<(OwnerScope, Vec<Dataset>)>, StoreError> {
        if !self.dir.exists() {
            debug!("History directory {} does not exist yet", self.dir.display());
            return Ok(Vec::new());
        }

        let mut scopes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !Self::is_document(&path) {
                continue;
            }

            let document = Self::read_document(&path)?;
            debug!(
                "Loaded {} datasets for '{}' from {}",
                document.datasets.len(),
                document.scope,
                path.display()
            );
            scopes.push((document.scope, document.datasets));
        }

        Ok(scopes)
    }

    fn load_scope(&self, scope: &OwnerScope) -> Result<Vec<Dataset>, StoreError> {
        let path = self.document_path(scope);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(Self::read_document(&path)?.datasets)
    }

    fn save_scope(&self, scope: &OwnerScope, history: &[Dataset]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let document = HistoryDocument {
            scope: scope.clone(),
            datasets: history.to_vec(),
        };

        let mut file = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, &document)?;
        file.flush()?;

        let path = self.document_path(scope);
        file.persist(&path).map_err(|e| StoreError::Unavailable {
            message: format!("Failed to write {}: {}", path.display(), e.error),
        })?;

        Ok(())
    }

    fn lock_scope(&self, scope: &OwnerScope) -> Result<ScopeLock, StoreError> {
        fs::create_dir_all(&self.dir)?;
        Ok(ScopeLock::file(LockFile::acquire(&self.lock_path(scope))?))
    }

    fn next_id(&self) -> Result<DatasetId, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let mut counter = LockFile::acquire(&self.dir.join(ID_COUNTER_FILE))?;

        let content = counter.read_content()?;
        let last = match content.trim().parse::<DatasetId>() {
            Ok(last) => last,
            Err(_) => {
                if !content.trim().is_empty() {
                    warn!(
                        "Id counter in {} is unreadable, recomputing from stored datasets",
                        self.dir.display()
                    );
                }
                self.max_stored_id()?
            }
        };

        let id = last + 1;
        counter.replace_content(&id.to_string())?;
        Ok(id)
    }
}
