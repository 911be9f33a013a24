//! Storage of raw uploaded files.
//!
//! Each dataset may keep a copy of the file it was built from. When the
//! retention store evicts a dataset, its copy is released here.

use crate::error::StoreError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, warn};

/// Blob storage collaborator for raw input files.
pub trait BlobStore: Send + Sync {
    /// Store a copy of a raw upload and return its location.
    fn store(&self, source_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError>;

    /// Release a stored raw file. Failures are logged, never returned.
    fn release(&self, path: &Path);
}

/// Blob store writing raw files into a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File stem safe to embed in a blob name.
    fn sanitize_stem(source_name: &str) -> String {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");

        let cleaned: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();

        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned
        }
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, source_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;

        let prefix = format!("{}-", Self::sanitize_stem(source_name));
        let mut file = Builder::new()
            .prefix(&prefix)
            .suffix(".csv")
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        let (_, path) = file.keep().map_err(|e| StoreError::Unavailable {
            message: format!("Failed to keep raw file for {}: {}", source_name, e.error),
        })?;

        debug!("Stored raw file for {} at {}", source_name, path.display());
        Ok(path)
    }

    fn release(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!("Released raw file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Raw file {} was already gone", path.display())
            }
            Err(e) => warn!("Failed to release raw file {}: {}", path.display(), e),
        }
    }
}

/// Blob store for setups that never keep raw files.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBlobStore;

#[cfg(test)]
impl BlobStore for NullBlobStore {
    fn store(&self, _source_name: &str, _bytes: &[u8]) -> Result<PathBuf, StoreError> {
        Err(StoreError::Unavailable {
            message: "raw file storage is disabled".to_string(),
        })
    }

    fn release(&self, path: &Path) {
        warn!(
            "Cannot release raw file {}: no blob storage is configured",
            path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_release() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path().join("blobs"));

        let path = blobs.store("plant.csv", b"a,b\n1,2\n").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n1,2\n");

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("plant-"));
        assert!(name.ends_with(".csv"));

        blobs.release(&path);
        assert!(!path.exists());
    }

    #[test]
    fn test_same_source_name_gets_distinct_files() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        let first = blobs.store("plant.csv", b"1").unwrap();
        let second = blobs.store("plant.csv", b"2").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_release_missing_file_is_quiet() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        blobs.release(&dir.path().join("gone.csv"));
    }

    #[test]
    fn test_sanitize_stem() {
        assert_eq!(FsBlobStore::sanitize_stem("../etc/pass wd.csv"), "pass_wd");
        assert_eq!(FsBlobStore::sanitize_stem("plant data.CSV"), "plant_data");
        assert_eq!(FsBlobStore::sanitize_stem(""), "upload");
    }

    #[test]
    fn test_null_store_refuses_to_store() {
        assert!(matches!(
            NullBlobStore.store("x.csv", b""),
            Err(StoreError::Unavailable { .. })
        ));
    }
}
