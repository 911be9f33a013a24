//! Input discovery for CSV uploads.
//!
//! Explicit file arguments must be CSV files; one that is not, is missing or
//! is oversized is rejected on its own without affecting the others.
//! Directory arguments are walked recursively and every CSV file inside that
//! is not hidden, excluded or oversized is picked up.

use crate::error::IngestError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for input scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory or file names to skip while walking directories.
    pub excludes: Vec<String>,
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// Maximum number of files picked up per run.
    pub max_files: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&crate::config::ScannerConfig::default())
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: config.max_files,
        }
    }
}

/// A CSV file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

/// An explicitly named file that cannot be ingested.
#[derive(Debug)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub error: IngestError,
}

/// Outcome of resolving upload arguments.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Files selected for ingestion, in argument order.
    pub files: Vec<ScannedFile>,
    /// Explicit arguments that were rejected.
    pub rejected: Vec<RejectedFile>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.rejected.is_empty()
    }
}

/// Resolves upload arguments into CSV files.
pub struct CsvScanner {
    config: ScanConfig,
}

impl CsvScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Resolve files and directories into a de-duplicated list of CSV files.
    ///
    /// Explicit files that fail validation are collected in
    /// [`ScanResult::rejected`] instead of failing the whole scan.
    pub fn resolve(&self, inputs: &[PathBuf]) -> ScanResult {
        let mut files = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for input in inputs {
            let found = if input.is_dir() {
                self.walk_dir(input)
            } else {
                match self.check_file(input) {
                    Ok(file) => vec![file],
                    Err(error) => {
                        warn!("Rejected {}: {}", input.display(), error);
                        rejected.push(RejectedFile {
                            path: input.clone(),
                            error,
                        });
                        continue;
                    }
                }
            };

            for file in found {
                if seen.insert(file.path.clone()) {
                    files.push(file);
                }
            }
        }

        if files.len() > self.config.max_files {
            warn!(
                "Found {} CSV files, only the first {} will be ingested",
                files.len(),
                self.config.max_files
            );
            files.truncate(self.config.max_files);
        }

        ScanResult { files, rejected }
    }

    /// Whether `path` has a `.csv` extension, ignoring case.
    pub fn is_csv(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
    }

    /// Validate an explicitly named file.
    fn check_file(&self, path: &Path) -> Result<ScannedFile, IngestError> {
        let metadata = fs::metadata(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if !Self::is_csv(path) {
            return Err(IngestError::UnsupportedFile {
                path: path.to_path_buf(),
            });
        }

        if metadata.len() > self.config.max_file_size {
            return Err(IngestError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.config.max_file_size,
            });
        }

        Ok(ScannedFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Walk a directory recursively, in file name order.
    fn walk_dir(&self, dir: &Path) -> Vec<ScannedFile> {
        let mut files = Vec::new();

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !self.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !Self::is_csv(path) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) if metadata.len() > self.config.max_file_size => {
                    warn!(
                        "Skipping {} ({} bytes exceeds limit of {})",
                        path.display(),
                        metadata.len(),
                        self.config.max_file_size
                    );
                }
                Ok(metadata) => files.push(ScannedFile {
                    path: path.to_path_buf(),
                    size: metadata.len(),
                }),
                Err(e) => debug!("Cannot stat {}: {}", path.display(), e),
            }
        }

        files
    }

    /// Check if a name matches exclusion patterns.
    fn is_excluded(&self, name: &str) -> bool {
        // Hidden files
        if name.starts_with('.') {
            return true;
        }

        self.config.excludes.iter().any(|pattern| name == pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn names(files: &[ScannedFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_is_csv() {
        assert!(CsvScanner::is_csv(Path::new("a.csv")));
        assert!(CsvScanner::is_csv(Path::new("dir/B.CSV")));
        assert!(!CsvScanner::is_csv(Path::new("a.txt")));
        assert!(!CsvScanner::is_csv(Path::new("csv")));
    }

    #[test]
    fn test_walk_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.csv"), "x");
        touch(&dir.path().join("a.csv"), "x");
        touch(&dir.path().join("notes.txt"), "x");
        touch(&dir.path().join("nested/c.csv"), "x");
        touch(&dir.path().join(".hidden/d.csv"), "x");
        touch(&dir.path().join("target/e.csv"), "x");

        let scanner = CsvScanner::new(ScanConfig::default());
        let scan = scanner.resolve(&[dir.path().to_path_buf()]);

        assert_eq!(names(&scan.files), vec!["a.csv", "b.csv", "c.csv"]);
        assert!(scan.rejected.is_empty());
    }

    #[test]
    fn test_explicit_non_csv_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.xlsx");
        touch(&path, "x");

        let scanner = CsvScanner::new(ScanConfig::default());
        let scan = scanner.resolve(&[path.clone()]);
        assert!(scan.files.is_empty());
        assert_eq!(scan.rejected.len(), 1);
        assert_eq!(scan.rejected[0].path, path);
        assert!(matches!(
            scan.rejected[0].error,
            IngestError::UnsupportedFile { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let scanner = CsvScanner::new(ScanConfig::default());
        let scan = scanner.resolve(&[dir.path().join("missing.csv")]);
        assert!(matches!(scan.rejected[0].error, IngestError::Io { .. }));
    }

    #[test]
    fn test_rejected_file_does_not_drop_the_rest() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.csv");
        let notes = dir.path().join("notes.txt");
        touch(&good, "x");
        touch(&notes, "x");

        let scanner = CsvScanner::new(ScanConfig::default());
        let scan = scanner.resolve(&[good, notes.clone(), dir.path().join("gone.csv")]);

        assert_eq!(names(&scan.files), vec!["good.csv"]);
        assert_eq!(scan.rejected.len(), 2);
        assert_eq!(scan.rejected[0].path, notes);
        assert!(matches!(
            scan.rejected[0].error,
            IngestError::UnsupportedFile { .. }
        ));
        assert!(matches!(scan.rejected[1].error, IngestError::Io { .. }));
        assert!(!scan.is_empty());
    }

    #[test]
    fn test_default_excludes_match_config() {
        let config = ScanConfig::default();
        let defaults = crate::config::ScannerConfig::default();
        assert_eq!(config.excludes, defaults.excludes);
        assert!(config.excludes.iter().any(|e| e == "venv"));
        assert_eq!(config.max_files, defaults.max_files);
        assert_eq!(config.max_file_size, defaults.max_file_size);

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("venv/lib/data.csv"), "x");
        touch(&dir.path().join("kept.csv"), "x");
        let scan = CsvScanner::new(config).resolve(&[dir.path().to_path_buf()]);
        assert_eq!(names(&scan.files), vec!["kept.csv"]);
    }

    #[test]
    fn test_size_and_count_limits() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("big.csv"), "0123456789");
        touch(&dir.path().join("a.csv"), "x");
        touch(&dir.path().join("b.csv"), "x");
        touch(&dir.path().join("c.csv"), "x");

        let scanner = CsvScanner::new(ScanConfig {
            excludes: Vec::new(),
            max_file_size: 5,
            max_files: 2,
        });

        let scan = scanner.resolve(&[dir.path().to_path_buf()]);
        assert_eq!(names(&scan.files), vec!["a.csv", "b.csv"]);

        let scan = scanner.resolve(&[dir.path().join("big.csv"), dir.path().join("a.csv")]);
        assert_eq!(names(&scan.files), vec!["a.csv"]);
        assert!(matches!(
            scan.rejected[0].error,
            IngestError::FileTooLarge { size: 10, limit: 5, .. }
        ));
    }

    #[test]
    fn test_duplicates_are_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv");
        touch(&path, "x");

        let scanner = CsvScanner::new(ScanConfig::default());
        let scan = scanner.resolve(&[path.clone(), dir.path().to_path_buf()]);
        assert_eq!(scan.files.len(), 1);
    }
}
