//! Memo of archive directories known to exist during this run.
//!
//! The cache is shared by every unit of work. It never shrinks and is never
//! persisted; the filesystem stays the source of truth, so losing a race to
//! create a directory is treated the same as finding it already there.

use crate::error::ArchiveError;
use dashmap::DashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};

#[derive(Debug, Default)]
pub struct DirectoryCache {
    known: DashSet<PathBuf>,
    creation_attempts: AtomicUsize,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `path` exists as a directory.
    ///
    /// Creation is non-recursive: the parent must already exist, which is why
    /// callers ensure the year directory before the month directory.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DirectoryCreation`] when the directory is
    /// missing and cannot be created. Callers treat this as fatal.
    pub fn ensure(&self, path: &Path) -> Result<(), ArchiveError> {
        if self.known.contains(path) {
            return Ok(());
        }

        if path.is_dir() {
            self.known.insert(path.to_path_buf());
            return Ok(());
        }

        self.creation_attempts.fetch_add(1, Ordering::Relaxed);
        match fs::create_dir(path) {
            Ok(()) => debug!(path = %path.display(), "created directory"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
                debug!(path = %path.display(), "directory created concurrently");
            }
            Err(source) => {
                error!(path = %path.display(), error = %source, "did not exist and creation failed");
                return Err(ArchiveError::DirectoryCreation {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        self.known.insert(path.to_path_buf());
        Ok(())
    }

    /// Whether `path` has been confirmed during this run.
    pub fn contains(&self, path: &Path) -> bool {
        self.known.contains(path)
    }

    /// Number of directories confirmed so far.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Number of physical `create_dir` calls made.
    pub fn creation_attempts(&self) -> usize {
        self.creation_attempts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_creates_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DirectoryCache::new();
        let year = temp_dir.path().join("2021");

        cache.ensure(&year).expect("Failed to ensure directory");

        assert!(year.is_dir());
        assert!(cache.contains(&year));
        assert_eq!(cache.creation_attempts(), 1);
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DirectoryCache::new();
        let year = temp_dir.path().join("2021");

        cache.ensure(&year).expect("first ensure");
        cache.ensure(&year).expect("second ensure");

        assert!(year.is_dir());
        assert_eq!(cache.creation_attempts(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_existing_directory_is_recorded_without_creation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DirectoryCache::new();

        cache.ensure(temp_dir.path()).expect("existing directory");

        assert_eq!(cache.creation_attempts(), 0);
        assert!(cache.contains(temp_dir.path()));
    }

    #[test]
    fn test_creation_is_not_recursive() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DirectoryCache::new();
        let month = temp_dir.path().join("2021").join("05");

        let result = cache.ensure(&month);

        assert!(matches!(
            result,
            Err(ArchiveError::DirectoryCreation { .. })
        ));
        assert!(!month.exists());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_in_the_way_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DirectoryCache::new();
        let blocker = temp_dir.path().join("2021");
        fs::write(&blocker, b"not a directory").unwrap();

        assert!(cache.ensure(&blocker).is_err());
    }

    #[test]
    fn test_concurrent_ensure_all_succeed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = Arc::new(DirectoryCache::new());
        let year = temp_dir.path().join("2021");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let year = year.clone();
                thread::spawn(move || cache.ensure(&year))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().expect("concurrent ensure");
        }
        assert!(year.is_dir());
        assert_eq!(cache.len(), 1);
    }
}
