//! Read-only report of media files that share identical content.
//!
//! Files are grouped by size first; only sizes seen more than once are
//! hashed, in parallel, and grouped again by content hash.

use crate::classifier::{Classification, Classifier, FileEntry};
use crate::reconciler::hash_file;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Hex content hash shared by every path.
    pub hash: String,
    pub size: u64,
    /// Sorted paths, at least two.
    pub paths: Vec<PathBuf>,
}

/// Finds groups of processable media files under `root` with identical
/// content. Nothing is moved or deleted.
///
/// Unreadable entries are logged and left out. Groups are ordered by their
/// first path.
pub fn find_duplicates(
    root: &Path,
    classifier: &Classifier,
    follow_symlinks: bool,
) -> Vec<DuplicateGroup> {
    let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "unable to read entry, skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "unable to read metadata, skipping");
                continue;
            }
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let file = FileEntry::new(entry.path().to_path_buf(), relative, &metadata);
        match classifier.classify(&file) {
            Classification::Processable(_) => by_size.entry(file.size).or_default().push(file.path),
            Classification::Skip(reason) => {
                debug!(path = %file.path.display(), reason = %reason, "not compared")
            }
        }
    }

    let by_hash: DashMap<(u64, blake3::Hash), Vec<PathBuf>> = DashMap::new();
    let candidates: Vec<(u64, PathBuf)> = by_size
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .flat_map(|(size, paths)| paths.into_iter().map(move |path| (size, path)))
        .collect();

    candidates
        .into_par_iter()
        .for_each(|(size, path)| match hash_file(&path) {
            Ok(hash) => by_hash.entry((size, hash)).or_default().push(path),
            Err(e) => warn!(path = %path.display(), error = %e, "unable to hash, skipping"),
        });

    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|((size, hash), mut paths)| {
            paths.sort();
            DuplicateGroup {
                hash: hash.to_hex().to_string(),
                size,
                paths,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.paths.cmp(&b.paths));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_identical_files_are_grouped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let a = write(root, "phone/IMG_0001.JPG", b"beach photo");
        let b = write(root, "backup/copy_of_IMG_0001.jpg", b"beach photo");
        // Same size, different content.
        write(root, "phone/IMG_0002.JPG", b"beach PHOTO");
        write(root, "phone/VID_0003.MOV", b"a video clip");

        let groups = find_duplicates(root, &Classifier::default(), false);

        assert_eq!(groups.len(), 1);
        let mut expected = vec![a.clone(), b];
        expected.sort();
        assert_eq!(groups[0].paths, expected);
        assert_eq!(groups[0].size, 11);
        assert_eq!(groups[0].hash, hash_file(&a).unwrap().to_hex().to_string());
    }

    #[test]
    fn test_non_media_files_are_not_compared() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write(root, "notes.txt", b"same text");
        write(root, "notes_copy.txt", b"same text");
        write(root, ".hidden.jpg", b"same text");
        write(root, "IMG_0001.JPG", b"same text");

        assert!(find_duplicates(root, &Classifier::default(), false).is_empty());
    }

    #[test]
    fn test_files_are_left_in_place() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let a = write(root, "IMG_0001.JPG", b"photo");
        let b = write(root, "IMG_0002.JPG", b"photo");
        let c = write(root, "IMG_0003.JPG", b"photo");

        let groups = find_duplicates(root, &Classifier::default(), false);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].paths, vec![a.clone(), b.clone(), c.clone()]);
        assert!(a.exists() && b.exists() && c.exists());
    }
}
