//! Recursive discovery of files under the source root.

use crate::classifier::{Classification, Classifier, FileEntry, SkipReason};
use crate::dispatcher::Dispatch;
use crate::pipeline::WorkUnit;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters for one walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkStats {
    pub files_seen: usize,
    pub dispatched: usize,
    /// Skipped files keyed by [`SkipReason::label`](crate::classifier::SkipReason::label).
    pub skipped: BTreeMap<&'static str, usize>,
    /// Entries that could not be read and were passed over.
    pub errors: usize,
}

impl WalkStats {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

pub struct Walker {
    classifier: Classifier,
    follow_symlinks: bool,
    skip_dirs: Vec<PathBuf>,
}

impl Walker {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            follow_symlinks: false,
            skip_dirs: Vec::new(),
        }
    }

    /// Follow symbolic links. Loops are reported and skipped, never entered.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Never descend into `dir`; used for an archive nested in the source.
    pub fn skip_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_dirs.push(dir.into());
        self
    }

    /// Walks `root`, classifying every regular file and dispatching the
    /// processable ones.
    ///
    /// Unreadable entries are logged and skipped; the walk itself never
    /// fails.
    pub fn walk<D: Dispatch>(&self, root: &Path, dispatcher: &mut D) -> WalkStats {
        let mut stats = WalkStats::default();

        let entries = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                let skip = entry.file_type().is_dir()
                    && self.skip_dirs.iter().any(|dir| entry.path() == dir);
                if skip {
                    debug!(path = %entry.path().display(), "not descending into archive");
                }
                !skip
            });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    if e.loop_ancestor().is_some() {
                        warn!(%path, "symbolic link loop, skipping");
                    } else {
                        warn!(%path, error = %e, "unable to read entry, skipping");
                    }
                    stats.errors += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() && entry.path().is_file() {
                stats.files_seen += 1;
                self.record_skip(&mut stats, entry.path(), SkipReason::Symlink);
                continue;
            }
            if !file_type.is_file() {
                if !file_type.is_dir() {
                    debug!(path = %entry.path().display(), "not a regular file");
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "unable to read metadata, skipping");
                    stats.errors += 1;
                    continue;
                }
            };

            stats.files_seen += 1;
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let file = FileEntry::new(entry.path().to_path_buf(), relative, &metadata);

            match self.classifier.classify(&file) {
                Classification::Skip(reason) => self.record_skip(&mut stats, &file.path, reason),
                Classification::Processable(field) => {
                    debug!(path = %file.path.display(), field = %field, "dispatching");
                    dispatcher.dispatch(WorkUnit::new(file.path, field));
                    stats.dispatched += 1;
                }
            }
        }

        stats
    }

    fn record_skip(&self, stats: &mut WalkStats, path: &Path, reason: SkipReason) {
        info!(path = %path.display(), reason = %reason, "skipped");
        *stats.skipped.entry(reason.label()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{DateField, MediaMapper};
    use crate::config::{ArchiveConfig, ExcludeRules};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        units: Vec<WorkUnit>,
    }

    impl Dispatch for Recorder {
        fn dispatch(&mut self, unit: WorkUnit) {
            self.units.push(unit);
        }
    }

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(units: &[WorkUnit]) -> Vec<String> {
        let mut names: Vec<_> = units
            .iter()
            .map(|u| u.file_name.to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walk_classifies_and_dispatches() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write(root, "IMG_0001.JPG", b"photo");
        write(root, "trip/VID_0002.MOV", b"video");
        write(root, "trip/day2/scan.png", b"image");
        write(root, "notes.txt", b"text");
        write(root, "empty.jpg", b"");
        write(root, ".DS_Store", b"junk");

        let mut recorder = Recorder::default();
        let stats = Walker::new(Classifier::default()).walk(root, &mut recorder);

        assert_eq!(
            names(&recorder.units),
            vec!["IMG_0001.JPG", "VID_0002.MOV", "scan.png"]
        );
        assert_eq!(stats.files_seen, 6);
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.skipped.get("unknown file type"), Some(&1));
        assert_eq!(stats.skipped.get("zero content"), Some(&1));
        assert_eq!(stats.skipped.get("system file"), Some(&1));
        assert_eq!(stats.skipped_total(), 3);

        let png = recorder
            .units
            .iter()
            .find(|u| u.file_name == "scan.png")
            .unwrap();
        assert_eq!(png.field, DateField::DateCreated);
        assert_eq!(png.directory, root.join("trip").join("day2"));
    }

    #[test]
    fn test_nested_archive_is_not_walked() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write(root, "IMG_0001.JPG", b"photo");
        write(root, "archive/2021/01/IMG_0009.JPG", b"archived");

        let mut recorder = Recorder::default();
        Walker::new(Classifier::default())
            .skip_dir(root.join("archive"))
            .walk(root, &mut recorder);

        assert_eq!(names(&recorder.units), vec!["IMG_0001.JPG"]);
    }

    #[test]
    fn test_exclusions_are_counted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write(root, "IMG_0001.JPG", b"photo");
        write(root, "phone/.thumbnails/t1.jpg", b"thumb");

        let config = ArchiveConfig {
            exclude: ExcludeRules {
                patterns: vec!["**/.thumbnails/**".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let classifier = Classifier::new(MediaMapper::default(), config.compile_filters().ok());

        let mut recorder = Recorder::default();
        let stats = Walker::new(classifier).walk(root, &mut recorder);

        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.skipped.get("excluded"), Some(&1));
    }

    #[test]
    fn test_walk_visits_every_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        for i in 0..5 {
            write(root, &format!("IMG_{i:04}.JPG"), b"photo");
        }

        let mut recorder = Recorder::default();
        let stats = Walker::new(Classifier::default()).walk(root, &mut recorder);

        assert_eq!(recorder.units.len(), 5);
        assert_eq!(stats.dispatched, 5);
    }

    #[test]
    fn test_missing_root_is_counted_not_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut recorder = Recorder::default();
        let stats = Walker::new(Classifier::default())
            .walk(&temp_dir.path().join("missing"), &mut recorder);

        assert_eq!(stats.errors, 1);
        assert!(recorder.units.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write(root, "trip/IMG_0001.JPG", b"photo");
        std::os::unix::fs::symlink(root, root.join("trip").join("back")).unwrap();

        let mut recorder = Recorder::default();
        let stats = Walker::new(Classifier::default())
            .follow_symlinks(true)
            .walk(root, &mut recorder);

        assert_eq!(names(&recorder.units), vec!["IMG_0001.JPG"]);
        assert_eq!(stats.errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unfollowed_symlink_is_counted_as_skip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("incoming");
        write(&root, "IMG_0001.JPG", b"photo");
        let elsewhere = temp_dir.path().join("elsewhere");
        write(&elsewhere, "IMG_0002.JPG", b"photo");
        std::os::unix::fs::symlink(elsewhere.join("IMG_0002.JPG"), root.join("linked.JPG")).unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("linked_dir")).unwrap();

        let mut recorder = Recorder::default();
        let stats = Walker::new(Classifier::default()).walk(&root, &mut recorder);

        assert_eq!(names(&recorder.units), vec!["IMG_0001.JPG"]);
        assert_eq!(stats.skipped.get("symbolic link"), Some(&1));
        assert_eq!(stats.files_seen, 2);
    }
}
