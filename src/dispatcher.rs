//! Hands units of work to a bounded pool of workers.
//!
//! The walker never waits for a unit to finish. Each dispatched unit runs on
//! one of a fixed number of worker threads, so at most that many metadata
//! processes and file moves are in flight at once. Units report back over a
//! channel that is drained when the walk is over.
//!
//! Units are independent: a fatal condition ends the unit that hit it and is
//! counted, while every other dispatched unit still runs to completion.

use crate::pipeline::{Pipeline, UnitReport, WorkUnit};
use indicatif::ProgressBar;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::error;

/// Where the walker sends processable files.
pub trait Dispatch {
    /// Schedules a unit. Returns immediately.
    fn dispatch(&mut self, unit: WorkUnit);
}

/// Reports gathered once every dispatched unit has finished.
#[derive(Debug, Default)]
pub struct Collected {
    pub reports: Vec<UnitReport>,
    /// Units that ended on a fatal condition.
    pub fatal: usize,
}

/// Runs units on a fixed-size rayon pool.
pub struct PoolDispatcher {
    pool: ThreadPool,
    pipeline: Arc<Pipeline>,
    sender: Sender<UnitReport>,
    receiver: Receiver<UnitReport>,
    fatal: Arc<AtomicUsize>,
    progress: Option<ProgressBar>,
    dispatched: usize,
}

impl PoolDispatcher {
    /// Builds a dispatcher with `workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// Returns an error if the worker threads cannot be spawned.
    pub fn new(pipeline: Arc<Pipeline>, workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("mediasort-worker-{index}"))
            .panic_handler(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%message, "worker panicked");
            })
            .build()?;

        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            pool,
            pipeline,
            sender,
            receiver,
            fatal: Arc::new(AtomicUsize::new(0)),
            progress: None,
            dispatched: 0,
        })
    }

    /// Ticks `progress` once per finished unit.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Fatal units so far.
    pub fn fatal_count(&self) -> usize {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Waits for every dispatched unit and returns their reports.
    pub fn finish(self) -> Collected {
        let Self {
            sender,
            receiver,
            fatal,
            progress,
            ..
        } = self;
        drop(sender);

        // The channel closes once the last job has dropped its sender clone.
        let reports: Vec<UnitReport> = receiver.iter().collect();

        if let Some(progress) = progress {
            progress.finish_and_clear();
        }

        Collected {
            reports,
            fatal: fatal.load(Ordering::SeqCst),
        }
    }
}

impl Dispatch for PoolDispatcher {
    fn dispatch(&mut self, unit: WorkUnit) {
        self.dispatched += 1;
        let pipeline = Arc::clone(&self.pipeline);
        let sender = self.sender.clone();
        let fatal = Arc::clone(&self.fatal);
        let progress = self.progress.clone();

        self.pool.spawn(move || {
            let report = pipeline.process(&unit);
            if report.is_fatal() {
                fatal.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(progress) = progress {
                progress.inc(1);
            }
            // The receiver only goes away after every sender has.
            let _ = sender.send(report);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DateField;
    use crate::probe::{MetadataExtractor, MetadataProbe};
    use crate::reconciler::Reconciler;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Dates each file from its own first line.
    fn content_pipeline(archive: &Path) -> Arc<Pipeline> {
        let extractor: Arc<dyn MetadataExtractor> =
            Arc::new(|path: &Path| -> io::Result<MetadataProbe> {
                let text = fs::read_to_string(path)?;
                Ok(MetadataProbe::from_lines(text.lines()))
            });
        Arc::new(Pipeline::new(
            archive.to_path_buf(),
            extractor,
            Reconciler::default(),
            false,
        ))
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("incoming");
        let archive = temp_dir.path().join("archive");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&archive).unwrap();
        (temp_dir, source, archive)
    }

    #[test]
    fn test_all_units_report_back() {
        let (_temp, source, archive) = setup();

        let mut dispatcher = PoolDispatcher::new(content_pipeline(&archive), 4).unwrap();
        for i in 0..20 {
            let path = source.join(format!("IMG_{i:04}.JPG"));
            fs::write(&path, format!("Create Date : 2021:01:02 10:00:00\nphoto {i}")).unwrap();
            dispatcher.dispatch(WorkUnit::new(path, DateField::CreateDate));
        }
        assert_eq!(dispatcher.dispatched(), 20);

        let collected = dispatcher.finish();
        assert_eq!(collected.reports.len(), 20);
        assert_eq!(collected.fatal, 0);
        assert!(collected.reports.iter().all(|r| r.outcome() == "moved"));

        let month = archive.join("2021").join("01");
        assert_eq!(fs::read_dir(month).unwrap().count(), 20);
    }

    #[test]
    fn test_fatal_unit_does_not_stop_others() {
        let (_temp, source, archive) = setup();
        // A file where the 2021 year directory should go.
        fs::write(archive.join("2021"), b"in the way").unwrap();

        let mut dispatcher = PoolDispatcher::new(content_pipeline(&archive), 1).unwrap();
        let blocked = source.join("IMG_0001.JPG");
        fs::write(&blocked, "Create Date : 2021:01:02 10:00:00\n").unwrap();
        let healthy = source.join("IMG_0002.JPG");
        fs::write(&healthy, "Create Date : 2020:06:30 12:00:00\n").unwrap();

        dispatcher.dispatch(WorkUnit::new(blocked.clone(), DateField::CreateDate));
        dispatcher.dispatch(WorkUnit::new(healthy.clone(), DateField::CreateDate));

        let collected = dispatcher.finish();
        assert_eq!(collected.reports.len(), 2);
        assert_eq!(collected.fatal, 1);
        assert!(blocked.exists());
        assert!(!healthy.exists());
        assert!(archive.join("2020").join("06").join("IMG_0002.JPG").is_file());
    }
}
