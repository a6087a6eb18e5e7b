//! Run orchestration for the `mediasort` binary.
//!
//! This module handles:
//! - Merging command-line options over the configuration file
//! - Validating the source and archive roots
//! - Wiring the walker, dispatcher and pipeline together
//! - Writing the decision journal and printing the summary

use crate::classifier::{Classifier, MediaMapper};
use crate::config::{ArchiveConfig, ConfigError, ConflictPolicy};
use crate::dispatcher::PoolDispatcher;
use crate::duplicates::{DuplicateGroup, find_duplicates};
use crate::journal::DecisionJournal;
use crate::output::OutputFormatter;
use crate::pipeline::{Pipeline, UnitReport};
use crate::probe::{ExifTool, MetadataExtractor};
use crate::reconciler::Reconciler;
use crate::walker::{WalkStats, Walker};
use anyhow::{Context, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Options for one run, as given on the command line.
///
/// `None` fields fall back to the configuration file, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub source: PathBuf,
    pub archive_root: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub dry_run: bool,
    pub workers: Option<usize>,
    pub exiftool: Option<PathBuf>,
    pub abort_on_conflict: bool,
    pub follow_symlinks: bool,
    pub show_progress: bool,
}

/// Everything that happened during a run.
#[derive(Debug)]
pub struct RunSummary {
    pub source_root: PathBuf,
    pub archive_root: PathBuf,
    pub walk: WalkStats,
    pub reports: Vec<UnitReport>,
    pub journal_path: Option<PathBuf>,
    pub dry_run: bool,
}

/// Summary rows, in display order.
const OUTCOMES: &[&str] = &[
    "moved",
    "replaced",
    "renamed",
    "duplicate removed",
    "smaller removed",
    "already in place",
    "unresolved",
    "failed",
    "fatal",
];

impl RunSummary {
    /// Number of units with the given outcome label.
    pub fn count(&self, outcome: &str) -> usize {
        self.reports.iter().filter(|r| r.outcome() == outcome).count()
    }

    pub fn fatal_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_fatal()).count()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_count() > 0
    }

    fn rows(&self) -> Vec<(&'static str, usize)> {
        let mut rows: Vec<_> = OUTCOMES.iter().map(|o| (*o, self.count(o))).collect();
        rows.push(("skipped", self.walk.skipped_total()));
        rows
    }
}

/// Runs the archiver with `exiftool` as the metadata source.
///
/// # Examples
///
/// ```no_run
/// use mediasort::cli::{run, RunOptions};
/// use std::path::PathBuf;
///
/// let options = RunOptions {
///     source: PathBuf::from("/media/camera"),
///     archive_root: Some(PathBuf::from("/srv/photos")),
///     dry_run: true,
///     ..Default::default()
/// };
/// match run(&options) {
///     Ok(summary) => println!("{} moved", summary.count("moved")),
///     Err(e) => eprintln!("Error: {:#}", e),
/// }
/// ```
pub fn run(options: &RunOptions) -> anyhow::Result<RunSummary> {
    let config = ArchiveConfig::load(options.config_path.as_deref())
        .context("Error loading configuration")?;
    let program = options
        .exiftool
        .clone()
        .unwrap_or_else(|| config.archive.exiftool.clone());

    run_with_extractor(options, &config, Arc::new(ExifTool::new(program)))
}

/// Runs the archiver with an explicit configuration and metadata source.
///
/// # Errors
///
/// Fails before any file is touched if the source is not a directory, no
/// archive root is configured, the archive root cannot be created, the
/// exclusion rules do not compile or the worker pool cannot start. Problems
/// with individual files never make this return an error; they are in the
/// summary's reports.
pub fn run_with_extractor(
    options: &RunOptions,
    config: &ArchiveConfig,
    extractor: Arc<dyn MetadataExtractor>,
) -> anyhow::Result<RunSummary> {
    let source_root = fs::canonicalize(&options.source)
        .with_context(|| format!("Error reading source {}", options.source.display()))?;
    if !source_root.is_dir() {
        bail!("Source {} is not a directory", source_root.display());
    }

    let archive_root = options
        .archive_root
        .clone()
        .or_else(|| config.archive.root.clone())
        .ok_or(ConfigError::MissingArchiveRoot)?;
    let archive_root = prepare_archive_root(&archive_root, options.dry_run)?;

    let filters = config
        .compile_filters()
        .context("Error compiling exclusion rules")?;
    let classifier = Classifier::new(MediaMapper::default(), Some(filters));

    let policy = if options.abort_on_conflict {
        ConflictPolicy::Abort
    } else {
        config.archive.conflict_policy
    };
    let workers = options.workers.unwrap_or(config.archive.workers);
    let follow_symlinks = options.follow_symlinks || config.archive.follow_symlinks;

    OutputFormatter::info(&format!(
        "Archiving {} into {}",
        source_root.display(),
        archive_root.display()
    ));
    if options.dry_run {
        OutputFormatter::dry_run_notice("No files will be moved, deleted or created");
    }
    info!(
        source = %source_root.display(),
        archive = %archive_root.display(),
        workers,
        policy = ?policy,
        dry_run = options.dry_run,
        "starting run"
    );

    let pipeline = Arc::new(Pipeline::new(
        archive_root.clone(),
        extractor,
        Reconciler::new(policy),
        options.dry_run,
    ));
    let mut dispatcher =
        PoolDispatcher::new(pipeline, workers).context("Error starting worker pool")?;
    if options.show_progress {
        dispatcher = dispatcher.with_progress(OutputFormatter::create_spinner());
    }

    let mut walker = Walker::new(classifier).follow_symlinks(follow_symlinks);
    if archive_root.starts_with(&source_root) {
        walker = walker.skip_dir(archive_root.clone());
    }

    let walk = walker.walk(&source_root, &mut dispatcher);
    let collected = dispatcher.finish();

    let mut summary = RunSummary {
        source_root,
        archive_root,
        walk,
        reports: collected.reports,
        journal_path: None,
        dry_run: options.dry_run,
    };

    if !options.dry_run {
        summary.journal_path = save_journal(&summary);
    }

    print_summary(&summary);
    Ok(summary)
}

/// Lists media files under the source that share identical content.
///
/// Read-only: no archive root is needed and nothing is moved or deleted.
/// Exclusion rules and `follow_symlinks` from the configuration still apply.
///
/// # Errors
///
/// Fails if the configuration cannot be loaded, the source is not a
/// directory or the exclusion rules do not compile.
pub fn report_duplicates(options: &RunOptions) -> anyhow::Result<Vec<DuplicateGroup>> {
    let config = ArchiveConfig::load(options.config_path.as_deref())
        .context("Error loading configuration")?;
    let source_root = fs::canonicalize(&options.source)
        .with_context(|| format!("Error reading source {}", options.source.display()))?;
    if !source_root.is_dir() {
        bail!("Source {} is not a directory", source_root.display());
    }

    let filters = config
        .compile_filters()
        .context("Error compiling exclusion rules")?;
    let classifier = Classifier::new(MediaMapper::default(), Some(filters));
    let follow_symlinks = options.follow_symlinks || config.archive.follow_symlinks;

    OutputFormatter::info(&format!(
        "Looking for duplicates in {}",
        source_root.display()
    ));
    let groups = find_duplicates(&source_root, &classifier, follow_symlinks);
    info!(source = %source_root.display(), groups = groups.len(), "duplicate scan finished");

    for group in &groups {
        OutputFormatter::duplicate_group(&group.hash, &group.paths);
    }
    if groups.is_empty() {
        OutputFormatter::success("No duplicates found");
    }
    Ok(groups)
}

fn prepare_archive_root(root: &Path, dry_run: bool) -> anyhow::Result<PathBuf> {
    if dry_run {
        if root.exists() {
            return fs::canonicalize(root)
                .with_context(|| format!("Error reading archive {}", root.display()));
        }
        return std::path::absolute(root)
            .with_context(|| format!("Error resolving archive {}", root.display()));
    }

    fs::create_dir_all(root)
        .with_context(|| format!("Error creating archive {}", root.display()))?;
    fs::canonicalize(root).with_context(|| format!("Error reading archive {}", root.display()))
}

fn save_journal(summary: &RunSummary) -> Option<PathBuf> {
    let mut journal =
        DecisionJournal::new(summary.source_root.clone(), summary.archive_root.clone());
    for report in &summary.reports {
        journal.record(report);
    }

    match journal.save() {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "could not save decision journal");
            OutputFormatter::warning(&format!("Could not save history: {}", e));
            None
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let walk = &summary.walk;
    if walk.errors > 0 {
        OutputFormatter::warning(&format!(
            "{} entries could not be read and were skipped",
            walk.errors
        ));
    }

    OutputFormatter::summary_table(&summary.rows());

    if summary.is_fatal() {
        OutputFormatter::error(&format!(
            "{} file(s) hit a fatal error and were left in place; see the log for details",
            summary.fatal_count()
        ));
    } else if summary.dry_run {
        OutputFormatter::dry_run_notice("Run without --dry-run to apply these changes");
    } else {
        OutputFormatter::success("Archive complete");
    }

    if let Some(path) = &summary.journal_path {
        OutputFormatter::info(&format!("Decisions saved to {}", path.display()));
    }
}
