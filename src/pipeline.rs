//! The per-file unit of work.
//!
//! Each unit runs independently: extract metadata, resolve the capture date,
//! derive the archive slot, make sure the slot's directories exist and
//! reconcile the file into it. Nothing here looks at any other unit except
//! through the shared [`DirectoryCache`] and the filesystem itself.

use crate::archive_path;
use crate::classifier::DateField;
use crate::date_resolver::{self, CaptureDate};
use crate::dir_cache::DirectoryCache;
use crate::error::ArchiveError;
use crate::probe::MetadataExtractor;
use crate::reconciler::{Placement, ReconcileError, Reconciler};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, info_span, warn};

/// A file handed from the walker to the dispatcher.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub path: PathBuf,
    /// Directory containing the file.
    pub directory: PathBuf,
    pub field: DateField,
    /// Name the file keeps in the archive.
    pub file_name: OsString,
}

impl WorkUnit {
    pub fn new(path: PathBuf, field: DateField) -> Self {
        let directory = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        Self {
            path,
            directory,
            field,
            file_name,
        }
    }
}

/// Why a unit did not complete.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("metadata extraction failed: {0}")]
    Probe(#[source] io::Error),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl UnitError {
    pub fn is_fatal(&self) -> bool {
        match self {
            UnitError::Probe(_) => false,
            UnitError::Reconcile(e) => e.is_fatal(),
            UnitError::Archive(_) => true,
        }
    }
}

/// How a unit ended.
#[derive(Debug)]
pub enum UnitStatus {
    /// The file was reconciled into the archive.
    Placed(Placement),
    /// Dry run: what would have happened.
    Planned(Placement),
    /// No usable date; the file was left where it was.
    Unresolved,
    Failed(UnitError),
}

/// Outcome of one unit, collected for the summary and the journal.
#[derive(Debug)]
pub struct UnitReport {
    pub source: PathBuf,
    /// Slot the file was (or would be) reconciled into, once derived.
    pub destination: Option<PathBuf>,
    pub capture_date: Option<CaptureDate>,
    pub status: UnitStatus,
}

impl UnitReport {
    pub fn is_fatal(&self) -> bool {
        matches!(&self.status, UnitStatus::Failed(e) if e.is_fatal())
    }

    /// Short outcome label for summaries and the journal.
    pub fn outcome(&self) -> &'static str {
        match &self.status {
            UnitStatus::Placed(p) | UnitStatus::Planned(p) => p.action.label(),
            UnitStatus::Unresolved => "unresolved",
            UnitStatus::Failed(e) if e.is_fatal() => "fatal",
            UnitStatus::Failed(_) => "failed",
        }
    }
}

/// Everything a unit needs, shared by all workers.
pub struct Pipeline {
    archive_root: PathBuf,
    extractor: Arc<dyn MetadataExtractor>,
    directories: DirectoryCache,
    reconciler: Reconciler,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(
        archive_root: PathBuf,
        extractor: Arc<dyn MetadataExtractor>,
        reconciler: Reconciler,
        dry_run: bool,
    ) -> Self {
        Self {
            archive_root,
            extractor,
            directories: DirectoryCache::new(),
            reconciler,
            dry_run,
        }
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn directories(&self) -> &DirectoryCache {
        &self.directories
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs one unit to completion. Never panics on I/O failure; every
    /// outcome is reported.
    pub fn process(&self, unit: &WorkUnit) -> UnitReport {
        let span = info_span!("unit", path = %unit.path.display());
        let _enter = span.enter();

        let mut report = UnitReport {
            source: unit.path.clone(),
            destination: None,
            capture_date: None,
            status: UnitStatus::Unresolved,
        };

        let probe = match self.extractor.probe(&unit.path) {
            Ok(probe) => probe,
            Err(e) => {
                warn!(error = %e, "unable to read metadata");
                report.status = UnitStatus::Failed(UnitError::Probe(e));
                return report;
            }
        };

        let Some(date) = date_resolver::resolve(&probe.lines, unit.field.field_name()) else {
            warn!(field = %unit.field, "no capture date, leaving file in place");
            return report;
        };
        report.capture_date = Some(date);

        let slot = archive_path::derive(&self.archive_root, &date);
        let destination = slot.destination(&unit.file_name);
        report.destination = Some(destination.clone());

        if self.dry_run {
            report.status = match self.reconciler.decide(&unit.path, &destination) {
                Ok(plan) => {
                    info!(
                        destination = %plan.destination.display(),
                        action = plan.action.label(),
                        "would reconcile"
                    );
                    UnitStatus::Planned(plan)
                }
                Err(e) => self.failed(e.into()),
            };
            return report;
        }

        let ensured = self
            .directories
            .ensure(&slot.year_dir)
            .and_then(|()| self.directories.ensure(&slot.month_dir));
        if let Err(e) = ensured {
            report.status = self.failed(e.into());
            return report;
        }

        report.status = match self
            .reconciler
            .reconcile(&unit.path, &slot.month_dir, &unit.file_name)
        {
            Ok(placement) => UnitStatus::Placed(placement),
            Err(e) => self.failed(e.into()),
        };
        report
    }

    fn failed(&self, e: UnitError) -> UnitStatus {
        if e.is_fatal() {
            error!(error = %e, "fatal");
        } else {
            warn!(error = %e, "unit failed");
        }
        UnitStatus::Failed(e)
    }
}
