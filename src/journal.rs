/// Per-run record of every decision the archiver made.
///
/// The journal is written next to the archive as pretty-printed JSON and is
/// replaced on every real (non dry-run) run. It lists each unit with where
/// the file went, which date put it there and, for replaced or removed files,
/// the content hash the decision was based on.
use crate::date_resolver::DateSource;
use crate::pipeline::{UnitReport, UnitStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Journal file name inside the archive root.
pub const HISTORY_FILE: &str = ".mediasort_history.json";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Failed to write history file: {source}")]
    HistoryWriteFailed {
        #[source]
        source: io::Error,
    },

    #[error("Failed to read history file: {source}")]
    HistoryReadFailed {
        #[source]
        source: io::Error,
    },

    #[error("Invalid history file format: {reason}")]
    InvalidHistoryFormat { reason: String },
}

/// One unit's line in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_date: Option<NaiveDateTime>,
    /// `"field"` or `"file modification"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_source: Option<String>,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&UnitReport> for JournalEntry {
    fn from(report: &UnitReport) -> Self {
        let (destination, hash, error) = match &report.status {
            UnitStatus::Placed(p) | UnitStatus::Planned(p) => (
                Some(p.destination.clone()),
                p.source_hash.map(|h| h.to_hex().to_string()),
                None,
            ),
            UnitStatus::Unresolved => (None, None, None),
            UnitStatus::Failed(e) => (report.destination.clone(), None, Some(e.to_string())),
        };

        Self {
            source: report.source.clone(),
            destination,
            capture_date: report.capture_date.map(|d| d.timestamp),
            date_source: report.capture_date.map(|d| {
                match d.source {
                    DateSource::Field => "field",
                    DateSource::FileModification => "file modification",
                }
                .to_string()
            }),
            outcome: report.outcome().to_string(),
            hash,
            error,
        }
    }
}

/// The journal for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionJournal {
    /// RFC 3339 time the run started.
    pub timestamp: String,
    pub source_root: PathBuf,
    pub archive_root: PathBuf,
    pub entries: Vec<JournalEntry>,
}

impl DecisionJournal {
    pub fn new(source_root: PathBuf, archive_root: PathBuf) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            source_root,
            archive_root,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, report: &UnitReport) {
        self.entries.push(JournalEntry::from(report));
    }

    /// Path of the journal for an archive root.
    pub fn history_file_path(archive_root: &Path) -> PathBuf {
        archive_root.join(HISTORY_FILE)
    }

    /// Writes the journal into the archive root, replacing any previous one.
    pub fn save(&self) -> Result<PathBuf, JournalError> {
        let history_path = Self::history_file_path(&self.archive_root);
        let json_string =
            serde_json::to_string_pretty(self).map_err(|e| JournalError::HistoryWriteFailed {
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("JSON serialization failed: {}", e),
                ),
            })?;

        fs::write(&history_path, json_string)
            .map_err(|e| JournalError::HistoryWriteFailed { source: e })?;

        Ok(history_path)
    }

    /// Loads the last journal written into `archive_root`, if any.
    pub fn load(archive_root: &Path) -> Result<Option<Self>, JournalError> {
        let history_path = Self::history_file_path(archive_root);

        if !history_path.exists() {
            return Ok(None);
        }

        let json_string = fs::read_to_string(&history_path)
            .map_err(|e| JournalError::HistoryReadFailed { source: e })?;

        serde_json::from_str(&json_string)
            .map(Some)
            .map_err(|e| JournalError::InvalidHistoryFormat {
                reason: format!("JSON parse error: {}", e),
            })
    }
}
