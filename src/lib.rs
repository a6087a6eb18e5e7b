//! mediasort - archive photos and videos by capture date
//!
//! This library walks a source tree, reads each media file's capture date
//! through an external metadata tool and moves the file into a
//! `<archive>/<YYYY>/<MM>/` hierarchy. Files already in the archive are
//! reconciled by content instead of overwritten.

pub mod archive_path;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod date_resolver;
pub mod dir_cache;
pub mod dispatcher;
pub mod duplicates;
pub mod error;
pub mod journal;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod reconciler;
pub mod walker;

pub use classifier::{Classification, Classifier, DateField, MediaMapper, SkipReason};
pub use config::{ArchiveConfig, CompiledFilters, ConfigError, ConflictPolicy};
pub use error::ArchiveError;
pub use probe::{ExifTool, MetadataExtractor, MetadataProbe};
pub use reconciler::{Action, Reconciler};

pub use cli::{RunOptions, RunSummary, report_duplicates, run, run_with_extractor};
pub use duplicates::{DuplicateGroup, find_duplicates};
