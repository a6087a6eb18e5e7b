//! Conditions that stop a unit of work outright.
//!
//! Anything in [`ArchiveError`] leaves the archive in a state the pipeline
//! cannot reason about any more (a directory that cannot be created, a
//! confirmed duplicate that cannot be removed, two different files fighting
//! over one name). Units that hit one of these stop immediately and the run
//! stops dispatching new work.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal archive conditions.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A year or month directory did not exist and could not be created.
    #[error("directory {} did not exist and creation failed: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A source file that had to go (duplicate or smaller copy) could not be removed.
    #[error("unable to delete {}: {source}", path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Two files with the same name and size but different content.
    #[error(
        "{} and {} are the same size but differ in content",
        file.display(),
        destination.display()
    )]
    Conflict { file: PathBuf, destination: PathBuf },

    /// Every disambiguated name for a conflicting file was already taken.
    #[error("no free name left next to {}", destination.display())]
    NamesExhausted { destination: PathBuf },
}
