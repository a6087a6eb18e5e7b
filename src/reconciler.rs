/// Content-based reconciliation of a file into its archive slot.
///
/// A destination that is already occupied is never overwritten blindly: both
/// files are hashed in full and the outcome depends on content and size.
/// Identical content means the incoming file is a duplicate; different content
/// keeps the larger file; equal size with different content is settled by the
/// configured [`ConflictPolicy`].
use crate::config::ConflictPolicy;
use crate::error::ArchiveError;
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Most disambiguated names tried for one conflicting file.
const MAX_RENAME_ATTEMPTS: usize = 100;

/// How many times placement is re-planned when another worker fills the slot first.
const MAX_PLACEMENT_RETRIES: usize = 3;

/// What happened (or would happen) to a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The slot was empty and the source now lives there.
    Moved,
    /// The source was larger and replaced a different file in the slot.
    Replaced,
    /// The slot held identical content; the source was deleted.
    DuplicateRemoved,
    /// The slot held a larger, different file; the source was deleted.
    SmallerRemoved,
    /// Equal size, different content; the source was placed under a new name.
    Renamed,
    /// The source already is the file in the slot.
    AlreadyInPlace,
}

impl Action {
    /// Short label for logs, journals and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Moved => "moved",
            Action::Replaced => "replaced",
            Action::DuplicateRemoved => "duplicate removed",
            Action::SmallerRemoved => "smaller removed",
            Action::Renamed => "renamed",
            Action::AlreadyInPlace => "already in place",
        }
    }
}

/// An action together with the path it concerns.
///
/// For `Moved`, `Replaced` and `Renamed` the destination is where the source
/// ended up; for the removals it is the file that was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub action: Action,
    pub destination: PathBuf,
    /// Content hash of the source, when the slot had to be compared.
    pub source_hash: Option<blake3::Hash>,
}

impl Placement {
    fn new(action: Action, destination: PathBuf) -> Self {
        Self {
            action,
            destination,
            source_hash: None,
        }
    }

    fn hashed(action: Action, destination: PathBuf, hash: blake3::Hash) -> Self {
        Self {
            action,
            destination,
            source_hash: Some(hash),
        }
    }
}

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The move itself failed; the source is left where it was.
    #[error("unable to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file could not be read to compare it.
    #[error("unable to read {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive can no longer be trusted; see [`ArchiveError`].
    #[error(transparent)]
    Fatal(#[from] ArchiveError),
}

impl ReconcileError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconcileError::Fatal(_))
    }
}

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Hashes a file's full content.
pub fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file)?;
    Ok(hasher.finalize())
}

/// Places source files into archive slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: ConflictPolicy,
}

impl Reconciler {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Works out what reconciling `source` into `destination` would do,
    /// without touching either file.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Inspect`] if either file cannot be read, and
    /// [`ReconcileError::Fatal`] for an equal-size conflict under
    /// [`ConflictPolicy::Abort`] or when no free name is left.
    pub fn decide(&self, source: &Path, destination: &Path) -> ReconcileResult<Placement> {
        if !occupied(destination) {
            return Ok(Placement::new(Action::Moved, destination.to_path_buf()));
        }

        if same_file(source, destination) {
            return Ok(Placement::new(
                Action::AlreadyInPlace,
                destination.to_path_buf(),
            ));
        }

        let source_size = size_of(source)?;
        let destination_size = size_of(destination)?;
        let source_hash = hash_of(source)?;
        let destination_hash = hash_of(destination)?;

        if source_hash == destination_hash {
            return Ok(Placement::hashed(
                Action::DuplicateRemoved,
                destination.to_path_buf(),
                source_hash,
            ));
        }

        match source_size.cmp(&destination_size) {
            Ordering::Greater => Ok(Placement::hashed(
                Action::Replaced,
                destination.to_path_buf(),
                source_hash,
            )),
            Ordering::Less => Ok(Placement::hashed(
                Action::SmallerRemoved,
                destination.to_path_buf(),
                source_hash,
            )),
            Ordering::Equal => match self.policy {
                ConflictPolicy::Abort => Err(ArchiveError::Conflict {
                    file: source.to_path_buf(),
                    destination: destination.to_path_buf(),
                }
                .into()),
                ConflictPolicy::Rename => self.free_name(destination, source_hash),
            },
        }
    }

    /// Finds a name next to `destination` for a conflicting file, reusing a
    /// name that already holds identical content.
    fn free_name(&self, destination: &Path, hash: blake3::Hash) -> ReconcileResult<Placement> {
        for attempt in 0..MAX_RENAME_ATTEMPTS {
            let candidate = disambiguated_path(destination, &hash, attempt);
            if !occupied(&candidate) {
                return Ok(Placement::hashed(Action::Renamed, candidate, hash));
            }
            if hash_of(&candidate)? == hash {
                return Ok(Placement::hashed(Action::DuplicateRemoved, candidate, hash));
            }
        }

        Err(ArchiveError::NamesExhausted {
            destination: destination.to_path_buf(),
        }
        .into())
    }

    /// Reconciles `source` into `dest_dir/dest_name`.
    ///
    /// The slot is re-examined if another worker fills it between the check
    /// and the move, so a concurrent arrival is compared by content rather
    /// than overwritten.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::MoveFailed`] and [`ReconcileError::Inspect`] leave the
    /// source untouched. [`ReconcileError::Fatal`] is returned when a file that
    /// had to be deleted could not be, or for an unresolvable conflict.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mediasort::reconciler::Reconciler;
    /// use std::ffi::OsStr;
    /// use std::path::Path;
    ///
    /// let placement = Reconciler::default().reconcile(
    ///     Path::new("/incoming/IMG_0001.JPG"),
    ///     Path::new("/archive/2021/01"),
    ///     OsStr::new("IMG_0001.JPG"),
    /// );
    /// match placement {
    ///     Ok(p) => println!("{}: {}", p.action.label(), p.destination.display()),
    ///     Err(e) => eprintln!("{}", e),
    /// }
    /// ```
    pub fn reconcile(
        &self,
        source: &Path,
        dest_dir: &Path,
        dest_name: &OsStr,
    ) -> ReconcileResult<Placement> {
        let destination = dest_dir.join(dest_name);

        for _ in 0..MAX_PLACEMENT_RETRIES {
            let plan = self.decide(source, &destination)?;
            match execute(source, &plan)? {
                Step::Done => {
                    log_placement(source, &plan);
                    return Ok(plan);
                }
                Step::Raced => {
                    debug!(
                        destination = %plan.destination.display(),
                        "slot filled concurrently, re-checking"
                    );
                }
            }
        }

        warn!(source = %source.display(), destination = %destination.display(), "unable to move");
        Err(ReconcileError::MoveFailed {
            from: source.to_path_buf(),
            to: destination,
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "destination kept changing while placing the file",
            ),
        })
    }
}

enum Step {
    Done,
    Raced,
}

fn execute(source: &Path, plan: &Placement) -> ReconcileResult<Step> {
    let destination = &plan.destination;
    match plan.action {
        Action::Moved | Action::Renamed => match place_new(source, destination) {
            Ok(()) => Ok(Step::Done),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Step::Raced),
            Err(e) => {
                warn!(source = %source.display(), destination = %destination.display(), error = %e, "unable to move");
                Err(ReconcileError::MoveFailed {
                    from: source.to_path_buf(),
                    to: destination.clone(),
                    source: e,
                })
            }
        },
        Action::Replaced => match replace(source, destination) {
            Ok(()) => Ok(Step::Done),
            Err(e) => {
                warn!(source = %source.display(), destination = %destination.display(), error = %e, "unable to move");
                Err(ReconcileError::MoveFailed {
                    from: source.to_path_buf(),
                    to: destination.clone(),
                    source: e,
                })
            }
        },
        Action::DuplicateRemoved | Action::SmallerRemoved => match fs::remove_file(source) {
            Ok(()) => Ok(Step::Done),
            Err(e) => {
                error!(
                    source = %source.display(),
                    destination = %destination.display(),
                    reason = plan.action.label(),
                    error = %e,
                    "unable to delete source"
                );
                Err(ArchiveError::RemoveFailed {
                    path: source.to_path_buf(),
                    source: e,
                }
                .into())
            }
        },
        Action::AlreadyInPlace => Ok(Step::Done),
    }
}

fn log_placement(source: &Path, plan: &Placement) {
    let source = source.display();
    let destination = plan.destination.display();
    match plan.action {
        Action::Moved => info!(%source, %destination, "successfully moved"),
        Action::Replaced => info!(
            %source,
            %destination,
            "file exists but source is larger, replaced with source"
        ),
        Action::DuplicateRemoved => info!(
            %source,
            %destination,
            "destination exists with same content, deleted source"
        ),
        Action::SmallerRemoved => info!(
            %source,
            %destination,
            "file exists and destination is larger, deleted source"
        ),
        Action::Renamed => info!(
            %source,
            %destination,
            "same size but different content, kept both under a new name"
        ),
        Action::AlreadyInPlace => debug!(%source, "already in place"),
    }
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn size_of(path: &Path) -> ReconcileResult<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| ReconcileError::Inspect {
            path: path.to_path_buf(),
            source,
        })
}

fn hash_of(path: &Path) -> ReconcileResult<blake3::Hash> {
    hash_file(path).map_err(|source| ReconcileError::Inspect {
        path: path.to_path_buf(),
        source,
    })
}

/// `IMG_0001.JPG` becomes `IMG_0001_1a2b3c4d.JPG`, then `IMG_0001_1a2b3c4d_1.JPG`, ...
fn disambiguated_path(destination: &Path, hash: &blake3::Hash, attempt: usize) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let hex = hash.to_hex();
    let short = &hex.as_str()[..8];

    let mut name = if attempt == 0 {
        format!("{stem}_{short}")
    } else {
        format!("{stem}_{short}_{attempt}")
    };
    if let Some(ext) = destination.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    destination.with_file_name(name)
}

/// Moves `from` to `to` without ever overwriting an existing `to`.
///
/// A hard link claims the name atomically; the source is unlinked only once
/// the link exists. Filesystems without hard links fall back to rename, and
/// cross-device moves to an exclusive copy followed by deletion.
fn place_new(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(from) {
                // Leave the source as the only copy.
                discard_copy(from, to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => copy_new(from, to),
        Err(e) => {
            debug!(error = %e, "hard link unavailable, falling back to rename");
            if occupied(to) {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            match fs::rename(from, to) {
                Err(e) if e.kind() == io::ErrorKind::CrossesDevices => copy_new(from, to),
                other => other,
            }
        }
    }
}

fn copy_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut reader = File::open(from)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(to)?;
    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if let Err(e) = copied {
        discard_copy(from, to);
        return Err(e);
    }
    fs::remove_file(from)
}

/// Removes the partial or extra copy at `to` after a failed placement.
fn discard_copy(from: &Path, to: &Path) {
    if let Err(e) = fs::remove_file(to) {
        error!(
            source = %from.display(),
            destination = %to.display(),
            error = %e,
            "unable to roll back placement, file now exists at both paths"
        );
    }
}

/// Replaces `to` with `from`.
fn replace(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        other => other,
    }
}
