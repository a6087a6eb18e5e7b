//! Destination layout: `<root>/<YYYY>/<MM>/<file name>`.

use crate::date_resolver::CaptureDate;
use std::path::{Path, PathBuf};

/// The year and month directories a capture date maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveSlot {
    pub year_dir: PathBuf,
    pub month_dir: PathBuf,
}

impl ArchiveSlot {
    /// Full destination path for a file name inside this slot.
    pub fn destination(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.month_dir.join(file_name)
    }
}

/// Maps a capture date to its archive directories.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use mediasort::archive_path::derive;
/// use mediasort::date_resolver::{CaptureDate, DateSource};
/// use std::path::Path;
///
/// let date = CaptureDate {
///     timestamp: NaiveDate::from_ymd_opt(2021, 5, 4).unwrap().and_hms_opt(10, 0, 0).unwrap(),
///     source: DateSource::Field,
/// };
/// let slot = derive(Path::new("/archive"), &date);
/// assert_eq!(slot.year_dir, Path::new("/archive/2021"));
/// assert_eq!(slot.month_dir, Path::new("/archive/2021/05"));
/// ```
pub fn derive(root: &Path, date: &CaptureDate) -> ArchiveSlot {
    let year_dir = root.join(format!("{:04}", date.year()));
    let month_dir = year_dir.join(format!("{:02}", date.month()));
    ArchiveSlot {
        year_dir,
        month_dir,
    }
}
