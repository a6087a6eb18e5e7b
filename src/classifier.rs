/// File classification for the archive pipeline.
///
/// Decides, from a file's name and size alone, whether it should be archived
/// and which line of the metadata tool's output holds its capture date.
///
/// # Examples
///
/// ```
/// use mediasort::classifier::{DateField, MediaMapper};
///
/// let mapper = MediaMapper::default();
/// assert_eq!(mapper.extension_to_field("png"), Some(DateField::DateCreated));
/// assert_eq!(mapper.extension_to_field("MOV"), Some(DateField::CreateDate));
/// assert_eq!(mapper.extension_to_field("txt"), None);
/// ```
use crate::config::CompiledFilters;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A file discovered by the directory walk.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the walk root, used for exclusion patterns.
    pub relative_path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Lowercased extension, if the name has one.
    pub extension: Option<String>,
    /// Filesystem modification time.
    pub modified: Option<DateTime<Local>>,
}

impl FileEntry {
    /// Builds an entry from a path and the metadata already read for it.
    pub fn new(path: PathBuf, relative_path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            extension: extension_of(&path),
            path,
            relative_path,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Local>::from),
        }
    }

    /// The final path component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// The metadata field that carries a file type's capture date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateField {
    /// "Date Created", written into PNG text chunks.
    DateCreated,
    /// "Date/Time Original", used by AVI containers.
    DateTimeOriginal,
    /// "Create Date", used by EXIF images and QuickTime/MP4 containers.
    CreateDate,
}

impl DateField {
    /// The field name exactly as the metadata tool prints it.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediasort::classifier::DateField;
    ///
    /// assert_eq!(DateField::DateCreated.field_name(), "Date Created");
    /// assert_eq!(DateField::DateTimeOriginal.field_name(), "Date/Time Original");
    /// assert_eq!(DateField::CreateDate.field_name(), "Create Date");
    /// ```
    pub fn field_name(&self) -> &'static str {
        match self {
            DateField::DateCreated => "Date Created",
            DateField::DateTimeOriginal => "Date/Time Original",
            DateField::CreateDate => "Create Date",
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// The file is empty.
    ZeroContent,
    /// The name starts with a dot.
    SystemFile,
    /// A configured exclusion rule matched.
    Excluded,
    /// A symbolic link to a file, seen while links are not followed.
    Symlink,
    /// The extension is not one the archive handles.
    UnknownFileType { size: u64 },
}

impl SkipReason {
    /// Short label used for counting skips by kind.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::ZeroContent => "zero content",
            SkipReason::SystemFile => "system file",
            SkipReason::Excluded => "excluded",
            SkipReason::Symlink => "symbolic link",
            SkipReason::UnknownFileType { .. } => "unknown file type",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownFileType { size } => write!(
                f,
                "unknown file type, file size is {:.1}MB",
                *size as f64 / BYTES_PER_MB
            ),
            other => f.write_str(other.label()),
        }
    }
}

/// The classifier's verdict for one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Skip(SkipReason),
    Processable(DateField),
}

/// Maps file extensions to the metadata field holding their capture date.
#[derive(Debug, Clone)]
pub struct MediaMapper {
    extension_map: HashMap<String, DateField>,
}

impl MediaMapper {
    /// Creates a new `MediaMapper` with the standard media extensions.
    pub fn new() -> Self {
        let mut mapper = Self {
            extension_map: HashMap::new(),
        };
        mapper.populate_standard_mappings();
        mapper
    }

    fn populate_standard_mappings(&mut self) {
        self.add_extension_mapping("png", DateField::DateCreated);

        self.add_extension_mapping("avi", DateField::DateTimeOriginal);

        self.add_extension_mapping("mov", DateField::CreateDate);
        self.add_extension_mapping("heic", DateField::CreateDate);
        self.add_extension_mapping("jpg", DateField::CreateDate);
        self.add_extension_mapping("jpeg", DateField::CreateDate);
        self.add_extension_mapping("jpe", DateField::CreateDate);
        self.add_extension_mapping("mp4", DateField::CreateDate);
        self.add_extension_mapping("3gp", DateField::CreateDate);
    }

    /// Adds (or overrides) an extension mapping. Matching is case-insensitive.
    pub fn add_extension_mapping(&mut self, ext: &str, field: DateField) {
        self.extension_map.insert(ext.to_lowercase(), field);
    }

    /// Looks up the date field for an extension, ignoring case.
    pub fn extension_to_field(&self, ext: &str) -> Option<DateField> {
        self.extension_map.get(&ext.to_lowercase()).copied()
    }
}

impl Default for MediaMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides whether and how each discovered file is processed.
#[derive(Default)]
pub struct Classifier {
    mapper: MediaMapper,
    filters: Option<CompiledFilters>,
}

impl Classifier {
    pub fn new(mapper: MediaMapper, filters: Option<CompiledFilters>) -> Self {
        Self { mapper, filters }
    }

    /// Classifies a file.
    ///
    /// Rules are applied in order, first match wins:
    /// 1. Empty file: skipped
    /// 2. Name starting with `.`: skipped as a system file
    /// 3. Configured exclusion: skipped
    /// 4. Known extension: processable with its date field
    /// 5. Anything else: skipped as unknown
    pub fn classify(&self, entry: &FileEntry) -> Classification {
        if entry.size == 0 {
            return Classification::Skip(SkipReason::ZeroContent);
        }

        if entry.file_name().starts_with('.') {
            return Classification::Skip(SkipReason::SystemFile);
        }

        if let Some(filters) = &self.filters
            && filters.is_excluded(&entry.relative_path)
        {
            return Classification::Skip(SkipReason::Excluded);
        }

        match entry
            .extension
            .as_deref()
            .and_then(|ext| self.mapper.extension_to_field(ext))
        {
            Some(field) => Classification::Processable(field),
            None => Classification::Skip(SkipReason::UnknownFileType { size: entry.size }),
        }
    }
}

/// Lowercased extension of a path, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}
