//! Archive configuration.
//!
//! Settings are read from a TOML file and can be overridden on the command
//! line. The file controls where the archive lives, how the metadata tool is
//! invoked, how many files are processed at once, how name collisions between
//! different files are settled, and which files are never touched.
//!
//! # Configuration File Format
//!
//! ```toml
//! [archive]
//! root = "/srv/photos"
//! exiftool = "exiftool"
//! workers = 15
//! follow_symlinks = false
//! conflict_policy = "rename"
//!
//! [exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["**/.thumbnails/**"]
//! regex = []
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".mediasortrc.toml";

/// Default ceiling on concurrently processed files.
pub const DEFAULT_WORKERS: usize = 15;

/// Errors that can occur during configuration loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
    /// Neither the command line nor the configuration named an archive root.
    #[error("No archive root configured; pass --archive or set archive.root")]
    MissingArchiveRoot,
}

/// How to settle two different files of equal size competing for one name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep both: the incoming file gets a content-derived suffix.
    #[default]
    Rename,
    /// Treat the collision as fatal and leave both files where they are.
    Abort,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub archive: ArchiveSettings,

    #[serde(default)]
    pub exclude: ExcludeRules,
}

/// Where and how files are archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// Root of the `year/month` hierarchy.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Metadata extraction program.
    #[serde(default = "default_exiftool")]
    pub exiftool: PathBuf,

    /// Maximum number of files processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Whether the walk follows symbolic links. Loops are detected and skipped.
    #[serde(default)]
    pub follow_symlinks: bool,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_exiftool() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            root: None,
            exiftool: default_exiftool(),
            workers: default_workers(),
            follow_symlinks: false,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Rules for leaving files out of the archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the path relative to the source root.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl ArchiveConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.mediasortrc.toml` in the current directory
    /// 3. Look for `~/.config/mediasort/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any discovered file is not valid TOML.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("mediasort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the exclusion rules for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.exclude)
    }
}

/// Exclusion rules with every pattern compiled up front.
#[derive(Debug)]
pub struct CompiledFilters {
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
}

impl CompiledFilters {
    fn new(rules: &ExcludeRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclude_regexes = rules
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            exclude_filenames: rules.filenames.iter().cloned().collect(),
            exclude_patterns,
            exclude_regexes,
        })
    }

    /// Whether no rule is configured at all.
    pub fn is_empty(&self) -> bool {
        self.exclude_filenames.is_empty()
            && self.exclude_patterns.is_empty()
            && self.exclude_regexes.is_empty()
    }

    /// Check whether a file (path relative to the source root) is excluded.
    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return true;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return true;
        }

        self.exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.archive.root, None);
        assert_eq!(config.archive.exiftool, PathBuf::from("exiftool"));
        assert_eq!(config.archive.workers, DEFAULT_WORKERS);
        assert!(!config.archive.follow_symlinks);
        assert_eq!(config.archive.conflict_policy, ConflictPolicy::Rename);
    }

    #[test]
    fn test_parse_full_file() {
        let config = ArchiveConfig::from_toml(
            r#"
            [archive]
            root = "/srv/photos"
            exiftool = "/usr/local/bin/exiftool"
            workers = 4
            follow_symlinks = true
            conflict_policy = "abort"

            [exclude]
            filenames = ["Thumbs.db"]
            patterns = ["**/.thumbnails/**"]
            regex = ['^~\$']
            "#,
        )
        .unwrap();

        assert_eq!(config.archive.root, Some(PathBuf::from("/srv/photos")));
        assert_eq!(config.archive.workers, 4);
        assert!(config.archive.follow_symlinks);
        assert_eq!(config.archive.conflict_policy, ConflictPolicy::Abort);
        assert_eq!(config.exclude.filenames, vec!["Thumbs.db".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ArchiveConfig::from_toml("[archive]\nroot = \"/a\"\n").unwrap();
        assert_eq!(config.archive.workers, DEFAULT_WORKERS);
        assert_eq!(config.archive.exiftool, PathBuf::from("exiftool"));
        assert!(config.exclude.patterns.is_empty());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = ArchiveConfig::from_toml("[archive]\nconflict_policy = \"overwrite\"\n");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = ArchiveConfig::load(Some(Path::new("/non/existent/mediasort.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_exclusions() {
        let config = ArchiveConfig {
            exclude: ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                patterns: vec!["**/cache/**".to_string()],
                regex: vec![r"^edited_.*\.jpg$".to_string()],
            },
            ..Default::default()
        };
        let filters = config.compile_filters().unwrap();

        assert!(filters.is_excluded(Path::new("2019/Thumbs.db")));
        assert!(filters.is_excluded(Path::new("phone/cache/IMG_1.jpg")));
        assert!(filters.is_excluded(Path::new("edited_beach.jpg")));
        assert!(!filters.is_excluded(Path::new("phone/IMG_1.jpg")));
        assert!(!filters.is_excluded(Path::new("my_cache/IMG_1.jpg")));
    }

    #[test]
    fn test_empty_filters() {
        let filters = ArchiveConfig::default().compile_filters().unwrap();
        assert!(filters.is_empty());
        assert!(!filters.is_excluded(Path::new("IMG_0001.JPG")));
    }

    #[test]
    fn test_invalid_patterns_are_errors() {
        let bad_glob = ArchiveConfig {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_glob.compile_filters(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));

        let bad_regex = ArchiveConfig {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_regex.compile_filters(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));
    }
}
