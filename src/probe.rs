//! Metadata extraction through an external tool.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Raw output of one metadata extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataProbe {
    /// Stdout lines followed by stderr lines.
    pub lines: Vec<String>,
    /// Exit status, if the process exited normally.
    pub status: Option<i32>,
}

impl MetadataProbe {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            status: Some(0),
        }
    }
}

/// Produces the metadata lines for a file.
pub trait MetadataExtractor: Send + Sync {
    fn probe(&self, path: &Path) -> io::Result<MetadataProbe>;
}

impl<F> MetadataExtractor for F
where
    F: Fn(&Path) -> io::Result<MetadataProbe> + Send + Sync,
{
    fn probe(&self, path: &Path) -> io::Result<MetadataProbe> {
        self(path)
    }
}

/// Runs `exiftool <file>` and captures everything it prints.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl MetadataExtractor for ExifTool {
    fn probe(&self, path: &Path) -> io::Result<MetadataProbe> {
        let output = Command::new(&self.program).arg(path).output()?;

        // The exit status is informational only; exiftool reports partial
        // failures but still prints whatever it could read.
        let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        lines.extend(
            String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string),
        );

        debug!(
            path = %path.display(),
            lines = lines.len(),
            status = ?output.status.code(),
            "metadata extracted"
        );

        Ok(MetadataProbe {
            lines,
            status: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_extractor() {
        let fake = |_: &Path| -> io::Result<MetadataProbe> {
            Ok(MetadataProbe::from_lines([
                "Create Date : 2021:01:02 10:00:00",
            ]))
        };
        let probe = fake.probe(Path::new("IMG_0001.JPG")).unwrap();
        assert_eq!(probe.lines, vec!["Create Date : 2021:01:02 10:00:00"]);
        assert_eq!(probe.status, Some(0));
    }

    #[test]
    fn test_default_program() {
        assert_eq!(ExifTool::default().program(), Path::new("exiftool"));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let tool = ExifTool::new("/non/existent/exiftool");
        assert!(tool.probe(Path::new("IMG_0001.JPG")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_lines() {
        let tool = ExifTool::new("echo");
        let probe = tool.probe(Path::new("IMG_0001.JPG")).unwrap();
        assert_eq!(probe.lines, vec!["IMG_0001.JPG"]);
        assert_eq!(probe.status, Some(0));
    }
}
