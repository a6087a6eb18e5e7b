//! Capture date resolution from metadata tool output.
//!
//! The metadata tool prints one `Field Name : value` pair per line. The
//! resolver looks for the field that holds the capture date for the file's
//! type and falls back to the file modification date the tool also reports.
//! Everything else in the output is ignored.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Field consulted when the type-specific field is missing or unusable.
pub const FILE_MODIFICATION_FIELD: &str = "File Modification Date";

/// Where a capture date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateSource {
    /// The type-specific metadata field.
    Field,
    /// The file modification date reported by the metadata tool.
    FileModification,
}

/// A resolved capture date.
///
/// The timestamp is wall-clock time as the device recorded it; any offset in
/// the metadata is dropped so that a photo taken just after midnight local
/// time lands in the day (and month) it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureDate {
    pub timestamp: NaiveDateTime,
    pub source: DateSource,
}

impl CaptureDate {
    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }

    pub fn month(&self) -> u32 {
        self.timestamp.month()
    }
}

/// Resolves the capture date from metadata lines.
///
/// The first line containing `field_name` is used; the text after the first
/// `:` following the field name is parsed. Only when no line matches, or the
/// matching line has no `:`, is the same procedure applied to the first
/// `File Modification Date` line. A value that is present but does not parse
/// (including the all-zero placeholder) leaves the date unresolved.
///
/// # Examples
///
/// ```
/// use mediasort::date_resolver::{resolve, DateSource};
///
/// let lines = ["File Name : IMG_0001.JPG", "Create Date : 2021:05:04 10:00:00"];
/// let date = resolve(&lines, "Create Date").unwrap();
/// assert_eq!(date.timestamp.to_string(), "2021-05-04 10:00:00");
/// assert_eq!(date.source, DateSource::Field);
/// ```
pub fn resolve<S: AsRef<str>>(lines: &[S], field_name: &str) -> Option<CaptureDate> {
    match scan_field(lines, field_name) {
        FieldValue::Parsed(timestamp) => {
            return Some(CaptureDate {
                timestamp,
                source: DateSource::Field,
            });
        }
        FieldValue::Unparseable => return None,
        FieldValue::Absent => {}
    }

    debug!(field = field_name, "falling back to file modification date");

    match scan_field(lines, FILE_MODIFICATION_FIELD) {
        FieldValue::Parsed(timestamp) => Some(CaptureDate {
            timestamp,
            source: DateSource::FileModification,
        }),
        FieldValue::Absent | FieldValue::Unparseable => None,
    }
}

/// What the scan for one field found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldValue {
    /// No line names the field, or the line has no `:` after the name.
    Absent,
    Parsed(NaiveDateTime),
    /// A value is there but is not a usable date.
    Unparseable,
}

fn scan_field<S: AsRef<str>>(lines: &[S], field_name: &str) -> FieldValue {
    let Some(line) = lines
        .iter()
        .map(|line| line.as_ref())
        .find(|line| line.contains(field_name))
    else {
        debug!(field = field_name, "field not present in metadata");
        return FieldValue::Absent;
    };

    let Some(after_field) = line.find(field_name).map(|at| &line[at + field_name.len()..]) else {
        return FieldValue::Absent;
    };

    let Some(colon) = after_field.find(':') else {
        debug!(field = field_name, raw = line, "no ':' after field name");
        return FieldValue::Absent;
    };

    let raw = after_field[colon + 1..].trim();
    match parse_timestamp(raw) {
        Some(timestamp) => FieldValue::Parsed(timestamp),
        None => {
            debug!(field = field_name, raw, "unparseable date value");
            FieldValue::Unparseable
        }
    }
}

/// `2021:05:04` style dates as written by EXIF and QuickTime tags.
static EXIF_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}):(\d{2}):(\d{2})").expect("static regex"));

/// Trailing zone abbreviations (`UTC`, `AEST`, `DST`), which carry nothing we keep.
static ZONE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[A-Z]{2,5}$").expect("static regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d-%b-%Y %H:%M:%S %z",
    "%d-%b-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M",
    "%a %d %b %Y %H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%b %d, %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%d-%b-%Y", "%b %d, %Y", "%b %d %Y"];

/// Parses a human-readable timestamp into wall-clock time.
///
/// Accepts the metadata tool's own `YYYY:MM:DD HH:MM:SS[.fff][±HH:MM|Z]`
/// form, ISO 8601 / RFC 3339, RFC 2822 and common day-month-year and
/// month-day-year text. Slash-separated numeric dates are rejected because
/// day and month order cannot be told apart.
///
/// # Examples
///
/// ```
/// use mediasort::date_resolver::parse_timestamp;
///
/// assert!(parse_timestamp("2021:01:02 10:00:00+11:00").is_some());
/// assert!(parse_timestamp("0000:00:00 00:00:00").is_none());
/// assert!(parse_timestamp("01/02/2021 10:00").is_none());
/// ```
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() || text.starts_with("0000") {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local());
    }

    let normalized = normalize(text);

    if let Some(naive) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
    {
        return Some(naive);
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn normalize(text: &str) -> String {
    let text = EXIF_DATE.replace(text, "$1-$2-$3");
    let text = ZONE_NAME.replace(&text, "");
    match text.strip_suffix('Z') {
        Some(rest) => format!("{rest}+00:00"),
        None => text.into_owned(),
    }
}
