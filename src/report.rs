//! Report records, sinks, readers, and snapshot comparison.
//!
//! The engine streams terminal results into a [`sink::ReportSink`] one at a
//! time; buffering, flushing, and format are the sink's concern. Completed
//! reports can be loaded back as [`ReportRecord`] sequences and diffed with
//! [`compare::compare`].

pub mod compare;
pub mod records;
pub mod sink;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

pub use compare::{DiffEntry, DiffKind, compare};
pub use records::load_records;
pub use sink::{CsvReportWriter, JsonReportWriter, ReportSink};

/// One row of a previously produced report, as the comparison engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub path: PathBuf,
    pub digest: String,
    pub size: u64,
    pub modified: String,
}

/// Errors from writing or reading report files.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create report file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write report file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read report file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize report {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to parse JSON report {path}: {source}")]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to parse CSV report {path} at line {line}: {message}")]
    ParseCsv {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Unrecognized report format: {0} (expected .csv or .json)")]
    UnknownFormat(PathBuf),
}

/// Supported on-disk report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

const REPORT_NAME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year repr:last_two][month][day]-[hour][minute]");

/// Resolve the report path for a run: a directory gets a timestamped file
/// name inside it, anything else is used as given.
pub fn resolve_report_path(output: &Path, format: ReportFormat) -> PathBuf {
    if output.is_dir() {
        let stamp = OffsetDateTime::now_utc()
            .format(REPORT_NAME_FORMAT)
            .unwrap_or_else(|_| "unknown".to_string());
        return output.join(format!("hashscan-{stamp}.{}", format.extension()));
    }
    output.to_path_buf()
}

/// Human-readable byte count for summaries and report fields.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ];
    for (unit, scale) in UNITS {
        if bytes >= scale {
            return format!("{:.2} {unit}", bytes as f64 / scale as f64);
        }
    }
    "0.00 B".to_string()
}

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Render a file timestamp the way report rows carry it.
pub(crate) fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            ReportFormat::from_path(Path::new("out.CSV")),
            Some(ReportFormat::Csv)
        );
        assert_eq!(
            ReportFormat::from_path(Path::new("out.json")),
            Some(ReportFormat::Json)
        );
        assert_eq!(ReportFormat::from_path(Path::new("out.txt")), None);
        assert_eq!(ReportFormat::from_path(Path::new("out")), None);
    }

    #[test]
    fn directories_get_timestamped_report_names() {
        let dir = tempdir().unwrap();
        let path = resolve_report_path(dir.path(), ReportFormat::Csv);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("hashscan-"));
        assert!(name.ends_with(".csv"));
        assert_eq!(path.parent().unwrap(), dir.path());
    }

    #[test]
    fn explicit_file_paths_pass_through() {
        let explicit = Path::new("/reports/nightly.json");
        assert_eq!(
            resolve_report_path(explicit, ReportFormat::Json),
            explicit.to_path_buf()
        );
    }

    #[test]
    fn sizes_format_with_two_decimals() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn timestamps_render_sortably() {
        let rendered = format_timestamp(SystemTime::UNIX_EPOCH);
        assert_eq!(rendered, "1970-01-01 00:00:00");
    }
}
