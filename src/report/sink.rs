//! Report sinks consuming terminal results one at a time.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pool::TaskOutcome;

use super::{ReportError, format_timestamp};

/// Destination for the engine's result stream. The engine calls
/// [`ReportSink::record`] once per terminal result; buffering and flushing
/// are the sink's concern.
pub trait ReportSink {
    fn record(&mut self, outcome: &TaskOutcome) -> Result<(), ReportError>;

    /// Flush buffered output. Called once after the run drains.
    fn finish(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

pub(super) const CSV_HEADER: &str =
    "file_name,file_path,size_bytes,algorithm,digest,last_modified,elapsed_ms,status,attempts,error";

/// Streaming CSV writer; rows hit the file as results arrive.
pub struct CsvReportWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvReportWriter {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = File::create(path).map_err(|source| ReportError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}").map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn write_row(&mut self, fields: &[String]) -> Result<(), ReportError> {
        let row = fields
            .iter()
            .map(|field| escape_csv_field(field))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{row}").map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl ReportSink for CsvReportWriter {
    fn record(&mut self, outcome: &TaskOutcome) -> Result<(), ReportError> {
        let fields = match outcome {
            TaskOutcome::Success(result) => vec![
                file_name_field(&result.path),
                result.path.display().to_string(),
                result.size.to_string(),
                result.algorithm.name().to_string(),
                result.digest.clone(),
                format_timestamp(result.modified),
                result.elapsed.as_millis().to_string(),
                "ok".to_string(),
                String::new(),
                String::new(),
            ],
            TaskOutcome::Failure(failure) => vec![
                file_name_field(&failure.path),
                failure.path.display().to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                "error".to_string(),
                failure.attempts.to_string(),
                format!("{}: {}", failure.kind.name(), failure.message),
            ],
        };
        self.write_row(&fields)
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        self.writer.flush().map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// JSON report entries; a report file is one array of these.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(super) enum JsonEntry {
    Ok {
        path: String,
        size: u64,
        algorithm: String,
        digest: String,
        last_modified: String,
        elapsed_ms: u64,
    },
    Error {
        path: String,
        kind: String,
        message: String,
        attempts: u32,
    },
}

/// Buffering JSON writer; the array is serialized once on [`ReportSink::finish`]
/// so the file is always valid JSON.
pub struct JsonReportWriter {
    path: PathBuf,
    entries: Vec<JsonEntry>,
}

impl JsonReportWriter {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
        })
    }
}

impl ReportSink for JsonReportWriter {
    fn record(&mut self, outcome: &TaskOutcome) -> Result<(), ReportError> {
        let entry = match outcome {
            TaskOutcome::Success(result) => JsonEntry::Ok {
                path: result.path.display().to_string(),
                size: result.size,
                algorithm: result.algorithm.name().to_string(),
                digest: result.digest.clone(),
                last_modified: format_timestamp(result.modified),
                elapsed_ms: result.elapsed.as_millis() as u64,
            },
            TaskOutcome::Failure(failure) => JsonEntry::Error {
                path: failure.path.display().to_string(),
                kind: failure.kind.name().to_string(),
                message: failure.message.clone(),
                attempts: failure.attempts,
            },
        };
        self.entries.push(entry);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        let file = File::create(&self.path).map_err(|source| ReportError::Create {
            path: self.path.clone(),
            source,
        })?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.entries).map_err(|source| {
            ReportError::Serialize {
                path: self.path.clone(),
                source,
            }
        })
    }
}

fn file_name_field(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
pub(super) fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
