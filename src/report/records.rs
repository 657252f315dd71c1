//! Loading previously produced reports back into [`ReportRecord`] sequences
//! for comparison. Only successful rows become records; error rows carry no
//! digest to compare.

use std::path::{Path, PathBuf};

use super::sink::JsonEntry;
use super::{ReportError, ReportFormat, ReportRecord};

/// Load records from a report file, dispatching on its extension.
pub fn load_records(path: &Path) -> Result<Vec<ReportRecord>, ReportError> {
    match ReportFormat::from_path(path) {
        Some(ReportFormat::Csv) => load_csv(path),
        Some(ReportFormat::Json) => load_json(path),
        None => Err(ReportError::UnknownFormat(path.to_path_buf())),
    }
}

fn load_json(path: &Path) -> Result<Vec<ReportRecord>, ReportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<JsonEntry> =
        serde_json::from_str(&text).map_err(|source| ReportError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            JsonEntry::Ok {
                path,
                size,
                digest,
                last_modified,
                ..
            } => Some(ReportRecord {
                path: PathBuf::from(path),
                digest,
                size,
                modified: last_modified,
            }),
            JsonEntry::Error { .. } => None,
        })
        .collect())
}

fn load_csv(path: &Path) -> Result<Vec<ReportRecord>, ReportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines().enumerate();
    let Some((_, header)) = lines.next() else {
        return Err(ReportError::ParseCsv {
            path: path.to_path_buf(),
            line: 1,
            message: "missing header".to_string(),
        });
    };
    let columns = ColumnIndices::from_header(header, path)?;

    let mut records = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_line(line);
        let line_number = idx + 1;
        let get = |column: usize| -> Result<&str, ReportError> {
            fields
                .get(column)
                .map(String::as_str)
                .ok_or_else(|| ReportError::ParseCsv {
                    path: path.to_path_buf(),
                    line: line_number,
                    message: format!("expected at least {} fields", column + 1),
                })
        };
        if get(columns.status)? != "ok" {
            continue;
        }
        let size_text = get(columns.size)?;
        let size = size_text
            .parse::<u64>()
            .map_err(|_| ReportError::ParseCsv {
                path: path.to_path_buf(),
                line: line_number,
                message: format!("invalid size {size_text:?}"),
            })?;
        records.push(ReportRecord {
            path: PathBuf::from(get(columns.path)?),
            digest: get(columns.digest)?.to_string(),
            size,
            modified: get(columns.modified)?.to_string(),
        });
    }
    Ok(records)
}

struct ColumnIndices {
    path: usize,
    size: usize,
    digest: usize,
    modified: usize,
    status: usize,
}

impl ColumnIndices {
    fn from_header(header: &str, path: &Path) -> Result<Self, ReportError> {
        let names: Vec<&str> = header.split(',').collect();
        let find = |name: &str| -> Result<usize, ReportError> {
            names
                .iter()
                .position(|candidate| *candidate == name)
                .ok_or_else(|| ReportError::ParseCsv {
                    path: path.to_path_buf(),
                    line: 1,
                    message: format!("missing column {name:?}"),
                })
        };
        Ok(Self {
            path: find("file_path")?,
            size: find("size_bytes")?,
            digest: find("digest")?,
            modified: find("last_modified")?,
            status: find("status")?,
        })
    }
}

/// Split one CSV line, honoring double-quote quoting with `""` escapes.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
