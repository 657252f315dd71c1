//! hashscan - hash directory trees and compare the resulting reports.
//!
//! Usage:
//!   hashscan scan /data                    # CSV report in the current directory
//!   hashscan scan /data -o out.json -a sha256
//!   hashscan scan /data --include '*.iso' --min-size 1MB
//!   hashscan compare old.csv new.csv
//!   hashscan algorithms

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use hashscan::config::EngineConfig;
use hashscan::hashing::HashAlgorithm;
use hashscan::pool::HashPool;
use hashscan::report::{
    self, CsvReportWriter, DiffKind, JsonReportWriter, ReportFormat, ReportSink,
};
use hashscan::resource_monitor::ResourceMonitor;
use hashscan::scanner::Scanner;
use hashscan::scanner::filter::CompiledFilter;

/// Hash directory trees and compare the resulting reports.
#[derive(Parser)]
#[command(name = "hashscan", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and write a hash report.
    Scan {
        /// Directory to scan.
        directory: PathBuf,

        /// Output file (.csv or .json) or directory for a timestamped report.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Hash algorithm (md5, sha1, sha256, sha512, blake3).
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Minimum file size, e.g. 500KB or plain bytes.
        #[arg(long, value_name = "SIZE")]
        min_size: Option<String>,

        /// Maximum file size, e.g. 2GB or plain bytes.
        #[arg(long, value_name = "SIZE")]
        max_size: Option<String>,

        /// Include files matching this pattern (repeatable).
        #[arg(long, value_name = "PATTERN")]
        include: Vec<String>,

        /// Exclude files matching this pattern (repeatable).
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Treat patterns as regular expressions instead of globs.
        #[arg(long)]
        regex: bool,

        /// Only scan the directory's immediate children.
        #[arg(long)]
        no_recursive: bool,

        /// TOML config file with engine settings.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Also write logs to timestamped files in this directory.
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,
    },
    /// Compare two previously written reports.
    Compare {
        /// The older report (.csv or .json).
        old: PathBuf,
        /// The newer report (.csv or .json).
        new: PathBuf,
    },
    /// List supported hash algorithms.
    Algorithms,
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    match args.command {
        Command::Scan {
            directory,
            output,
            algorithm,
            min_size,
            max_size,
            include,
            exclude,
            regex,
            no_recursive,
            config,
            log_dir,
        } => {
            let config = resolve_config(
                config, algorithm, min_size, max_size, include, exclude, regex, no_recursive,
            )?;
            hashscan::logging::init(log_dir.as_deref()).map_err(|err| err.to_string())?;
            run_scan(&directory, &output, &config)
        }
        Command::Compare { old, new } => run_compare(&old, &new),
        Command::Algorithms => {
            println!("Available hash algorithms:");
            for algorithm in HashAlgorithm::ALL {
                println!("- {algorithm}");
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_config(
    config_path: Option<PathBuf>,
    algorithm: Option<String>,
    min_size: Option<String>,
    max_size: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    regex: bool,
    no_recursive: bool,
) -> Result<EngineConfig, String> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load_from_path(&path).map_err(|err| err.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm;
    }
    if let Some(text) = min_size {
        config.filter.min_size = Some(parse_size(&text)?);
    }
    if let Some(text) = max_size {
        config.filter.max_size = Some(parse_size(&text)?);
    }
    config.filter.include.extend(include);
    config.filter.exclude.extend(exclude);
    config.filter.use_regex |= regex;
    if no_recursive {
        config.recursive = false;
    }
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn run_scan(
    directory: &std::path::Path,
    output: &std::path::Path,
    config: &EngineConfig,
) -> Result<(), String> {
    let filter = CompiledFilter::compile(&config.filter).map_err(|err| err.to_string())?;
    let format = ReportFormat::from_path(output).unwrap_or(ReportFormat::Csv);
    let report_path = report::resolve_report_path(output, format);
    let mut sink: Box<dyn ReportSink> = match format {
        ReportFormat::Csv => {
            Box::new(CsvReportWriter::create(&report_path).map_err(|err| err.to_string())?)
        }
        ReportFormat::Json => {
            Box::new(JsonReportWriter::create(&report_path).map_err(|err| err.to_string())?)
        }
    };

    let monitor = ResourceMonitor::start(config.resource_check_interval());
    let pool = HashPool::new(config)
        .map_err(|err| err.to_string())?
        .with_pressure(monitor.pressure());
    let scanner =
        Scanner::new(directory, config.recursive, filter).map_err(|err| err.to_string())?;

    let mut sink_error = None;
    let summary = pool
        .run(scanner, |outcome| {
            if sink_error.is_none()
                && let Err(err) = sink.record(outcome)
            {
                sink_error = Some(err);
            }
        })
        .map_err(|err| err.to_string())?;
    drop(monitor);
    if let Some(err) = sink_error {
        return Err(err.to_string());
    }
    sink.finish().map_err(|err| err.to_string())?;

    println!("Report saved to: {}", report_path.display());
    println!(
        "Processed {} files ({}) in {:.1}s",
        summary.processed,
        report::format_size(summary.bytes_hashed),
        summary.elapsed.as_secs_f64()
    );
    if summary.canceled > 0 {
        println!("Canceled with {} files unprocessed", summary.canceled);
    }
    let errored = summary.failed + summary.scan_errors;
    if errored > 0 {
        println!(
            "{errored} errors ({} hashing, {} scanning); first {}:",
            summary.failed,
            summary.scan_errors,
            summary.first_errors.len()
        );
        for detail in &summary.first_errors {
            println!("  {detail}");
        }
    }
    Ok(())
}

fn run_compare(old: &std::path::Path, new: &std::path::Path) -> Result<(), String> {
    let old_records = report::load_records(old).map_err(|err| err.to_string())?;
    let new_records = report::load_records(new).map_err(|err| err.to_string())?;
    let entries = report::compare(&old_records, &new_records);
    if entries.is_empty() {
        println!("No differences.");
        return Ok(());
    }
    for entry in &entries {
        match entry.kind {
            DiffKind::Modified => {
                if let Some(record) = &entry.new {
                    println!("modified  {}", record.path.display());
                }
            }
            DiffKind::Moved => {
                if let (Some(old_record), Some(new_record)) = (&entry.old, &entry.new) {
                    println!(
                        "moved     {} -> {}",
                        old_record.path.display(),
                        new_record.path.display()
                    );
                }
            }
            DiffKind::Added => {
                if let Some(record) = &entry.new {
                    println!("added     {}", record.path.display());
                }
            }
            DiffKind::Removed => {
                if let Some(record) = &entry.old {
                    println!("removed   {}", record.path.display());
                }
            }
        }
    }
    println!("{} difference(s)", entries.len());
    Ok(())
}

/// Parse sizes like "500KB", "1MB", "2GB", or plain byte counts.
fn parse_size(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (number, scale) = if let Some(rest) = upper.strip_suffix("GB") {
        (rest, 1024u64 * 1024 * 1024)
    } else if let Some(rest) = upper.strip_suffix("MB") {
        (rest, 1024 * 1024)
    } else if let Some(rest) = upper.strip_suffix("KB") {
        (rest, 1024)
    } else if let Some(rest) = upper.strip_suffix('B') {
        (rest, 1)
    } else {
        (upper.as_str(), 1)
    };
    let number = number.trim();
    number
        .parse::<u64>()
        .map(|value| value * scale)
        .map_err(|_| format!("Invalid size {text:?}; expected e.g. 500KB, 1MB, 2GB"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes_with_and_without_units() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("10B").unwrap(), 10);
        assert_eq!(parse_size("500KB").unwrap(), 500 * 1024);
        assert_eq!(parse_size("1mb").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2 GB").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("1.5MB").is_err());
    }

    #[test]
    fn cli_overrides_reach_the_config() {
        let config = resolve_config(
            None,
            Some("sha512".to_string()),
            Some("1KB".to_string()),
            None,
            vec!["*.iso".to_string()],
            Vec::new(),
            false,
            true,
        )
        .unwrap();
        assert_eq!(config.algorithm, "sha512");
        assert_eq!(config.filter.min_size, Some(1024));
        assert_eq!(config.filter.include, vec!["*.iso".to_string()]);
        assert!(!config.recursive);
    }

    #[test]
    fn invalid_overrides_fail_validation() {
        let result = resolve_config(
            None,
            Some("crc64".to_string()),
            None,
            None,
            Vec::new(),
            Vec::new(),
            false,
            false,
        );
        assert!(result.is_err());
    }
}
