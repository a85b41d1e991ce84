//! Report generation for benchmark results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use super::config::Mode;
use super::driver::BenchmarkRun;
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::result::{round2, BenchmarkResult, Operation};
use crate::error::{BenchError, Result};

/// Header of the upload export file
pub const CSV_HEADER: [&str; 4] = ["size_mb", "cid", "time_sec", "speed_mb_s"];

/// Header of the test-case export file
pub const CASES_HEADER: [&str; 2] = ["cid", "sha256"];

/// Complete benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub interrupted: bool,
    /// One row per recorded result, in recorded order
    pub results: Vec<ResultRow>,
    pub summary: MetricsSnapshot,
}

/// Display form of a single result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub sequence: u64,
    pub operation: Operation,
    pub cid: Option<String>,
    pub size_mb: f64,
    pub time_sec: Option<f64>,
    pub speed_mb_s: Option<f64>,
    pub sha256: Option<String>,
    pub error: Option<String>,
}

impl ResultRow {
    fn from_result(result: &BenchmarkResult) -> Self {
        let succeeded = result.is_success();
        Self {
            sequence: result.sequence,
            operation: result.operation,
            cid: result.cid.clone(),
            size_mb: round2(result.size_mb()),
            time_sec: succeeded.then(|| round2(result.elapsed.as_secs_f64())),
            speed_mb_s: result.throughput_mb_s().map(round2),
            sha256: result.sha256.clone(),
            error: result.error_message(),
        }
    }

    fn label(&self) -> String {
        self.cid
            .clone()
            .unwrap_or_else(|| format!("#{}", self.sequence))
    }
}

/// Row of the upload export file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvRow {
    pub size_mb: f64,
    pub cid: String,
    pub time_sec: f64,
    pub speed_mb_s: f64,
}

impl BenchmarkReport {
    /// Create a report from a finished run
    pub fn from_run(mode: Mode, run: &BenchmarkRun) -> Self {
        let summary = MetricsCollector::from_results(&run.results, run.elapsed).snapshot();
        Self {
            mode,
            started_at: run.started_at,
            interrupted: run.interrupted,
            results: run.results.iter().map(ResultRow::from_result).collect(),
            summary,
        }
    }

    /// Render the results and summary as an ASCII table
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        let title = format!("CAS DAEMON BENCHMARK RESULTS ({})", self.mode);

        let _ = writeln!(out);
        let _ = writeln!(out, "╔{}╗", "═".repeat(104));
        let _ = writeln!(out, "║{:^104}║", title);
        let _ = writeln!(out, "╚{}╝", "═".repeat(104));
        let _ = writeln!(out);
        let _ = writeln!(out, "┌──────┬───────────┬────────────────────────────────────────────────────┬──────────┬──────────┬──────────┐");
        let _ = writeln!(out, "│    # │ Operation │ CID                                                │ Size(MB) │  Time(s) │     MB/s │");
        let _ = writeln!(out, "├──────┼───────────┼────────────────────────────────────────────────────┼──────────┼──────────┼──────────┤");

        for row in &self.results {
            match &row.error {
                None => {
                    let _ = writeln!(
                        out,
                        "│ {:>4} │ {:<9} │ {:<50} │ {:>8.2} │ {:>8.2} │ {:>8.2} │",
                        row.sequence,
                        row.operation,
                        row.label(),
                        row.size_mb,
                        row.time_sec.unwrap_or_default(),
                        row.speed_mb_s.unwrap_or_default(),
                    );
                }
                Some(error) => {
                    let _ = writeln!(
                        out,
                        "│ {:>4} │ {:<9} │ {:<50} │ ERROR: {}",
                        row.sequence,
                        row.operation,
                        row.label(),
                        error
                    );
                }
            }
        }

        let _ = writeln!(out, "└──────┴───────────┴────────────────────────────────────────────────────┴──────────┴──────────┴──────────┘");
        let _ = writeln!(out);

        let s = &self.summary;
        let _ = writeln!(
            out,
            "Operations: {} ok, {} failed ({:.1}% success) in {:.2}s",
            s.success_count, s.error_count, s.success_rate, s.elapsed_secs
        );
        if s.success_count > 0 {
            let _ = writeln!(
                out,
                "Latency: p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms",
                s.latency_p50, s.latency_p95, s.latency_p99
            );
            let _ = writeln!(
                out,
                "Throughput: {:.2} ops/s, {:.2} MB/s ({} bytes)",
                s.operations_per_second, s.throughput_mb_s, s.bytes_transferred
            );
        }
        if self.interrupted {
            let _ = writeln!(out, "Run interrupted: results are partial");
        }

        out
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        print!("{}", self.format_table());
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Rows for the upload export: successful uploads only
    pub fn csv_rows(&self) -> Vec<CsvRow> {
        self.results
            .iter()
            .filter(|row| row.operation == Operation::Upload && row.error.is_none())
            .filter_map(|row| {
                Some(CsvRow {
                    size_mb: row.size_mb,
                    cid: row.cid.clone()?,
                    time_sec: row.time_sec?,
                    speed_mb_s: row.speed_mb_s.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Render the upload export as CSV text
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        writer.write_record(CSV_HEADER).map_err(csv_error)?;
        for row in self.csv_rows() {
            writer.serialize(row).map_err(csv_error)?;
        }

        finish_csv(writer)
    }

    /// Render `cid,sha256` pairs of successful uploads, consumable by `verify`
    pub fn test_cases_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        writer.write_record(CASES_HEADER).map_err(csv_error)?;
        for row in &self.results {
            if let (Operation::Upload, None, Some(cid), Some(sha256)) =
                (row.operation, &row.error, &row.cid, &row.sha256)
            {
                writer.write_record([cid, sha256]).map_err(csv_error)?;
            }
        }

        finish_csv(writer)
    }

    /// Write the upload export to `path`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_text(path, &self.to_csv()?)
    }

    /// Write the test-case export to `path`
    pub fn write_test_cases(&self, path: &Path) -> Result<()> {
        write_text(path, &self.test_cases_csv()?)
    }
}

fn csv_error(e: csv::Error) -> BenchError {
    BenchError::Io(format!("CSV export failed: {}", e))
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| BenchError::Io(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| BenchError::Io(e.to_string()))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text)
        .map_err(|e| BenchError::Io(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), "Results saved");
    Ok(())
}
