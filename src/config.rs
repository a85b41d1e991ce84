use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bench::config::{RunConfig, Workload};
use crate::bench::result::TestCase;
use crate::error::BenchError;
use crate::payload::{parse_size, PayloadSource, GIB, MIB};
use crate::verifier;

/// Sizes uploaded by `benchmark-sizes` when neither sizes nor files are given
pub const DEFAULT_SIZES: [u64; 5] = [MIB, 10 * MIB, 100 * MIB, GIB, 2 * GIB];

/// Content-addressed storage daemon benchmark harness
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Daemon API host
    #[arg(short = 'H', long, env = "DAEMON_HOST", default_value = "localhost", global = true)]
    pub host: String,

    /// Daemon API port
    #[arg(short, long, env = "DAEMON_PORT", default_value = "5001", global = true)]
    pub port: u16,

    /// Timeout for every request in seconds
    #[arg(long, env = "DAEMON_TIMEOUT", default_value = "60", global = true)]
    pub timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Docker container that must be running before the benchmark starts
    #[arg(long, env = "DAEMON_CONTAINER", default_value = "ipfs_host", global = true)]
    pub container: String,

    /// Do not check that the daemon container is running
    #[arg(long, global = true)]
    pub skip_container_check: bool,

    /// Start an in-process mock daemon and benchmark it
    #[arg(long, global = true)]
    pub standalone: bool,

    /// Print the report as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Hide the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload one payload per size (or file) and measure throughput
    BenchmarkSizes {
        /// Payload sizes (comma-separated, K/M/G suffixes)
        #[arg(short = 's', long, value_delimiter = ',', value_parser = parse_size)]
        sizes: Vec<u64>,

        /// Existing files to upload
        #[arg(short = 'f', long = "file")]
        files: Vec<PathBuf>,

        /// CSV export path
        #[arg(short = 'o', long, default_value = "ipfs_benchmark.csv")]
        output: PathBuf,

        /// Also write cid,sha256 pairs for the verify command
        #[arg(long)]
        cases_output: Option<PathBuf>,
    },

    /// Upload fresh random payloads continuously for a fixed duration
    SustainedLoad {
        /// Duration in seconds
        #[arg(short = 'd', long, default_value = "600")]
        duration: u64,

        /// Size of each payload (K/M/G suffixes)
        #[arg(short = 's', long, default_value = "1M", value_parser = parse_size)]
        file_size: u64,

        /// Number of concurrent workers
        #[arg(short = 'c', long, default_value = "1")]
        concurrency: usize,

        /// Optional CSV export path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Download objects and check them against expected SHA-256 digests
    Verify {
        /// Test case as CID=SHA256 (repeatable)
        #[arg(long = "case", value_parser = parse_test_case)]
        cases: Vec<TestCase>,

        /// CSV file of cid,sha256 rows
        #[arg(long)]
        cases_file: Option<PathBuf>,
    },

    /// Download objects and measure retrieval time
    DownloadBenchmark {
        /// Identifier to download (repeatable)
        #[arg(long = "cid")]
        cids: Vec<String>,

        /// File with one identifier per line
        #[arg(long)]
        cids_file: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// What to run and against which daemon
    pub run: RunConfig,

    // Preconditions
    pub container: Option<String>,
    pub standalone: bool,

    // Output
    pub log_level: String,
    pub json: bool,
    pub progress: bool,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Build configuration from parsed arguments, reading any input files
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let workload = match args.command {
            Command::BenchmarkSizes {
                sizes,
                files,
                output,
                cases_output,
            } => {
                let sizes = if sizes.is_empty() && files.is_empty() {
                    DEFAULT_SIZES.to_vec()
                } else {
                    sizes
                };

                let sources = sizes
                    .into_iter()
                    .map(PayloadSource::Generated)
                    .chain(files.into_iter().map(PayloadSource::File))
                    .collect();

                Workload::Sizes {
                    sources,
                    export: output,
                    cases_export: cases_output,
                }
            }

            Command::SustainedLoad {
                duration,
                file_size,
                concurrency,
                output,
            } => Workload::Sustained {
                duration: Duration::from_secs(duration),
                payload_size: file_size,
                concurrency,
                export: output,
            },

            Command::Verify { cases, cases_file } => {
                let mut cases = cases;
                if let Some(path) = cases_file {
                    cases.extend(load_test_cases(&path)?);
                }
                Workload::Verify { cases }
            }

            Command::DownloadBenchmark { cids, cids_file } => {
                let mut cids = cids;
                if let Some(path) = cids_file {
                    cids.extend(load_cids(&path)?);
                }
                Workload::Download { cids }
            }
        };

        // Standalone runs never need the container
        let container = if args.standalone || args.skip_container_check {
            None
        } else {
            Some(args.container)
        };

        Ok(Config {
            run: RunConfig {
                host: args.host,
                port: args.port,
                timeout: Duration::from_secs(args.timeout),
                workload,
            },
            container,
            standalone: args.standalone,
            log_level: args.log_level,
            json: args.json,
            progress: !args.no_progress,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), BenchError> {
        if self.run.timeout.is_zero() {
            return Err(BenchError::Config("timeout must be greater than 0".to_string()));
        }

        match &self.run.workload {
            Workload::Sizes { sources, .. } => {
                if sources.is_empty() {
                    return Err(BenchError::Config("no payloads to upload".to_string()));
                }
            }
            Workload::Sustained {
                duration,
                concurrency,
                ..
            } => {
                if duration.is_zero() {
                    return Err(BenchError::Config("duration must be greater than 0".to_string()));
                }
                if *concurrency == 0 {
                    return Err(BenchError::Config("concurrency must be at least 1".to_string()));
                }
            }
            Workload::Verify { cases } => {
                if cases.is_empty() {
                    return Err(BenchError::Config(
                        "no test cases (use --case or --cases-file)".to_string(),
                    ));
                }
                if let Some(bad) = cases.iter().find(|c| !verifier::is_sha256_hex(&c.sha256)) {
                    return Err(BenchError::Config(format!(
                        "expected hash for {} is not a SHA-256 hex digest: {}",
                        bad.cid, bad.sha256
                    )));
                }
            }
            Workload::Download { cids } => {
                if cids.is_empty() {
                    return Err(BenchError::Config(
                        "no identifiers (use --cid or --cids-file)".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parse a `CID=SHA256` pair
pub fn parse_test_case(s: &str) -> std::result::Result<TestCase, String> {
    let (cid, sha256) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected CID=SHA256, got: {}", s))?;

    let (cid, sha256) = (cid.trim(), sha256.trim());
    if cid.is_empty() || sha256.is_empty() {
        return Err(format!("Expected CID=SHA256, got: {}", s));
    }

    Ok(TestCase {
        cid: cid.to_string(),
        sha256: sha256.to_string(),
    })
}

/// Read `cid,sha256` rows; a leading header row and `#` comments are skipped
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open test cases file: {}", path.display()))?;

    let mut cases = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Failed to read {} at row {}", path.display(), line + 1))?;

        match (record.get(0), record.get(1)) {
            (Some("cid"), Some("sha256")) if line == 0 => continue,
            (Some(cid), Some(sha256)) if !cid.is_empty() && !sha256.is_empty() => {
                cases.push(TestCase {
                    cid: cid.to_string(),
                    sha256: sha256.to_string(),
                });
            }
            _ => anyhow::bail!(
                "Malformed test case in {} at row {}: expected cid,sha256",
                path.display(),
                line + 1
            ),
        }
    }

    Ok(cases)
}

/// Read one identifier per line, ignoring blank lines and `#` comments
pub fn load_cids(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read identifiers file: {}", path.display()))?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
