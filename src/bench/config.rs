//! Configuration structs for benchmark runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::result::TestCase;
use crate::payload::PayloadSource;

/// Which scenario a run exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    BenchmarkSizes,
    SustainedLoad,
    Verify,
    DownloadBenchmark,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::BenchmarkSizes => write!(f, "benchmark-sizes"),
            Mode::SustainedLoad => write!(f, "sustained-load"),
            Mode::Verify => write!(f, "verify"),
            Mode::DownloadBenchmark => write!(f, "download-benchmark"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "benchmark-sizes" => Ok(Mode::BenchmarkSizes),
            "sustained-load" => Ok(Mode::SustainedLoad),
            "verify" => Ok(Mode::Verify),
            "download-benchmark" => Ok(Mode::DownloadBenchmark),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// What a run does, with the inputs specific to its mode
#[derive(Debug, Clone)]
pub enum Workload {
    /// Upload each source once, in order
    Sizes {
        sources: Vec<PayloadSource>,
        export: PathBuf,
        cases_export: Option<PathBuf>,
    },
    /// Upload fresh random payloads until the duration elapses
    Sustained {
        duration: Duration,
        payload_size: u64,
        concurrency: usize,
        export: Option<PathBuf>,
    },
    /// Download and hash-check each case, in order
    Verify { cases: Vec<TestCase> },
    /// Download each identifier, in order
    Download { cids: Vec<String> },
}

impl Workload {
    pub fn mode(&self) -> Mode {
        match self {
            Workload::Sizes { .. } => Mode::BenchmarkSizes,
            Workload::Sustained { .. } => Mode::SustainedLoad,
            Workload::Verify { .. } => Mode::Verify,
            Workload::Download { .. } => Mode::DownloadBenchmark,
        }
    }
}

/// Immutable settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Daemon API host
    pub host: String,
    /// Daemon API port
    pub port: u16,
    /// Bound on every network call
    pub timeout: Duration,
    /// Scenario and its inputs
    pub workload: Workload,
}

impl RunConfig {
    /// Base URL of the daemon API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn mode(&self) -> Mode {
        self.workload.mode()
    }
}

/// Configuration for the in-process mock daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDaemonConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Simulated latency per request in milliseconds
    pub latency_ms: u64,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
}

impl Default for MockDaemonConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 0,
            error_rate: 0.0,
        }
    }
}
