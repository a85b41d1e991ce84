//! Per-operation records produced by the runner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BenchError;
use crate::payload::{PayloadSource, MIB};

/// Identifier paired with the SHA-256 its content should hash to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub cid: String,
    pub sha256: String,
}

/// Kind of daemon operation a result measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
    Verify,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Upload => write!(f, "upload"),
            Operation::Download => write!(f, "download"),
            Operation::Verify => write!(f, "verify"),
        }
    }
}

/// One unit of work for the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchInput {
    Upload(PayloadSource),
    Download(String),
    Verify(TestCase),
}

impl BenchInput {
    pub fn operation(&self) -> Operation {
        match self {
            BenchInput::Upload(_) => Operation::Upload,
            BenchInput::Download(_) => Operation::Download,
            BenchInput::Verify(_) => Operation::Verify,
        }
    }

    pub fn label(&self) -> String {
        match self {
            BenchInput::Upload(source) => source.label(),
            BenchInput::Download(cid) => cid.clone(),
            BenchInput::Verify(case) => case.cid.clone(),
        }
    }
}

/// Tagged result of an attempted operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Failed(BenchError),
}

/// One record per attempted operation; never mutated once built
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    /// Local sequence number, assigned when the attempt starts
    pub sequence: u64,
    pub operation: Operation,
    /// Identifier uploaded to or fetched from the daemon, if known
    pub cid: Option<String>,
    /// Payload bytes moved (or planned, for failed uploads)
    pub size_bytes: u64,
    /// SHA-256 of the uploaded payload
    pub sha256: Option<String>,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl BenchmarkResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    pub fn error(&self) -> Option<&BenchError> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failed(e) => Some(e),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error().map(|e| e.to_string())
    }

    /// Identifier if one exists, else `#<sequence>`
    pub fn label(&self) -> String {
        self.cid
            .clone()
            .unwrap_or_else(|| format!("#{}", self.sequence))
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / MIB as f64
    }

    /// MB/s for successful operations with a measurable duration
    pub fn throughput_mb_s(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if self.is_success() && secs > 0.0 {
            Some(self.size_mb() / secs)
        } else {
            None
        }
    }
}

/// Round to two decimal places for display and export
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_result(outcome: Outcome) -> BenchmarkResult {
        BenchmarkResult {
            sequence: 3,
            operation: Operation::Upload,
            cid: None,
            size_bytes: MIB,
            sha256: None,
            elapsed: Duration::from_secs(2),
            outcome,
        }
    }

    #[test]
    fn test_success_throughput() {
        let result = upload_result(Outcome::Success);
        assert!(result.is_success());
        assert_eq!(result.throughput_mb_s(), Some(0.5));
        assert_eq!(result.error_message(), None);
    }

    #[test]
    fn test_failure_has_no_throughput() {
        let result = upload_result(Outcome::Failed(BenchError::status(500, "disk full")));
        assert!(!result.is_success());
        assert_eq!(result.throughput_mb_s(), None);
        assert!(result.error_message().unwrap().contains("disk full"));
        assert_eq!(result.label(), "#3");
    }

    #[test]
    fn test_input_labels() {
        let input = BenchInput::Upload(PayloadSource::Generated(10 * MIB));
        assert_eq!(input.label(), "random 10MB");
        assert_eq!(input.operation(), Operation::Upload);

        let input = BenchInput::Verify(TestCase {
            cid: "QmA".to_string(),
            sha256: "00".to_string(),
        });
        assert_eq!(input.label(), "QmA");
        assert_eq!(input.operation(), Operation::Verify);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(0.005), 0.01);
        assert_eq!(round2(2.0), 2.0);
    }
}
