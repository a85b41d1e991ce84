//! Benchmark runner: executes a single operation and records the outcome.

use bytes::Bytes;
use std::time::Duration;

use super::result::{BenchInput, BenchmarkResult, Operation, Outcome, TestCase};
use crate::error::{BenchError, Result};
use crate::http_client::DaemonClient;
use crate::payload::{self, PayloadFile, PayloadSource};
use crate::verifier;

/// Runs one input against the daemon; failures are recorded, never raised
pub struct BenchmarkRunner {
    client: DaemonClient,
}

impl BenchmarkRunner {
    /// Create a runner that owns its own client
    pub fn new(client: DaemonClient) -> Self {
        Self { client }
    }

    /// Execute `input` once and describe what happened
    pub async fn run_once(&self, sequence: u64, input: &BenchInput) -> BenchmarkResult {
        let result = match input {
            BenchInput::Upload(source) => self.upload(sequence, source).await,
            BenchInput::Download(cid) => self.download(sequence, cid).await,
            BenchInput::Verify(case) => self.verify(sequence, case).await,
        };

        if let Some(err) = result.error() {
            tracing::warn!(
                sequence,
                operation = %result.operation,
                target = %input.label(),
                error_kind = err.kind(),
                error = %err,
                "Benchmark iteration failed"
            );
        }

        result
    }

    async fn upload(&self, sequence: u64, source: &PayloadSource) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            sequence,
            operation: Operation::Upload,
            cid: None,
            size_bytes: 0,
            sha256: None,
            elapsed: Duration::ZERO,
            outcome: Outcome::Success,
        };

        // The temp file lives until this iteration ends, even if it is abandoned
        let (filename, data, _spool) = match prepare_upload(source).await {
            Ok(prepared) => prepared,
            Err(e) => {
                if let PayloadSource::Generated(size) = source {
                    result.size_bytes = *size;
                }
                result.outcome = Outcome::Failed(e);
                return result;
            }
        };

        result.size_bytes = data.len() as u64;
        let digest = verifier::sha256_hex(&data);

        match self.client.upload(data, &filename).await {
            Ok((cid, elapsed)) => {
                result.cid = Some(cid);
                result.sha256 = Some(digest);
                result.elapsed = elapsed;
            }
            Err(e) => result.outcome = Outcome::Failed(e),
        }

        result
    }

    async fn download(&self, sequence: u64, cid: &str) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            sequence,
            operation: Operation::Download,
            cid: Some(cid.to_string()),
            size_bytes: 0,
            sha256: None,
            elapsed: Duration::ZERO,
            outcome: Outcome::Success,
        };

        match self.client.download(cid).await {
            Ok((data, elapsed)) => {
                result.size_bytes = data.len() as u64;
                result.elapsed = elapsed;
            }
            Err(e) => result.outcome = Outcome::Failed(e),
        }

        result
    }

    async fn verify(&self, sequence: u64, case: &TestCase) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            sequence,
            operation: Operation::Verify,
            cid: Some(case.cid.clone()),
            size_bytes: 0,
            sha256: None,
            elapsed: Duration::ZERO,
            outcome: Outcome::Success,
        };

        match self.client.download(&case.cid).await {
            Ok((data, elapsed)) => {
                result.size_bytes = data.len() as u64;
                result.elapsed = elapsed;

                if !verifier::verify(&data, &case.sha256) {
                    result.outcome = Outcome::Failed(BenchError::Integrity {
                        expected: case.sha256.clone(),
                        actual: verifier::sha256_hex(&data),
                    });
                }
            }
            Err(e) => result.outcome = Outcome::Failed(e),
        }

        result
    }
}

/// Resolve a payload source into (filename, bytes, temp file guard)
async fn prepare_upload(source: &PayloadSource) -> Result<(String, Bytes, Option<PayloadFile>)> {
    match source {
        PayloadSource::Generated(size) => {
            let size = *size;
            let file = tokio::task::spawn_blocking(move || PayloadFile::generate(size))
                .await
                .map_err(|e| BenchError::Io(format!("payload generation aborted: {}", e)))??;
            let data = file.read().await?;
            Ok((file.file_name(), data, Some(file)))
        }
        PayloadSource::File(path) => {
            let (filename, data) = payload::load_file(path).await?;
            Ok((filename, data, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{ADD_PATH, CAT_PATH};
    use mockito::Matcher;

    fn runner_for(server: &mockito::ServerGuard) -> BenchmarkRunner {
        BenchmarkRunner::new(DaemonClient::new(server.url(), Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn test_upload_success_records_cid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::UrlEncoded("pin".into(), "true".into()))
            .with_status(200)
            .with_body(r#"{"Hash":"abc123"}"#)
            .create_async()
            .await;

        let result = runner_for(&server)
            .run_once(0, &BenchInput::Upload(PayloadSource::Generated(10)))
            .await;

        assert_eq!(result.cid.as_deref(), Some("abc123"));
        assert_eq!(result.error_message(), None);
        assert_eq!(result.size_bytes, 10);
        assert!(result.sha256.is_some());
    }

    #[tokio::test]
    async fn test_upload_failure_records_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("disk full")
            .create_async()
            .await;

        let result = runner_for(&server)
            .run_once(7, &BenchInput::Upload(PayloadSource::Generated(10)))
            .await;

        assert!(result.error_message().unwrap().contains("disk full"));
        assert_eq!(result.cid, None);
        assert_eq!(result.sequence, 7);
    }

    #[tokio::test]
    async fn test_upload_missing_file_records_io_error() {
        let server = mockito::Server::new_async().await;
        let input = BenchInput::Upload(PayloadSource::File("/nonexistent/input.bin".into()));

        let result = runner_for(&server).run_once(0, &input).await;
        assert!(matches!(result.error(), Some(BenchError::Io(_))));
    }

    #[tokio::test]
    async fn test_verify_mismatch_records_integrity_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::UrlEncoded("arg".into(), "QmBad".into()))
            .with_status(200)
            .with_body("tampered content")
            .create_async()
            .await;

        let case = TestCase {
            cid: "QmBad".to_string(),
            sha256: format!("beadfeed{}", "0".repeat(56)),
        };
        let result = runner_for(&server).run_once(0, &BenchInput::Verify(case)).await;

        match result.error() {
            Some(BenchError::Integrity { expected, actual }) => {
                assert!(expected.starts_with("beadfeed"));
                assert_eq!(actual, &verifier::sha256_hex(b"tampered content"));
            }
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_match() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("original content")
            .create_async()
            .await;

        let case = TestCase {
            cid: "QmGood".to_string(),
            sha256: verifier::sha256_hex(b"original content"),
        };
        let result = runner_for(&server).run_once(0, &BenchInput::Verify(case)).await;
        assert!(result.is_success());
        assert_eq!(result.size_bytes, 16);
    }

    #[tokio::test]
    async fn test_download_records_size() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(vec![7u8; 2048])
            .create_async()
            .await;

        let result = runner_for(&server)
            .run_once(1, &BenchInput::Download("QmData".to_string()))
            .await;
        assert!(result.is_success());
        assert_eq!(result.size_bytes, 2048);
        assert_eq!(result.label(), "QmData");
    }
}
