//! Load driver: repeats the runner over a fixed input list or for a wall-clock duration.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::config::{RunConfig, Workload};
use super::metrics::MetricsCollector;
use super::result::{BenchInput, BenchmarkResult};
use super::runner::BenchmarkRunner;
use crate::error::{BenchError, Result};
use crate::http_client::DaemonClient;
use crate::payload::PayloadSource;

/// Everything a run recorded, in the order it was recorded
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub results: Vec<BenchmarkResult>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Stopped early by the shutdown signal
    pub interrupted: bool,
}

/// Drives benchmark runners against one daemon endpoint
pub struct LoadDriver {
    base_url: String,
    timeout: Duration,
    show_progress: bool,
}

impl LoadDriver {
    /// Create a driver for `base_url`; every network call is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            show_progress: true,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.base_url(), config.timeout)
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run the workload described by `config` until done or `shutdown` resolves
    pub async fn run<F>(&self, config: &RunConfig, shutdown: F) -> Result<BenchmarkRun>
    where
        F: Future<Output = ()>,
    {
        match &config.workload {
            Workload::Sizes { sources, .. } => {
                let inputs: Vec<BenchInput> =
                    sources.iter().cloned().map(BenchInput::Upload).collect();
                self.run_fixed(&inputs, shutdown).await
            }
            Workload::Sustained {
                duration,
                payload_size,
                concurrency,
                ..
            } => {
                let input = BenchInput::Upload(PayloadSource::Generated(*payload_size));
                self.run_for(input, *duration, *concurrency, shutdown).await
            }
            Workload::Verify { cases } => {
                let inputs: Vec<BenchInput> =
                    cases.iter().cloned().map(BenchInput::Verify).collect();
                self.run_fixed(&inputs, shutdown).await
            }
            Workload::Download { cids } => {
                let inputs: Vec<BenchInput> =
                    cids.iter().cloned().map(BenchInput::Download).collect();
                self.run_fixed(&inputs, shutdown).await
            }
        }
    }

    /// Run each input once, sequentially and in order
    pub async fn run_fixed<F>(&self, inputs: &[BenchInput], shutdown: F) -> Result<BenchmarkRun>
    where
        F: Future<Output = ()>,
    {
        let runner = self.runner()?;
        let progress = self.fixed_bar(inputs.len() as u64);

        tracing::info!(inputs = inputs.len(), url = %self.base_url, "Starting fixed-set run");

        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(inputs.len());
        let mut interrupted = false;

        tokio::pin!(shutdown);

        for (index, input) in inputs.iter().enumerate() {
            progress.set_message(format!("{} {}", input.operation(), input.label()));

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
                result = runner.run_once(index as u64, input) => {
                    results.push(result);
                }
            }

            progress.inc(1);
        }

        finish_bar(&progress, interrupted);
        let elapsed = start.elapsed();

        tracing::info!(
            recorded = results.len(),
            interrupted,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fixed-set run finished"
        );

        Ok(BenchmarkRun {
            results,
            started_at,
            elapsed,
            interrupted,
        })
    }

    /// Repeat `input` on `concurrency` workers until `duration` elapses.
    ///
    /// No iteration starts once the deadline has passed; an iteration already
    /// in flight at the deadline runs to completion and is recorded. When
    /// `shutdown` resolves, in-flight iterations are abandoned instead.
    pub async fn run_for<F>(
        &self,
        input: BenchInput,
        duration: Duration,
        concurrency: usize,
        shutdown: F,
    ) -> Result<BenchmarkRun>
    where
        F: Future<Output = ()>,
    {
        if concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        // Each worker owns its own client and connection pool
        let runners = (0..concurrency)
            .map(|_| self.runner())
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            duration_secs = duration.as_secs_f64(),
            concurrency,
            input = %input.label(),
            url = %self.base_url,
            "Starting sustained run"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + duration;
        let metrics = Arc::new(MetricsCollector::new());
        metrics.start();

        let sequence = Arc::new(AtomicU64::new(0));
        let input = Arc::new(input);
        let (tx, mut rx) = mpsc::unbounded_channel::<BenchmarkResult>();
        let mut workers = JoinSet::new();

        for (worker, runner) in runners.into_iter().enumerate() {
            let tx = tx.clone();
            let sequence = sequence.clone();
            let input = input.clone();

            workers.spawn(async move {
                while Instant::now() < deadline {
                    let n = sequence.fetch_add(1, Ordering::Relaxed);
                    let result = runner.run_once(n, &input).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker, "Worker reached deadline");
            });
        }
        drop(tx);

        let progress = self.duration_bar(duration);
        let ticker = spawn_ticker(progress.clone(), metrics.clone(), start, duration);

        let mut results = Vec::new();
        let mut interrupted = false;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    workers.abort_all();
                    break;
                }
                received = rx.recv() => match received {
                    Some(result) => {
                        metrics.record(&result);
                        results.push(result);
                    }
                    None => break,
                }
            }
        }

        // Results that were sent before the abort still count
        while let Ok(result) = rx.try_recv() {
            metrics.record(&result);
            results.push(result);
        }

        // Reap aborted workers so abandoned iterations release their temp files
        while workers.join_next().await.is_some() {}

        ticker.abort();
        metrics.stop();
        progress.set_message(progress_message(&metrics));
        finish_bar(&progress, interrupted);

        let elapsed = start.elapsed();
        tracing::info!(
            recorded = results.len(),
            succeeded = metrics.success_count(),
            failed = metrics.error_count(),
            interrupted,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sustained run finished"
        );

        Ok(BenchmarkRun {
            results,
            started_at,
            elapsed,
            interrupted,
        })
    }

    fn runner(&self) -> Result<BenchmarkRunner> {
        let client = DaemonClient::new(self.base_url.clone(), self.timeout)?;
        Ok(BenchmarkRunner::new(client))
    }

    fn fixed_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar
    }

    fn duration_bar(&self, duration: Duration) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(duration.as_secs().max(1));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar
    }
}

fn spawn_ticker(
    progress: ProgressBar,
    metrics: Arc<MetricsCollector>,
    start: Instant,
    duration: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            interval.tick().await;
            let elapsed = start.elapsed().min(duration).as_secs();
            progress.set_position(elapsed);
            progress.set_message(progress_message(&metrics));
        }
    })
}

fn progress_message(metrics: &MetricsCollector) -> String {
    format!(
        "ok: {} failed: {}",
        metrics.success_count(),
        metrics.error_count()
    )
}

fn finish_bar(progress: &ProgressBar, interrupted: bool) {
    if interrupted {
        progress.abandon_with_message("interrupted");
    } else {
        progress.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{ADD_PATH, CAT_PATH};
    use mockito::Matcher;

    async fn daemon_stub() -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Hash":"QmStub"}"#)
            .create_async()
            .await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::UrlEncoded("arg".into(), "QmMissing".into()))
            .with_status(500)
            .with_body("merkledag: not found")
            .create_async()
            .await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::Regex("arg=Qm[AC]$".into()))
            .with_status(200)
            .with_body("data")
            .create_async()
            .await;
        server
    }

    fn driver_for(server: &mockito::ServerGuard) -> LoadDriver {
        LoadDriver::new(server.url(), Duration::from_secs(5)).with_progress(false)
    }

    #[tokio::test]
    async fn test_fixed_set_preserves_order_and_count() {
        let server = daemon_stub().await;
        let inputs = vec![
            BenchInput::Download("QmA".to_string()),
            BenchInput::Download("QmMissing".to_string()),
            BenchInput::Download("QmC".to_string()),
        ];

        let run = driver_for(&server)
            .run_fixed(&inputs, std::future::pending())
            .await
            .unwrap();

        assert!(!run.interrupted);
        assert_eq!(run.results.len(), inputs.len());
        let labels: Vec<String> = run.results.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["QmA", "QmMissing", "QmC"]);
        assert!(run.results[0].is_success());
        assert!(!run.results[1].is_success());
        assert!(run.results[2].is_success());
    }

    #[tokio::test]
    async fn test_fixed_set_stops_on_shutdown() {
        let server = daemon_stub().await;
        let inputs = vec![BenchInput::Download("QmA".to_string()); 5];

        let run = driver_for(&server)
            .run_fixed(&inputs, std::future::ready(()))
            .await
            .unwrap();

        assert!(run.interrupted);
        assert!(run.results.is_empty());
    }

    #[tokio::test]
    async fn test_duration_mode_respects_deadline() {
        let server = daemon_stub().await;
        let input = BenchInput::Upload(PayloadSource::Generated(1024));
        let duration = Duration::from_millis(300);

        let run = driver_for(&server)
            .run_for(input, duration, 2, std::future::pending())
            .await
            .unwrap();

        assert!(!run.interrupted);
        assert!(!run.results.is_empty());
        assert!(run.results.iter().all(|r| r.is_success()));
        assert!(run.elapsed >= duration);

        // Every attempt was recorded exactly once
        let mut sequences: Vec<u64> = run.results.iter().map(|r| r.sequence).collect();
        sequences.sort_unstable();
        let expected: Vec<u64> = (0..run.results.len() as u64).collect();
        assert_eq!(sequences, expected);
    }

    #[tokio::test]
    async fn test_duration_mode_rejects_zero_concurrency() {
        let server = daemon_stub().await;
        let input = BenchInput::Download("QmA".to_string());

        let err = driver_for(&server)
            .run_for(input, Duration::from_millis(10), 0, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[tokio::test]
    async fn test_duration_mode_interrupt_keeps_results() {
        let server = daemon_stub().await;
        let input = BenchInput::Download("QmA".to_string());

        let run = driver_for(&server)
            .run_for(
                input,
                Duration::from_secs(30),
                1,
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert!(run.interrupted);
        assert!(run.elapsed < Duration::from_secs(30));
        assert!(run.results.iter().all(|r| r.is_success()));
    }
}
