//! Metrics collection using HdrHistogram for accurate percentile calculations.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::result::BenchmarkResult;
use crate::payload::MIB;

/// Thread-safe aggregate of recorded benchmark results
pub struct MetricsCollector {
    /// Histogram for operation latency (microseconds)
    latency_histogram: Mutex<Histogram<u64>>,
    /// Total successful operations
    success_count: AtomicU64,
    /// Total failed operations
    error_count: AtomicU64,
    /// Payload bytes moved by successful operations
    bytes_transferred: AtomicU64,
    /// Start time of the run
    start_time: Mutex<Option<Instant>>,
    /// End time of the run
    end_time: Mutex<Option<Instant>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            // Histogram for latencies up to one hour with 3 significant figures
            latency_histogram: Mutex::new(
                Histogram::new_with_bounds(1, 3_600_000_000, 3).expect("valid histogram bounds"),
            ),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
        }
    }

    /// Build a collector over an already finished result list
    pub fn from_results(results: &[BenchmarkResult], elapsed: Duration) -> Self {
        let collector = Self::new();
        for result in results {
            collector.record(result);
        }
        let end = Instant::now();
        if let Ok(mut start) = collector.start_time.lock() {
            *start = Some(end.checked_sub(elapsed).unwrap_or(end));
        }
        if let Ok(mut stop) = collector.end_time.lock() {
            *stop = Some(end);
        }
        collector
    }

    /// Mark the start of the run
    pub fn start(&self) {
        if let Ok(mut start) = self.start_time.lock() {
            *start = Some(Instant::now());
        }
    }

    /// Mark the end of the run
    pub fn stop(&self) {
        if let Ok(mut end) = self.end_time.lock() {
            *end = Some(Instant::now());
        }
    }

    /// Fold one result into the aggregates
    pub fn record(&self, result: &BenchmarkResult) {
        if result.is_success() {
            self.record_success(result.elapsed, result.size_bytes);
        } else {
            self.record_error();
        }
    }

    /// Record a successful operation
    pub fn record_success(&self, latency: Duration, bytes: u64) {
        let latency_us = latency.as_micros() as u64;
        if let Ok(mut hist) = self.latency_histogram.lock() {
            hist.saturating_record(latency_us.max(1));
        }

        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed operation
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn total_operations(&self) -> u64 {
        self.success_count() + self.error_count()
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            return 100.0;
        }
        (self.success_count() as f64 / total as f64) * 100.0
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        let start = self.start_time.lock().ok().and_then(|s| *s);
        let end = self.end_time.lock().ok().and_then(|e| *e);
        match (start, end) {
            (Some(s), Some(e)) => e.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Successful operations per second of wall clock
    pub fn operations_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.success_count() as f64 / elapsed
    }

    /// Get latency percentile in milliseconds
    pub fn latency_percentile(&self, percentile: f64) -> f64 {
        self.latency_histogram
            .lock()
            .map(|hist| hist.value_at_percentile(percentile) as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Aggregate MB/s over the run's wall clock
    pub fn throughput_mb_s(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_transferred() as f64 / MIB as f64 / elapsed
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success_count: self.success_count(),
            error_count: self.error_count(),
            success_rate: self.success_rate(),
            operations_per_second: self.operations_per_second(),
            latency_p50: self.latency_percentile(50.0),
            latency_p95: self.latency_percentile(95.0),
            latency_p99: self.latency_percentile(99.0),
            bytes_transferred: self.bytes_transferred(),
            throughput_mb_s: self.throughput_mb_s(),
            elapsed_secs: self.elapsed().as_secs_f64(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub operations_per_second: f64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub bytes_transferred: u64,
    pub throughput_mb_s: f64,
    pub elapsed_secs: f64,
}
