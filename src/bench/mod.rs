//! Benchmark module for content-addressed storage daemons.
//!
//! This module provides:
//! - Benchmark runner executing one upload, download or verification
//! - Load driver for fixed input lists and sustained, duration-bound load
//! - HdrHistogram-based metrics collection
//! - Report generation (table, CSV, JSON)
//! - Mock daemon for standalone runs

pub mod config;
pub mod driver;
pub mod metrics;
pub mod mock_server;
pub mod report;
pub mod result;
pub mod runner;

pub use config::{MockDaemonConfig, Mode, RunConfig, Workload};
pub use driver::{BenchmarkRun, LoadDriver};
pub use metrics::MetricsCollector;
pub use mock_server::MockDaemon;
pub use report::BenchmarkReport;
pub use result::{BenchInput, BenchmarkResult, Operation, Outcome, TestCase};
pub use runner::BenchmarkRunner;
