use anyhow::{Context, Result};

use cas_bench::bench::{BenchmarkReport, LoadDriver, MockDaemon, MockDaemonConfig, Workload};
use cas_bench::config::Config;
use cas_bench::precondition;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let mut config = Config::load()?;

    // Initialize logging with a configured level; stdout is reserved for the report
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    config.validate().context("Invalid configuration")?;

    let mode = config.run.mode();
    tracing::info!("Starting {} benchmark", mode);

    // Keep the mock daemon alive for the whole run
    let _mock = if config.standalone {
        let mut daemon = MockDaemon::new(MockDaemonConfig::default());
        let port = daemon
            .start()
            .await
            .context("Failed to start mock daemon")?;
        config.run.host = "127.0.0.1".to_string();
        config.run.port = port;
        Some(daemon)
    } else {
        None
    };

    if let Some(container) = &config.container {
        precondition::ensure_container_running(container)
            .await
            .context("Daemon precondition check failed")?;
    }

    tracing::info!(
        "Daemon configured: {} (timeout {}s)",
        config.run.base_url(),
        config.run.timeout.as_secs()
    );

    let driver = LoadDriver::from_config(&config.run).with_progress(config.progress);
    let run = driver.run(&config.run, shutdown_signal()).await?;

    let report = BenchmarkReport::from_run(mode, &run);
    if config.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }

    match &config.run.workload {
        Workload::Sizes {
            export,
            cases_export,
            ..
        } => {
            report.write_csv(export)?;
            println!("\nResults saved to {}", export.display());
            if let Some(path) = cases_export {
                report.write_test_cases(path)?;
                println!("Test cases saved to {}", path.display());
            }
        }
        Workload::Sustained {
            export: Some(export),
            ..
        } => {
            report.write_csv(export)?;
            println!("\nResults saved to {}", export.display());
        }
        _ => {}
    }

    if run.interrupted {
        tracing::warn!("Benchmark interrupted");
    }

    Ok(())
}

/// Resolves on Ctrl-C (or SIGTERM on unix)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, stopping benchmark...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping benchmark...");
        },
    }
}
