//! Pre-run probes for the external daemon.

use tokio::process::Command;

use crate::error::{BenchError, Result};

/// Fail unless a container called `name` is listed by `docker ps`
pub async fn ensure_container_running(name: &str) -> Result<()> {
    tracing::info!(container = name, "Checking daemon container");

    let output = Command::new("docker")
        .args([
            "ps",
            "--filter",
            &format!("name={}", name),
            "--format",
            "{{.Names}}",
        ])
        .output()
        .await
        .map_err(|e| BenchError::Precondition(format!("could not run docker: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::Precondition(format!(
            "docker ps failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if container_listed(&stdout, name) {
        tracing::info!(container = name, "Daemon container is running");
        Ok(())
    } else {
        Err(BenchError::Precondition(format!(
            "container '{}' is not running",
            name
        )))
    }
}

/// Whether `docker ps --format {{.Names}}` output lists exactly `name`
pub fn container_listed(ps_output: &str, name: &str) -> bool {
    ps_output.lines().any(|line| line.trim() == name)
}
