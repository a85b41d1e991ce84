//! Mock storage daemon implementing the add and cat endpoints in memory.

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::config::MockDaemonConfig;
use crate::http_client::{ADD_PATH, CAT_PATH};
use crate::verifier;

struct DaemonState {
    config: MockDaemonConfig,
    objects: Mutex<HashMap<String, Bytes>>,
}

/// In-process daemon stand-in for standalone runs and tests
pub struct MockDaemon {
    config: MockDaemonConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockDaemon {
    /// Create a new mock daemon with the given configuration
    pub fn new(config: MockDaemonConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock daemon and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let state = Arc::new(DaemonState {
            config: self.config.clone(),
            objects: Mutex::new(HashMap::new()),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route(ADD_PATH, post(handle_add))
            .route(CAT_PATH, get(handle_cat))
            .layer(axum::extract::DefaultBodyLimit::disable())
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::info!(port, "Mock daemon listening");
        Ok(port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop the mock daemon
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Content identifier derived from the object's digest
pub fn mock_cid(data: &[u8]) -> String {
    format!("Qm{}", &verifier::sha256_hex(data)[..44])
}

#[derive(Debug, Deserialize)]
struct AddParams {
    #[serde(default)]
    pin: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CatParams {
    arg: String,
}

async fn simulate(config: &MockDaemonConfig) -> Option<Response> {
    if config.latency_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(config.latency_ms)).await;
    }

    if config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < config.error_rate {
        return Some((StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response());
    }

    None
}

/// Handle add requests: store the first file part and answer with its hash
async fn handle_add(
    State(state): State<Arc<DaemonState>>,
    Query(params): Query<AddParams>,
    mut multipart: Multipart,
) -> Response {
    if let Some(response) = simulate(&state.config).await {
        return response;
    }

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, "file argument 'path' is required").into_response()
        }
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let name = field.file_name().unwrap_or_default().to_string();
    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let cid = mock_cid(&data);
    let size = data.len();
    if let Ok(mut objects) = state.objects.lock() {
        objects.insert(cid.clone(), data);
    }

    tracing::debug!(cid = %cid, size, pinned = params.pin.unwrap_or(false), "Mock daemon stored object");

    Json(serde_json::json!({
        "Name": name,
        "Hash": cid,
        "Size": size.to_string(),
    }))
    .into_response()
}

/// Handle cat requests: return stored bytes or a daemon-style error
async fn handle_cat(
    State(state): State<Arc<DaemonState>>,
    Query(params): Query<CatParams>,
) -> Response {
    if let Some(response) = simulate(&state.config).await {
        return response;
    }

    let object = state
        .objects
        .lock()
        .ok()
        .and_then(|objects| objects.get(&params.arg).cloned());

    match object {
        Some(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "Message": format!("{}: merkledag: not found", params.arg),
                "Code": 0,
                "Type": "error",
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::DaemonClient;
    use std::time::Duration;

    #[test]
    fn test_mock_cid_is_stable() {
        assert_eq!(mock_cid(b"abc"), mock_cid(b"abc"));
        assert_ne!(mock_cid(b"abc"), mock_cid(b"abd"));
        assert_eq!(mock_cid(b"abc").len(), 46);
    }

    #[tokio::test]
    async fn test_add_then_cat() {
        let mut daemon = MockDaemon::new(MockDaemonConfig::default());
        daemon.start().await.unwrap();

        let client = DaemonClient::new(daemon.url(), Duration::from_secs(5)).unwrap();
        let (cid, _) = client
            .upload(Bytes::from_static(b"hello daemon"), "hello.txt")
            .await
            .unwrap();
        assert_eq!(cid, mock_cid(b"hello daemon"));

        let (data, _) = client.download(&cid).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"hello daemon"));
    }

    #[tokio::test]
    async fn test_cat_unknown_object() {
        let mut daemon = MockDaemon::new(MockDaemonConfig::default());
        daemon.start().await.unwrap();

        let client = DaemonClient::new(daemon.url(), Duration::from_secs(5)).unwrap();
        let err = client.download("QmUnknown").await.unwrap_err();
        assert!(err.to_string().contains("merkledag: not found"));
    }

    #[tokio::test]
    async fn test_simulated_errors() {
        let mut daemon = MockDaemon::new(MockDaemonConfig {
            error_rate: 1.0,
            ..Default::default()
        });
        daemon.start().await.unwrap();

        let client = DaemonClient::new(daemon.url(), Duration::from_secs(5)).unwrap();
        let err = client
            .upload(Bytes::from_static(b"x"), "x.bin")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Simulated error"));
    }
}
