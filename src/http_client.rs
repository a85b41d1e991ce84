use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::error::{BenchError, Result};
use crate::multipart::MultipartBuilder;

/// Path of the daemon's add endpoint
pub const ADD_PATH: &str = "/api/v0/add";

/// Path of the daemon's cat endpoint
pub const CAT_PATH: &str = "/api/v0/cat";

/// One record of the add endpoint's (possibly newline-delimited) JSON reply
#[derive(Debug, Clone, Deserialize)]
pub struct AddResponse {
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Size", default)]
    pub size: Option<String>,
}

impl AddResponse {
    /// Parse the add reply; the last record carrying a `Hash` wins
    pub fn parse(body: &str) -> Result<Self> {
        let mut last_error = None;
        let mut found = None;

        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<AddResponse>(line) {
                Ok(record) => found = Some(record),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        found.ok_or_else(|| {
            BenchError::ResponseParse(
                last_error.unwrap_or_else(|| "empty add response".to_string()),
            )
        })
    }
}

/// HTTP client for the storage daemon API, no retries
#[derive(Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

impl DaemonClient {
    /// Create a client for `base_url` (e.g. `http://localhost:5001`)
    ///
    /// `timeout` bounds connecting and each read, not the whole transfer, so
    /// a slow upload that keeps making progress is never cut off.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload `payload` as a pinned object, returning its identifier and the round-trip time
    pub async fn upload(&self, payload: Bytes, filename: &str) -> Result<(String, Duration)> {
        let url = format!("{}{}", self.base_url, ADD_PATH);
        let size = payload.len();
        let multipart = MultipartBuilder::new().file("file", filename, payload);
        let content_type = multipart.content_type();
        let body = multipart.finish();

        tracing::debug!(url = %url, filename, size, "Uploading payload");

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("pin", "true")])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| self.log_failure(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = error_body(response).await;
            tracing::warn!(status = %status, url = %url, response_body = %text, "Upload rejected");
            return Err(BenchError::status(status.as_u16(), text));
        }

        let text = response.text().await.map_err(|e| self.log_failure(&url, e))?;
        let elapsed = start.elapsed();

        let record = AddResponse::parse(&text)?;
        tracing::debug!(
            cid = %record.hash,
            elapsed_ms = elapsed.as_millis() as u64,
            "Upload complete"
        );
        Ok((record.hash, elapsed))
    }

    /// Fetch the object named by `cid`, returning its bytes and the round-trip time
    pub async fn download(&self, cid: &str) -> Result<(Bytes, Duration)> {
        let url = format!("{}{}", self.base_url, CAT_PATH);

        tracing::debug!(url = %url, cid, "Downloading object");

        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(|e| self.log_failure(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = error_body(response).await;
            tracing::warn!(status = %status, cid, response_body = %text, "Download rejected");
            return Err(BenchError::status(status.as_u16(), text));
        }

        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.log_failure(&url, e))?;
            buf.extend_from_slice(&chunk);
        }
        let elapsed = start.elapsed();

        tracing::debug!(
            cid,
            bytes = buf.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Download complete"
        );
        Ok((buf.freeze(), elapsed))
    }

    fn log_failure(&self, url: &str, e: reqwest::Error) -> BenchError {
        let err = BenchError::from(e);
        tracing::warn!(url = %url, error = %err, "HTTP request error");
        err
    }
}

/// Body of a rejected response, or a note on why it could not be read
async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => {
            let err = BenchError::from(e);
            tracing::warn!(error = %err, "Failed to read error response body");
            format!("<unreadable body: {}>", err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection: send `head`, then `body` a byte at a time with `gap` between bytes
    async fn trickle_server(head: String, body: &'static [u8], gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            for byte in body {
                tokio::time::sleep(gap).await;
                if socket.write_all(&[*byte]).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            // Hold the connection open so a short body is not seen as complete
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        format!("http://{}", addr)
    }

    fn client_for(server: &mockito::ServerGuard) -> DaemonClient {
        DaemonClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_single_record() {
        let record = AddResponse::parse(r#"{"Name":"a.bin","Hash":"QmAbc","Size":"10"}"#).unwrap();
        assert_eq!(record.hash, "QmAbc");
        assert_eq!(record.name.as_deref(), Some("a.bin"));
    }

    #[test]
    fn test_parse_ndjson_takes_last() {
        let body = "{\"Name\":\"a\",\"Hash\":\"QmFirst\"}\n{\"Name\":\"\",\"Hash\":\"QmWrap\"}\n";
        assert_eq!(AddResponse::parse(body).unwrap().hash, "QmWrap");
    }

    #[test]
    fn test_parse_missing_hash() {
        let err = AddResponse::parse(r#"{"Name":"a.bin"}"#).unwrap_err();
        assert!(matches!(err, BenchError::ResponseParse(_)));

        let err = AddResponse::parse("").unwrap_err();
        assert_eq!(err, BenchError::ResponseParse("empty add response".to_string()));
    }

    #[tokio::test]
    async fn test_upload_returns_hash() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::UrlEncoded("pin".into(), "true".into()))
            .match_header(
                "content-type",
                "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW",
            )
            .match_body(Matcher::Regex("filename=\"ten.bin\"".into()))
            .with_status(200)
            .with_body(r#"{"Hash":"abc123"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let (cid, _elapsed) = client
            .upload(Bytes::from_static(b"0123456789"), "ten.bin")
            .await
            .unwrap();

        assert_eq!(cid, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("disk full")
            .create_async()
            .await;

        let err = client_for(&server)
            .upload(Bytes::from_static(b"x"), "x.bin")
            .await
            .unwrap_err();

        match err {
            BenchError::Transport { status, message } => {
                assert_eq!(status, Some(500));
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_malformed_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", ADD_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Name":"x.bin"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .upload(Bytes::from_static(b"x"), "x.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ResponseParse(_)));
    }

    #[tokio::test]
    async fn test_download_returns_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::UrlEncoded("arg".into(), "QmXyz".into()))
            .with_status(200)
            .with_body("stored bytes")
            .create_async()
            .await;

        let (data, _elapsed) = client_for(&server).download("QmXyz").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"stored bytes"));
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", CAT_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("merkledag: not found")
            .create_async()
            .await;

        let err = client_for(&server).download("QmGone").await.unwrap_err();
        assert!(err.to_string().contains("merkledag: not found"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to obtain a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client =
            DaemonClient::new(format!("http://127.0.0.1:{}", port), Duration::from_secs(2)).unwrap();
        let err = client.download("QmAny").await.unwrap_err();
        assert!(matches!(err, BenchError::Transport { status: None, .. }));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = DaemonClient::new("http://localhost:5001/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5001");
    }

    #[tokio::test]
    async fn test_slow_transfer_outlives_timeout() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n".to_string();
        let url = trickle_server(head, b"abcdef", Duration::from_millis(300)).await;

        // 6 bytes at 300ms each takes well over the 1s timeout, but no single read stalls
        let client = DaemonClient::new(url, Duration::from_secs(1)).unwrap();
        let (data, elapsed) = client.download("QmSlow").await.unwrap();

        assert_eq!(data, Bytes::from_static(b"abcdef"));
        assert!(elapsed > Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stalled_transfer_times_out() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n".to_string();
        let url = trickle_server(head, b"ab", Duration::from_millis(50)).await;

        let client = DaemonClient::new(url, Duration::from_millis(500)).unwrap();
        let err = client.download("QmStalled").await.unwrap_err();
        assert!(matches!(err, BenchError::Transport { status: None, .. }));
    }

    #[tokio::test]
    async fn test_unreadable_error_body_is_reported() {
        // Promise 100 bytes, deliver 5, then stall until the read times out
        let head = "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\n".to_string();
        let url = trickle_server(head, b"disk ", Duration::from_millis(10)).await;

        let client = DaemonClient::new(url, Duration::from_millis(500)).unwrap();
        let err = client.download("QmBroken").await.unwrap_err();

        match err {
            BenchError::Transport { status, message } => {
                assert_eq!(status, Some(500));
                assert!(message.contains("unreadable body"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
