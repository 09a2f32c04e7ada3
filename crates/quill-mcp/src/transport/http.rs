use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::Envelope;
use crate::transport::{Transport, frame_to_inbound};
use crate::wire::{Inbound, PeerFault};

/// Session header assigned by streamable-HTTP servers.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Configuration for HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint URL of the MCP server.
    pub url: String,
    /// Per-request timeout. Covers the whole body, SSE streams included.
    pub timeout: Duration,
    /// Number of retries when the connection cannot be established.
    /// Requests that reached the server are never repeated.
    pub retries: u32,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            retries: 3,
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Streamable-HTTP transport.
///
/// Every envelope is one POST. Whatever comes back (a JSON body, a stream of
/// SSE events, or an error status) is queued for [`Transport::receive`].
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    session_id: Option<String>,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: mpsc::UnboundedReceiver<Inbound>,
    streams: Vec<JoinHandle<()>>,
    closed: bool,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn connect(config: HttpTransportConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .map_err(|e| McpError::invalid_config(format!("invalid URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            url = %config.url,
            timeout_secs = config.timeout.as_secs(),
            "created HTTP transport"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            client,
            config,
            session_id: None,
            tx,
            rx,
            streams: Vec::new(),
            closed: false,
        })
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn post(&self, body: String) -> Result<reqwest::Response> {
        let mut retries = self.config.retries;
        loop {
            let mut req = self
                .client
                .post(&self.config.url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, ACCEPT_BOTH)
                .body(body.clone());
            for (key, value) in &self.config.headers {
                req = req.header(key, value);
            }
            if let Some(id) = &self.session_id {
                req = req.header(SESSION_HEADER, id);
            }

            match req.send().await {
                Ok(resp) => return Ok(resp),
                // Only a request that never reached the server is safe to repeat.
                Err(e) if retries == 0 || !e.is_connect() => {
                    return Err(McpError::transport_write(format!("HTTP request failed: {}", e)));
                }
                Err(e) => {
                    retries -= 1;
                    tracing::warn!(
                        error = %e,
                        retries_remaining = retries,
                        "HTTP request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn remember_session(&mut self, headers: &HeaderMap) {
        let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
            return;
        };
        if self.session_id.as_deref() != Some(id) {
            tracing::debug!(session_id = id, "MCP HTTP session assigned");
            self.session_id = Some(id.to_string());
        }
    }

    /// Read the reply body off the request path.
    ///
    /// The body lands in the queue when it is complete, so a slow body is
    /// bounded by the caller's reply wait rather than by `send`.
    fn spawn_reply_reader(&mut self, resp: reqwest::Response, method: String, id: Option<String>) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                tracing::debug!(%status, method = %method, "MCP HTTP request rejected");
                let fault = PeerFault::new(format!("HTTP error {}", status))
                    .with_detail(body)
                    .for_request(id);
                let _ = tx.send(fault.into());
                return;
            }

            let is_stream = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with("text/event-stream"));
            if is_stream {
                read_event_stream(resp, id, tx).await;
                return;
            }

            match resp.text().await {
                Ok(text) if text.trim().is_empty() => {
                    if id.is_some() {
                        tracing::debug!(method = %method, "empty HTTP reply body");
                    }
                }
                Ok(text) => {
                    tracing::trace!(json = %text, "received MCP HTTP response");
                    let _ = tx.send(frame_to_inbound(text.trim()));
                }
                Err(e) => {
                    let fault = PeerFault::new(format!("failed to read response body: {}", e))
                        .for_request(id);
                    let _ = tx.send(fault.into());
                }
            }
        });
        self.streams.retain(|h| !h.is_finished());
        self.streams.push(handle);
    }
}

async fn read_event_stream(
    resp: reqwest::Response,
    id: Option<String>,
    tx: mpsc::UnboundedSender<Inbound>,
) {
    let mut events = SseBuffer::default();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for data in events.push(&bytes) {
                    tracing::trace!(frame = %data, "received MCP SSE event");
                    if tx.send(frame_to_inbound(&data)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let fault = PeerFault::new(format!("SSE stream failed: {}", e)).for_request(id);
                let _ = tx.send(fault.into());
                return;
            }
        }
    }
    if let Some(data) = events.finish() {
        let _ = tx.send(frame_to_inbound(&data));
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        if self.closed {
            return Err(McpError::transport_write("transport closed"));
        }
        let json = serde_json::to_string(envelope)?;
        tracing::trace!(url = %self.config.url, json = %json, "sending MCP HTTP request");

        let resp = self.post(json).await?;
        self.remember_session(resp.headers());
        self.spawn_reply_reader(resp, envelope.method.clone(), envelope.id.clone());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Inbound> {
        if self.closed {
            return Err(McpError::ConnectionClosed);
        }
        self.rx.recv().await.ok_or(McpError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        for handle in self.streams.drain(..) {
            handle.abort();
        }
        self.rx.close();
        Ok(())
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        for handle in &self.streams {
            handle.abort();
        }
    }
}

/// Incremental `text/event-stream` reader that yields `data` payloads.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseBuffer {
    /// Feed bytes; returns every event completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }

    /// Flush an event left open when the stream ended.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let mut tail = std::mem::take(&mut self.pending);
            tail.push(b'\n');
            self.push(&tail);
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_config() {
        let config = HttpTransportConfig::new("http://localhost:8080/mcp")
            .with_timeout(Duration::from_secs(60))
            .with_retries(5)
            .with_header("Authorization", "Bearer token123");

        assert_eq!(config.url, "http://localhost:8080/mcp");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retries, 5);
        assert_eq!(
            config.headers[0],
            ("Authorization".to_string(), "Bearer token123".to_string())
        );
    }

    #[test]
    fn test_http_transport_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert!(config.headers.is_empty());
    }

    #[tokio::test]
    async fn test_http_transport_invalid_url() {
        let result = HttpTransport::connect(HttpTransportConfig::new("not a valid url"));
        match result {
            Err(McpError::InvalidConfig(msg)) => assert!(msg.contains("invalid URL")),
            _ => panic!("Expected InvalidConfig error"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_write_failure() {
        let config = HttpTransportConfig::new("http://127.0.0.1:9/mcp").with_retries(0);
        let mut transport = HttpTransport::connect(config).unwrap();
        assert!(transport.session_id().is_none());
        let err = transport
            .send(&Envelope::request("1", "initialize", None))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::TransportWrite(_)));
    }

    #[test]
    fn test_sse_events_across_chunks() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"event: message\ndata: {\"id\":").is_empty());
        let events = sse.push(b"\"1\"}\n\n: keepalive\n\ndata: second\r\n\r\n");
        assert_eq!(events, vec![r#"{"id":"1"}"#.to_string(), "second".to_string()]);
    }

    #[test]
    fn test_sse_multiline_data_and_unterminated_tail() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"data: a\ndata: b\n").is_empty());
        assert_eq!(sse.finish().as_deref(), Some("a\nb"));

        let mut sse = SseBuffer::default();
        sse.push(b"data: tail");
        assert_eq!(sse.finish().as_deref(), Some("tail"));
        assert_eq!(sse.finish(), None);
    }

    #[test]
    fn test_sse_split_multibyte() {
        let mut sse = SseBuffer::default();
        let text = "data: héllo\n\n".as_bytes();
        let (a, b) = text.split_at(8);
        assert!(sse.push(a).is_empty());
        assert_eq!(sse.push(b), vec!["héllo".to_string()]);
    }
}
