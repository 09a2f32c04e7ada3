//! Integration tests for the MCP client.
//!
//! Stdio tests drive the `mock-mcp-server` binary and are skipped when it has
//! not been built. HTTP tests stand up a local axum peer.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use quill_mcp::{
    CallOutcome, ClientOptions, Framing, McpClient, McpError, McpManager, McpServerConfig,
};
use serde_json::{Value, json};

/// Get the path to the mock MCP server binary.
fn mock_server_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // workspace root
    path.push("target");
    path.push(if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });
    path.push("mock-mcp-server");
    path
}

/// Check if the mock server binary exists.
fn mock_server_exists() -> bool {
    let exists = mock_server_path().exists();
    if !exists {
        eprintln!(
            "Skipping test: mock-mcp-server not built. Run `cargo build --package quill-mcp` first."
        );
    }
    exists
}

fn mock_config(name: &str) -> McpServerConfig {
    McpServerConfig::new(name, mock_server_path().to_string_lossy().to_string())
}

async fn bootstrapped(config: McpServerConfig, options: ClientOptions) -> quill_mcp::DynClient {
    let mut client = McpClient::connect(&config, options).expect("Failed to connect");
    client.bootstrap().await.expect("Failed to bootstrap");
    client
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_newline_framing() {
    if !mock_server_exists() {
        return;
    }

    let client = bootstrapped(mock_config("test"), ClientOptions::default()).await;
    let info = client.server_info().expect("server info");
    assert_eq!(info.name, "mock-mcp-server");
    assert_eq!(info.version.as_deref(), Some("1.0.0"));

    let names: Vec<&str> = client.available_tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["echo", "add", "query", "slow", "crash"]);
    assert_eq!(
        client.tool("echo").and_then(|t| t.description.as_deref()),
        Some("Echo back the input")
    );
}

#[tokio::test]
async fn test_content_length_framing() {
    if !mock_server_exists() {
        return;
    }

    let config = mock_config("framed")
        .with_args(vec!["--framing".into(), "content-length".into()])
        .with_framing(Framing::ContentLength);
    let mut client = bootstrapped(config, ClientOptions::default()).await;
    assert_eq!(client.available_tools().len(), 5);

    let outcome = client
        .call_tool("add", json!({"a": 2, "b": 40}))
        .await
        .unwrap();
    assert_eq!(outcome, CallOutcome::Text("42".into()));
}

#[tokio::test]
async fn test_call_echo_tool() {
    if !mock_server_exists() {
        return;
    }

    let mut client = bootstrapped(mock_config("test"), ClientOptions::default()).await;
    let outcome = client
        .call_tool("echo", json!({"message": "Hello, MCP!"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("Hello, MCP!"));
}

#[tokio::test]
async fn test_call_unknown_tool() {
    if !mock_server_exists() {
        return;
    }

    let mut client = bootstrapped(mock_config("test"), ClientOptions::default()).await;
    let outcome = client.call_tool("nonexistent", json!({})).await.unwrap();
    assert_eq!(
        outcome,
        CallOutcome::ToolError {
            message: "Unknown tool: nonexistent".into()
        }
    );
}

#[tokio::test]
async fn test_call_before_bootstrap_handshakes() {
    if !mock_server_exists() {
        return;
    }

    let mut client = McpClient::connect(&mock_config("test"), ClientOptions::default()).unwrap();
    assert!(!client.is_initialized());
    let outcome = client
        .call_tool("echo", json!({"message": "early"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("early"));
    assert!(client.is_initialized());
    assert!(client.available_tools().is_empty());
}

#[tokio::test]
async fn test_debug_dump_replies() {
    if !mock_server_exists() {
        return;
    }

    let config = mock_config("repr").with_arg("--repr-replies");
    let mut client = bootstrapped(config, ClientOptions::default()).await;
    assert_eq!(client.available_tools().len(), 5);

    let outcome = client
        .call_tool("echo", json!({"message": "None found"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("None found"));

    let outcome = client
        .call_tool("query", json!({"sql": "select 1"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("It's done: select 1"));

    let outcome = client
        .call_tool("query", json!({"sql": "select * from missing"}))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CallOutcome::ToolError {
            message: "relation \"missing\" does not exist".into()
        }
    );
}

#[tokio::test]
async fn test_timeout_then_stale_reply_discarded() {
    if !mock_server_exists() {
        return;
    }

    let options = ClientOptions::default().with_call_timeout(Some(Duration::from_millis(200)));
    let mut client = bootstrapped(mock_config("slow"), options).await;

    let err = client
        .call_tool("slow", json!({"delay_ms": 600}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ResponseTimeout { .. }));

    // Let the abandoned reply land in the pipe ahead of the next one.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let outcome = client
        .call_tool("echo", json!({"message": "after"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("after"));
}

#[tokio::test]
async fn test_server_crash_detection() {
    if !mock_server_exists() {
        return;
    }

    let mut client = bootstrapped(mock_config("crashy"), ClientOptions::default()).await;
    let err = client.call_tool("crash", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ConnectionClosed));
    assert!(!err.is_call_scoped());
}

#[tokio::test]
async fn test_manager_multiple_servers() {
    if !mock_server_exists() {
        return;
    }

    let mut manager = McpManager::new(ClientOptions::default());
    manager.add_server(mock_config("one"));
    manager.add_server(mock_config("two").with_arg("--repr-replies"));
    manager.add_server(McpServerConfig::new("broken", "nonexistent-command-12345"));

    let summary = manager.connect_all().await;
    assert_eq!(summary.connected, ["one", "two"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(manager.tool_count(), 10);

    let outcome = manager
        .call_tool("two", "echo", json!({"message": "via manager"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("via manager"));

    assert!(manager.shutdown_server("one").await);
    assert_eq!(manager.connected_server_names(), ["two"]);
    manager.shutdown_all().await;
    assert_eq!(manager.connected_count(), 0);
    assert_eq!(manager.config_count(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Streamable HTTP
// ─────────────────────────────────────────────────────────────────────────────

const SESSION: &str = "sess-42";

#[derive(Default)]
struct HttpPeer {
    /// When set, replies use SSE bodies.
    sse: bool,
    /// Session header seen on each request, by method.
    seen: Mutex<Vec<(String, Option<String>)>>,
}

fn reply_for(method: &str, id: &Value, params: &Value) -> Value {
    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "http-peer", "version": "0.2.0"},
            "capabilities": {}
        }),
        "tools/list" => json!({"tools": [{"name": "echo", "inputSchema": {
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        }}]}),
        _ => json!({"content": [{"type": "text", "text": params["arguments"]["message"]}]}),
    };
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

async fn handle(
    State(peer): State<Arc<HttpPeer>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let method = body["method"].as_str().unwrap_or_default().to_string();
    let session = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    peer.seen.lock().unwrap().push((method.clone(), session));

    let Some(id) = body.get("id") else {
        return StatusCode::ACCEPTED.into_response();
    };
    if method == "tools/call" && body["params"]["name"] == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if method == "tools/call" && body["params"]["name"] == "stall" {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    if method == "tools/call" && body["params"]["name"] == "drip" {
        // Headers go out at once; the body follows later.
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": {
            "content": [{"type": "text", "text": "too late"}]
        }})
        .to_string();
        let body = futures::stream::once(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, std::convert::Infallible>(reply)
        });
        return (
            [(header::CONTENT_TYPE, "application/json")],
            axum::body::Body::from_stream(body),
        )
            .into_response();
    }

    let reply = reply_for(&method, id, &body["params"]).to_string();
    let session_header = HeaderName::from_static("mcp-session-id");
    if peer.sse {
        let body = format!(
            ": keepalive\n\nevent: message\ndata: {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}}\n\nevent: message\ndata: {reply}\n\n"
        );
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (session_header, SESSION),
            ],
            body,
        )
            .into_response()
    } else {
        (
            [
                (header::CONTENT_TYPE, "application/json"),
                (session_header, SESSION),
            ],
            reply,
        )
            .into_response()
    }
}

async fn spawn_http_peer(sse: bool) -> (String, Arc<HttpPeer>) {
    let peer = Arc::new(HttpPeer {
        sse,
        ..Default::default()
    });
    let app = Router::new()
        .route("/mcp", post(handle))
        .with_state(peer.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/mcp"), peer)
}

async fn http_round_trip(sse: bool) {
    let (url, peer) = spawn_http_peer(sse).await;
    let config = McpServerConfig::http("remote", url).with_timeout(Duration::from_secs(5));
    let mut client = bootstrapped(config, ClientOptions::default()).await;

    assert_eq!(client.server_info().map(|s| s.name.as_str()), Some("http-peer"));
    assert_eq!(client.available_tools().len(), 1);

    let outcome = client
        .call_tool("echo", json!({"message": "over http"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("over http"));

    let seen = peer.seen.lock().unwrap().clone();
    let methods: Vec<&str> = seen.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(
        methods,
        ["initialize", "notifications/initialized", "tools/list", "tools/call"]
    );
    assert_eq!(seen[0].1, None);
    assert!(seen[1..].iter().all(|(_, s)| s.as_deref() == Some(SESSION)));
}

#[tokio::test]
async fn test_http_json_bodies() {
    http_round_trip(false).await;
}

#[tokio::test]
async fn test_http_sse_bodies() {
    http_round_trip(true).await;
}

#[tokio::test]
async fn test_http_error_status_is_peer_fault() {
    let (url, _peer) = spawn_http_peer(false).await;
    let config = McpServerConfig::http("remote", url);
    let mut client = bootstrapped(config, ClientOptions::default()).await;

    let err = client.call_tool("explode", json!({})).await.unwrap_err();
    match err {
        McpError::PeerFault(fault) => {
            assert!(fault.message.contains("500"));
            assert_eq!(fault.detail.as_deref(), Some("boom"));
        }
        other => panic!("expected peer fault, got {other:?}"),
    }

    // The session survives a faulted call.
    let outcome = client
        .call_tool("echo", json!({"message": "still here"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("still here"));
}

#[tokio::test]
async fn test_http_request_timeout_is_not_resent() {
    let (url, peer) = spawn_http_peer(false).await;
    let config = McpServerConfig::http("remote", url)
        .with_timeout(Duration::from_millis(500))
        .with_retries(3);
    let mut client = bootstrapped(config, ClientOptions::default()).await;

    let err = client.call_tool("stall", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::TransportWrite(_)));

    let seen = peer.seen.lock().unwrap().clone();
    let calls = seen.iter().filter(|(m, _)| m == "tools/call").count();
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn test_http_slow_body_is_bounded_by_reply_wait() {
    let (url, _peer) = spawn_http_peer(false).await;
    let config = McpServerConfig::http("remote", url).with_timeout(Duration::from_secs(30));
    let options = ClientOptions::default().with_call_timeout(Some(Duration::from_millis(300)));
    let mut client = bootstrapped(config, options).await;

    let started = std::time::Instant::now();
    let err = client.call_tool("drip", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ResponseTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));

    // The late body is discarded once it lands.
    let outcome = client
        .call_tool("echo", json!({"message": "after drip"}))
        .await
        .unwrap();
    assert_eq!(outcome.text(), Some("after drip"));
}

#[tokio::test]
async fn test_http_unreachable_is_write_failure() {
    let config = McpServerConfig::http("remote", "http://127.0.0.1:9/mcp").with_retries(0);
    let mut client = McpClient::connect(&config, ClientOptions::default()).unwrap();
    let err = client.bootstrap().await.unwrap_err();
    assert!(matches!(err, McpError::TransportWrite(_)));
}
