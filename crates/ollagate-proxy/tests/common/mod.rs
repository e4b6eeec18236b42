//! Shared fixtures: a mock Ollama upstream and a gateway bound to ephemeral ports.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use ollagate_core::{AuthConfig, Config, MemoryAccessLog, ServiceConfig};
use ollagate_proxy::{GatewayContext, serve};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const GENERATE_TOKEN: &str = "gen-token-123";
pub const MODEL_TOKEN: &str = "admin-token-456";

/// A request as received by the mock upstream.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SeenRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

pub struct MockUpstream {
    pub base_url: String,
    pub seen: Seen,
    cancel: CancellationToken,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct TestGateway {
    pub base_url: String,
    pub access_log: Arc<MemoryAccessLog>,
    cancel: CancellationToken,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ndjson(lines: &[Value]) -> Response {
    let mut body = String::new();
    for line in lines {
        body.push_str(&line.to_string());
        body.push('\n');
    }
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

fn json_response(status: StatusCode, value: Value) -> Response {
    (status, axum::Json(value)).into_response()
}

async fn upstream_handler(
    State(seen): State<Seen>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = SeenRequest {
        method,
        path: uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string),
        headers,
        body,
    };
    let parsed = request.json();
    seen.lock().unwrap().push(request.clone());

    let streaming = parsed["stream"] == Value::Bool(true);
    match uri.path() {
        "/api/chat" if parsed["model"] == "missing" => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "model 'missing' not found"}),
        ),
        "/api/chat" if streaming => ndjson(&[
            json!({"model": parsed["model"], "message": {"role": "assistant", "content": "Hel"}, "done": false}),
            json!({"model": parsed["model"], "message": {"role": "assistant", "content": "lo"}, "done": false}),
            json!({"model": parsed["model"], "message": {"role": "assistant", "content": ""}, "done": true, "eval_count": 2}),
        ]),
        "/api/chat" => json_response(
            StatusCode::OK,
            json!({
                "model": parsed["model"],
                "message": {"role": "assistant", "content": "hi"},
                "done": true,
                "prompt_eval_count": 3,
                "eval_count": 2
            }),
        ),
        "/api/generate" if streaming => ndjson(&[
            json!({"response": "once ", "done": false}),
            json!({"response": "upon", "done": true}),
        ]),
        "/api/generate" => json_response(
            StatusCode::OK,
            json!({"response": "once upon", "done": true, "prompt_eval_count": 1, "eval_count": 2}),
        ),
        "/api/embed" => json_response(
            StatusCode::OK,
            json!({"embeddings": [[0.5, 1, -2]], "prompt_eval_count": 4}),
        ),
        "/api/tags" => json_response(
            StatusCode::OK,
            json!({"models": [{"name": "llama3", "size": 1}, {"size": 2}, {"name": "qwen2:7b"}]}),
        ),
        "/api/pull" => (
            StatusCode::ACCEPTED,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::HeaderName::from_static("x-upstream"), "mock"),
            ],
            r#"{"status":"success"}"#,
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, "404 page not found").into_response(),
    }
}

pub async fn spawn_upstream() -> MockUpstream {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .fallback(upstream_handler)
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .unwrap();
    });

    MockUpstream {
        base_url: format!("http://{addr}"),
        seen,
        cancel,
    }
}

/// Base URL of a port nothing listens on.
pub async fn unreachable_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config(upstream: &str, emit_done_sentinel: bool) -> Config {
    Config {
        auth: AuthConfig {
            generate_tokens: vec![GENERATE_TOKEN.to_string()],
            model_tokens: vec![MODEL_TOKEN.to_string()],
        },
        service: ServiceConfig {
            base_url: upstream.to_string(),
            emit_done_sentinel,
        },
        ..Config::default()
    }
}

pub async fn spawn_gateway(config: Config) -> TestGateway {
    let access_log = Arc::new(MemoryAccessLog::new());
    let ctx = Arc::new(GatewayContext::new(config, access_log.clone()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, ctx, cancel.clone()));

    TestGateway {
        base_url: format!("http://{addr}"),
        access_log,
        cancel,
    }
}
