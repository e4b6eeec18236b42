//! Request forwarding to the upstream Ollama instance.
//!
//! Inbound headers are copied to the outbound request minus hop-by-hop and
//! framing headers; upstream status and headers are copied back the same
//! way. Bodies are never modified here.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::Client;
use tracing::{debug, error};

use crate::error::ProxyError;

/// Headers that are never forwarded in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    // Framing is recomputed by the server on each side
    "host",
    "content-length",
];

/// Check if a header should be forwarded.
fn should_forward_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !HOP_BY_HOP_HEADERS.contains(&lower.as_str()) && !lower.starts_with("proxy-")
}

/// Join the upstream base URL and an inbound path (with query).
#[must_use]
pub fn upstream_url(base_url: &str, path_and_query: &str) -> String {
    format!("{}{path_and_query}", base_url.trim_end_matches('/'))
}

/// Headers for the outbound request: forwardable inbound headers plus a JSON
/// content type.
#[must_use]
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if should_forward_header(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Send one request upstream. Transport failures are not retried.
pub async fn send_upstream(
    client: &Client,
    base_url: &str,
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, ProxyError> {
    let url = upstream_url(base_url, path_and_query);
    debug!(%method, %url, body_len = body.len(), "Forwarding to upstream");

    client
        .request(method, &url)
        .headers(outbound_headers(headers))
        .body(body)
        .send()
        .await
        .map_err(|e| {
            error!(%url, error = %e, "Failed to connect to upstream");
            ProxyError::Upstream(e)
        })
}

/// Copy forwardable upstream headers onto `target`.
///
/// Headers `target` already carries are left alone, so a response that set
/// its own `Content-Type` keeps it.
pub fn copy_response_headers(upstream: &HeaderMap, target: &mut HeaderMap) {
    let preset: Vec<HeaderName> = target.keys().cloned().collect();
    for (name, value) in upstream {
        if should_forward_header(name.as_str()) && !preset.contains(name) {
            target.append(name.clone(), value.clone());
        }
    }
}

/// Force the event-stream headers on a streaming response.
pub fn apply_stream_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
}

/// `true` when the upstream answered with newline-delimited JSON.
#[must_use]
pub fn is_ndjson(upstream: &reqwest::Response) -> bool {
    upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-ndjson"))
}

/// Relay a buffered upstream response verbatim.
pub async fn relay_buffered(upstream: reqwest::Response) -> Result<Response, ProxyError> {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = upstream.bytes().await.map_err(ProxyError::ReadBody)?;
    debug!(%status, body_len = body.len(), "Relaying buffered upstream response");

    Ok(build_relay(status, &headers, Body::from(body), false))
}

/// Relay a live upstream body without buffering it.
///
/// With `event_stream` set the event-stream headers replace the upstream
/// content type.
#[must_use]
pub fn relay_streaming(upstream: reqwest::Response, event_stream: bool) -> Response {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = Body::from_stream(upstream.bytes_stream().map_err(std::io::Error::other));
    debug!(%status, event_stream, "Relaying streaming upstream response");

    build_relay(status, &headers, body, event_stream)
}

fn build_relay(status: StatusCode, headers: &HeaderMap, body: Body, event_stream: bool) -> Response {
    let mut response = match Response::builder().status(status).body(body) {
        Ok(response) => response,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    copy_response_headers(headers, response.headers_mut());
    if event_stream {
        apply_stream_headers(response.headers_mut());
    }
    response
}
