//! Handler errors and their in-body rendering.
//!
//! Every failure the gateway reports to a client is an HTTP 200 carrying
//! `{"error": "<message>"}`. The message is also attached to the response
//! extensions so the access log can record it.

use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorBody;

/// Error message attached to an error response for the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError(pub String);

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream could not be reached (refused, DNS, timeout).
    #[error("failed to connect to upstream: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("failed to read upstream response: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("invalid upstream response: {0}")]
    UpstreamBody(#[source] serde_json::Error),

    /// The upstream answered with an `error` field.
    #[error("{0}")]
    UpstreamReported(String),

    #[error("invalid request body: {0}")]
    InvalidRequest(#[source] serde_json::Error),

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("failed to buffer response: {0}")]
    ReadResponse(String),

    #[error("failed to encode upstream request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("unsupported route: {method} {path}")]
    UnsupportedRoute { method: Method, path: String },
}

/// Render an in-body error response.
pub fn error_response(message: impl Into<String>) -> Response {
    let message = message.into();
    let mut response = (StatusCode::OK, Json(ErrorBody::new(message.clone()))).into_response();
    response.extensions_mut().insert(RecordedError(message));
    response
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            Self::Upstream(_) | Self::ReadBody(_) | Self::Client(_) => {
                error!(error = %self, "Upstream request failed");
            }
            _ => warn!(error = %self, "Request failed"),
        }
        error_response(self.to_string())
    }
}
