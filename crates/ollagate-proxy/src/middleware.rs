//! Request middleware: token authorization, access records and panic recovery.

use std::any::Any;
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{error, warn};

use ollagate_core::{AccessRecord, authorize, mask_token};

use crate::error::{ProxyError, RecordedError, error_response};
use crate::server::GatewayContext;

/// Result of the auth layer, attached to the response for the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub token: Option<String>,
    pub valid: bool,
}

/// Reject requests whose token is not on the route's allow-list.
///
/// Rejections are answered in-body with HTTP 200 and never reach a handler.
pub async fn require_token(
    State(ctx): State<Arc<GatewayContext>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match authorize(&ctx.config.auth, &path, header) {
        Ok(grant) => {
            let mut response = next.run(request).await;
            response.extensions_mut().insert(AuthOutcome {
                token: Some(grant.token),
                valid: true,
            });
            response
        }
        Err(err) => {
            let token = err.presented_token().map(str::to_string);
            let masked = token.as_deref().map_or_else(|| "-".to_string(), mask_token);
            warn!(
                path = %path,
                token = %masked,
                reason = ?err,
                "Rejected request"
            );
            let mut response = error_response(err.to_string());
            response
                .extensions_mut()
                .insert(AuthOutcome { token, valid: false });
            response
        }
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Emit exactly one [`AccessRecord`] per request.
///
/// The request body is buffered and reinserted. Buffered JSON responses are
/// captured too; streams pass through untouched. Where the record ends up is
/// the sink's business; `logging.access_log` only decides whether the binary
/// adds the file sink.
pub async fn record_access(
    State(ctx): State<Arc<GatewayContext>>,
    request: Request,
    next: Next,
) -> Response {
    let mut record = AccessRecord::new(request.method().as_str(), request.uri().path());
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = ProxyError::RequestBody(e.to_string());
            record.error = Some(err.to_string());
            ctx.access_log.record(&record);
            return err.into_response();
        }
    };
    record.request_body = serde_json::from_slice::<Value>(&bytes).ok();

    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    if let Some(outcome) = response.extensions().get::<AuthOutcome>() {
        record.token = outcome.token.as_deref().map(mask_token);
        record.token_valid = outcome.valid;
    }
    if let Some(RecordedError(message)) = response.extensions().get::<RecordedError>() {
        record.error = Some(message.clone());
    }

    let response = if is_json(&response) {
        let (parts, body) = response.into_parts();
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => {
                record.response = serde_json::from_slice(&bytes).ok();
                Response::from_parts(parts, Body::from(bytes))
            }
            Err(e) => {
                let err = ProxyError::ReadResponse(e.to_string());
                record.error = Some(err.to_string());
                err.into_response()
            }
        }
    } else {
        response
    };

    record.timestamp = chrono::Local::now().to_rfc3339();
    ctx.access_log.record(&record);
    response
}

/// Turn a handler panic into the standard in-body error.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "Handler panicked");
    error_response("internal server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_handle_panic_renders_error_body() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"error":"internal server error"}"#);
    }

    #[test]
    fn test_is_json() {
        let json = axum::Json(serde_json::json!({})).into_response();
        assert!(is_json(&json));

        let text = "plain".into_response();
        assert!(!is_json(&text));
    }
}
