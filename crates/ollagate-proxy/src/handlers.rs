//! Route handlers: the native verbatim relay and the OpenAI-compatible
//! translated endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::forward;
use crate::models::{
    ChatCompletionRequest, CompletionRequest, EmbeddingRequest, NativeResponse, StreamPeek,
};
use crate::server::GatewayContext;
use crate::stream::{self, StreamKind};
use crate::translate::{self, EndpointKind};

/// Health check endpoint. Not authenticated.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Native `/api/*` routes: forward as-is and relay the upstream answer verbatim.
pub async fn native_passthrough(
    State(ctx): State<Arc<GatewayContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    let streaming = StreamPeek::is_streaming(&body);
    debug!(%method, path, streaming, "Native request");

    let upstream =
        forward::send_upstream(&ctx.client, ctx.base_url(), method, path, &headers, body).await?;

    // Ollama streams NDJSON by default even without `"stream": true`.
    if streaming || forward::is_ndjson(&upstream) {
        Ok(forward::relay_streaming(upstream, streaming))
    } else {
        forward::relay_buffered(upstream).await
    }
}

/// Unmatched paths that passed authorization.
pub async fn unsupported_route(method: Method, uri: Uri) -> ProxyError {
    ProxyError::UnsupportedRoute {
        method,
        path: uri.path().to_string(),
    }
}

fn parse_request<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProxyError> {
    serde_json::from_slice(body).map_err(ProxyError::InvalidRequest)
}

fn encode<T: serde::Serialize>(request: &T) -> Result<Bytes, ProxyError> {
    serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(ProxyError::Encode)
}

/// `POST /v1/chat/completions` → upstream `/api/chat`.
pub async fn chat_completions(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let request: ChatCompletionRequest = parse_request(&body)?;
    let model = request.model.clone();
    let streaming = request.stream;
    info!(model = %model, streaming, messages = request.messages.len(), "Chat completion request");

    let payload = encode(&translate::native_chat_request(request))?;
    dispatch_openai(&ctx, EndpointKind::Chat, &headers, payload, model, streaming).await
}

/// `POST /v1/completions` → upstream `/api/generate`.
pub async fn completions(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let request: CompletionRequest = parse_request(&body)?;
    let model = request.model.clone();
    let streaming = request.stream;
    info!(model = %model, streaming, "Completion request");

    let payload = encode(&translate::native_generate_request(request))?;
    dispatch_openai(&ctx, EndpointKind::Completion, &headers, payload, model, streaming).await
}

/// `POST /v1/embeddings` → upstream `/api/embed`.
pub async fn embeddings(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let request: EmbeddingRequest = parse_request(&body)?;
    let model = request.model.clone();
    info!(model = %model, "Embedding request");

    let payload = encode(&translate::native_embed_request(request))?;
    dispatch_openai(&ctx, EndpointKind::Embedding, &headers, payload, model, false).await
}

/// `GET /v1/models` → upstream `/api/tags`.
pub async fn list_models(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    dispatch_openai(
        &ctx,
        EndpointKind::ModelList,
        &headers,
        Bytes::new(),
        String::new(),
        false,
    )
    .await
}

async fn dispatch_openai(
    ctx: &GatewayContext,
    kind: EndpointKind,
    headers: &HeaderMap,
    payload: Bytes,
    model: String,
    streaming: bool,
) -> Result<Response, ProxyError> {
    let method = match kind {
        EndpointKind::ModelList => Method::GET,
        _ => Method::POST,
    };
    let upstream = forward::send_upstream(
        &ctx.client,
        ctx.base_url(),
        method,
        kind.upstream_path(),
        headers,
        payload,
    )
    .await?;

    // Upstream failures carry a single JSON error object, not a stream.
    let stream_kind = StreamKind::for_endpoint(kind).filter(|_| streaming);
    if let Some(stream_kind) = stream_kind
        && upstream.status().is_success()
    {
        return Ok(stream::sse_response(
            upstream,
            model,
            stream_kind,
            ctx.config.service.emit_done_sentinel,
        ));
    }

    translate_buffered(upstream, kind, &model).await
}

async fn translate_buffered(
    upstream: reqwest::Response,
    kind: EndpointKind,
    model: &str,
) -> Result<Response, ProxyError> {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let body = upstream.bytes().await.map_err(ProxyError::ReadBody)?;
    let native: NativeResponse = serde_json::from_slice(&body).map_err(ProxyError::UpstreamBody)?;

    if let Some(message) = native.error_message() {
        return Err(ProxyError::UpstreamReported(message.to_string()));
    }

    let mut response = match kind {
        EndpointKind::Chat => Json(translate::chat_response(&native, model)).into_response(),
        EndpointKind::Completion => {
            Json(translate::completion_response(&native, model)).into_response()
        }
        EndpointKind::Embedding => {
            Json(translate::embedding_response(&native, model)).into_response()
        }
        EndpointKind::ModelList => Json(translate::model_list(&native)).into_response(),
    };
    *response.status_mut() = status;
    forward::copy_response_headers(&upstream_headers, response.headers_mut());
    Ok(response)
}
