//! Axum HTTP server for the gateway.
//!
//! [`build_router`] assembles routes and layers; [`serve`] runs them on a
//! pre-bound listener until the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use ollagate_core::{AccessLogSink, Config};

use crate::error::ProxyError;
use crate::handlers;
use crate::middleware::{handle_panic, record_access, require_token};

/// Preflight cache lifetime.
const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Shared, read-only state for every request.
pub struct GatewayContext {
    pub config: Arc<Config>,
    /// Pooled client for upstream requests.
    pub client: Client,
    pub access_log: Arc<dyn AccessLogSink>,
}

impl GatewayContext {
    pub fn new(config: Config, access_log: Arc<dyn AccessLogSink>) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            access_log,
        })
    }

    /// Upstream base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.config.service.effective_base_url()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE);

    if origins.is_empty() {
        return layer.allow_origin(AllowOrigin::mirror_request());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the gateway router.
///
/// Layer order from the outside in: panic recovery, CORS, request tracing,
/// access log, token check. `/health` skips the token check.
pub fn build_router(ctx: Arc<GatewayContext>) -> Router {
    let native = Router::new()
        .route("/api/generate", post(handlers::native_passthrough))
        .route("/api/chat", post(handlers::native_passthrough))
        .route("/api/embed", post(handlers::native_passthrough))
        .route("/api/embeddings", post(handlers::native_passthrough))
        .route("/api/pull", post(handlers::native_passthrough))
        .route("/api/push", post(handlers::native_passthrough))
        .route("/api/copy", post(handlers::native_passthrough))
        .route("/api/create", post(handlers::native_passthrough))
        .route(
            "/api/show",
            get(handlers::native_passthrough).post(handlers::native_passthrough),
        )
        .route("/api/tags", get(handlers::native_passthrough))
        .route("/api/ps", get(handlers::native_passthrough))
        .route("/api/version", get(handlers::native_passthrough))
        .route("/api/delete", delete(handlers::native_passthrough));

    let openai = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/models", get(handlers::list_models));

    Router::new()
        .merge(native)
        .merge(openai)
        .fallback(handlers::unsupported_route)
        .method_not_allowed_fallback(handlers::unsupported_route)
        .layer(from_fn_with_state(ctx.clone(), require_token))
        .route("/health", get(handlers::health))
        .layer(from_fn_with_state(ctx.clone(), record_access))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&ctx.config.server.cors_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(ctx)
}

/// Run the gateway on a pre-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<GatewayContext>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(
        %addr,
        upstream = %ctx.base_url(),
        generate_tokens = ctx.config.auth.generate_tokens.len(),
        model_tokens = ctx.config.auth.model_tokens.len(),
        "Gateway listening"
    );

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Gateway shut down");
    Ok(())
}
