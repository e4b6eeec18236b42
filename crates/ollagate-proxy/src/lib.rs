//! Gateway routes in front of an Ollama instance.
//!
//! Native `/api/*` routes are relayed verbatim. OpenAI-compatible `/v1/*`
//! routes are translated to their native counterparts and back, including
//! the streaming path, where upstream NDJSON becomes SSE.
//!
//! ```text
//! client ──► CORS ─► access log ─► token check ─► handler ─► Ollama
//!                                                   │
//!                          translate / stream ◄─────┘
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod forward;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;
pub mod stream;
pub mod translate;

pub use error::ProxyError;
pub use server::{GatewayContext, build_router, serve};
pub use stream::{StreamEvent, StreamKind, translate_stream};
pub use translate::EndpointKind;
