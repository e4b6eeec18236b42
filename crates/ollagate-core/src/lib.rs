//! Core types for the ollagate gateway.
//!
//! This crate has no HTTP dependencies. It owns the configuration model and
//! loader, route-scoped token authorization, and the access-record port that
//! adapters implement.

#![deny(unsafe_code)]

pub mod access_log;
pub mod auth;
pub mod config;

pub use access_log::{
    ACCESS_TARGET, AccessLogSink, AccessRecord, MemoryAccessLog, MultiAccessLog, TracingAccessLog,
};
pub use auth::{AuthError, AuthGrant, RouteScope, authorize, mask_token, strip_bearer};
pub use config::{
    AuthConfig, Config, ConfigError, DEFAULT_BASE_URL, DEFAULT_LISTEN_ADDR, DEFAULT_LOG_DIR,
    LoggingConfig, ServerConfig, ServiceConfig,
};
