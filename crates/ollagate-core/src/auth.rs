//! Route-scoped bearer-token authorization.
//!
//! Every authenticated route belongs to exactly one [`RouteScope`]; the scope
//! picks the allow-list the presented token is checked against. Paths that
//! belong to no scope are rejected outright.

use std::fmt;

use thiserror::Error;

use crate::config::AuthConfig;

/// Native management operations that require a management token.
const MANAGEMENT_PATHS: &[&str] = &[
    "/api/pull",
    "/api/push",
    "/api/copy",
    "/api/delete",
    "/api/create",
];

/// Token list a route is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    /// Inference and read-only routes, checked against `generate_tokens`.
    Generation,
    /// Model-management routes, checked against `model_tokens`.
    Management,
}

impl RouteScope {
    /// Resolve the scope for a request path, or `None` for unrecognized prefixes.
    #[must_use]
    pub fn for_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        if MANAGEMENT_PATHS.contains(&path) {
            return Some(Self::Management);
        }
        if has_prefix(path, "/api") || has_prefix(path, "/v1") {
            return Some(Self::Generation);
        }
        None
    }

    /// The allow-list for this scope.
    #[must_use]
    pub fn tokens(self, config: &AuthConfig) -> &[String] {
        match self {
            Self::Generation => &config.generate_tokens,
            Self::Management => &config.model_tokens,
        }
    }
}

impl fmt::Display for RouteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => f.write_str("generation"),
            Self::Management => f.write_str("management"),
        }
    }
}

/// `true` when `path` equals `prefix` or continues it with a `/` segment.
fn has_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Reasons a request is refused before it reaches the proxy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,

    #[error("unauthorized access")]
    InvalidToken { token: String, scope: RouteScope },

    #[error("unauthorized access")]
    UnknownRoute { token: String },
}

impl AuthError {
    /// The token that was presented, if any.
    #[must_use]
    pub fn presented_token(&self) -> Option<&str> {
        match self {
            Self::MissingToken => None,
            Self::InvalidToken { token, .. } | Self::UnknownRoute { token } => Some(token),
        }
    }
}

/// A successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub scope: RouteScope,
    pub token: String,
}

/// Remove an optional `Bearer ` prefix from an `Authorization` header value.
#[must_use]
pub fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

/// Authorize a request path given its raw `Authorization` header value.
///
/// The token is compared byte for byte; surrounding whitespace is not removed.
pub fn authorize(
    config: &AuthConfig,
    path: &str,
    authorization: Option<&str>,
) -> Result<AuthGrant, AuthError> {
    let token = authorization.map(strip_bearer).unwrap_or_default();
    if token.trim().is_empty() {
        return Err(AuthError::MissingToken);
    }

    let Some(scope) = RouteScope::for_path(path) else {
        return Err(AuthError::UnknownRoute {
            token: token.to_string(),
        });
    };

    if scope.tokens(config).iter().any(|allowed| allowed == token) {
        Ok(AuthGrant {
            scope,
            token: token.to_string(),
        })
    } else {
        Err(AuthError::InvalidToken {
            token: token.to_string(),
            scope,
        })
    }
}

/// Shorten a token for logs: the first four characters followed by `***`.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if visible.len() == token.len() {
        "***".to_string()
    } else {
        format!("{visible}***")
    }
}
