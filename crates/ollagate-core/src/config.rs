//! Gateway configuration.
//!
//! The configuration is a YAML document loaded once at startup. After that it
//! is shared read-only by every request handler; reloading is not supported.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream used when `service.base_url` is empty or missing.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Address the gateway listens on when `server.listen` is not set.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Directory for daily access-log files when `logging.dir` is not set.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid listen address {value:?}: {reason}")]
    InvalidListenAddr { value: String, reason: String },
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Bearer-token allow-lists, one per route scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Tokens accepted on generation routes (`/v1/*` and most of `/api/*`).
    pub generate_tokens: Vec<String>,
    /// Tokens accepted on model-management routes (pull, push, copy, ...).
    pub model_tokens: Vec<String>,
}

impl AuthConfig {
    /// True when no token of either scope is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generate_tokens.is_empty() && self.model_tokens.is_empty()
    }
}

/// Upstream inference service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the upstream service. Empty means [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// Append a `data: [DONE]` frame after a translated stream completes.
    pub emit_done_sentinel: bool,
}

impl ServiceConfig {
    /// Base URL with the default applied and any trailing slash removed.
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            DEFAULT_BASE_URL
        } else {
            trimmed.trim_end_matches('/')
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8080`.
    pub listen: Option<String>,
    /// Allowed CORS origins. Empty mirrors the request origin.
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Parse the configured listen address, falling back to [`DEFAULT_LISTEN_ADDR`].
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = self
            .listen
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_LISTEN_ADDR);

        value
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidListenAddr {
                value: value.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Access-log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory receiving `YYYY-MM-DD.log` access-log files.
    pub dir: PathBuf,
    /// Write access records to disk. Records are always traced.
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            access_log: true,
        }
    }
}

impl Config {
    /// Parse a configuration from YAML text.
    ///
    /// An empty document yields the default configuration.
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
auth:
  generate_tokens: ["gen-1", "gen-2"]
  model_tokens: ["admin"]
service:
  base_url: "http://10.0.0.5:11434/"
server:
  listen: "127.0.0.1:9000"
logging:
  dir: "/var/log/ollagate"
  access_log: false
"#;
        let config = Config::from_yaml_str(yaml, Path::new("inline")).unwrap();

        assert_eq!(config.auth.generate_tokens, vec!["gen-1", "gen-2"]);
        assert_eq!(config.auth.model_tokens, vec!["admin"]);
        assert_eq!(config.service.effective_base_url(), "http://10.0.0.5:11434");
        assert!(!config.service.emit_done_sentinel);
        assert_eq!(
            config.server.listen_addr().unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
        assert_eq!(config.logging.dir, PathBuf::from("/var/log/ollagate"));
        assert!(!config.logging.access_log);
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let config = Config::from_yaml_str("auth:\n  generate_tokens: [a]\n", Path::new("x")).unwrap();

        assert!(config.auth.model_tokens.is_empty());
        assert_eq!(config.service.effective_base_url(), DEFAULT_BASE_URL);
        assert_eq!(
            config.server.listen_addr().unwrap(),
            DEFAULT_LISTEN_ADDR.parse().unwrap()
        );
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_yaml_str("   \n", Path::new("x")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_blank_base_url_uses_default() {
        let service = ServiceConfig {
            base_url: "  ".to_string(),
            emit_done_sentinel: false,
        };
        assert_eq!(service.effective_base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = Config::from_yaml_str("auth: [unclosed", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_invalid_listen_addr() {
        let server = ServerConfig {
            listen: Some("not-an-address".to_string()),
            cors_origins: vec![],
        };
        assert!(matches!(
            server.listen_addr(),
            Err(ConfigError::InvalidListenAddr { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service:\n  base_url: http://upstream:1234").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.service.effective_base_url(), "http://upstream:1234");
    }

    #[test]
    fn test_load_without_tokens_is_not_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auth:\n  generate_tokens: []").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.auth.is_empty());

        let mut config = config;
        config.auth.model_tokens.push("admin".to_string());
        assert!(!config.auth.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
