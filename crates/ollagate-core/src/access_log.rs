//! Per-request access records.
//!
//! The gateway produces exactly one [`AccessRecord`] per inbound request and
//! hands it to an [`AccessLogSink`]. Persisting the record is the sink's job;
//! the binary wires a JSON-lines file sink, tests use [`MemoryAccessLog`].

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// Tracing target used for access records.
pub const ACCESS_TARGET: &str = "ollagate::access";

/// One request/response pair as seen by the gateway.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccessRecord {
    /// RFC 3339 timestamp of when the request completed.
    pub timestamp: String,
    pub method: String,
    pub path: String,
    /// Presented token, masked. Absent when no token was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub token_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Response body for buffered JSON responses. Streams are not captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessRecord {
    /// Start a record for `method` and `path`, stamped with the current time.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            method: method.into(),
            path: path.into(),
            token: None,
            token_valid: false,
            request_body: None,
            response: None,
            error: None,
        }
    }
}

/// Receiver of access records.
///
/// Implementations must not block for long: `record` is called on the
/// request path after the response has been produced.
pub trait AccessLogSink: Send + Sync {
    fn record(&self, record: &AccessRecord);
}

/// Sink that emits records as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLog;

impl AccessLogSink for TracingAccessLog {
    fn record(&self, record: &AccessRecord) {
        tracing::info!(
            target: ACCESS_TARGET,
            method = %record.method,
            path = %record.path,
            token = record.token.as_deref().unwrap_or("-"),
            token_valid = record.token_valid,
            error = record.error.as_deref().unwrap_or(""),
            "request"
        );
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAccessLog {
    records: Mutex<Vec<AccessRecord>>,
}

impl MemoryAccessLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<AccessRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl AccessLogSink for MemoryAccessLog {
    fn record(&self, record: &AccessRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Fan a record out to several sinks in order.
pub struct MultiAccessLog {
    sinks: Vec<Box<dyn AccessLogSink>>,
}

impl MultiAccessLog {
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn AccessLogSink>>) -> Self {
        Self { sinks }
    }
}

impl AccessLogSink for MultiAccessLog {
    fn record(&self, record: &AccessRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
