//! Daily JSON-lines access log (`<log-dir>/YYYY-MM-DD.log`).

use std::io::Write;
use std::path::Path;

use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};

use ollagate_core::{AccessLogSink, AccessRecord};

use crate::error::CliError;

/// Writes one JSON object per line through a non-blocking writer.
pub struct JsonlAccessLog {
    writer: NonBlocking,
}

impl JsonlAccessLog {
    /// Open the access log in `dir`. Keep the guard alive until shutdown.
    pub fn open(dir: &Path) -> Result<(Self, WorkerGuard), CliError> {
        std::fs::create_dir_all(dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| CliError::Logging(e.to_string()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok((Self { writer }, guard))
    }
}

impl AccessLogSink for JsonlAccessLog {
    fn record(&self, record: &AccessRecord) {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize access record");
                return;
            }
        };
        line.push(b'\n');

        // One write per line keeps records whole.
        let mut writer = self.writer.clone();
        if let Err(e) = writer.write_all(&line) {
            tracing::warn!(error = %e, "Failed to write access record");
        }
    }
}
