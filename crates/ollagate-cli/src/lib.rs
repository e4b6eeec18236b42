//! The `ollagate` binary's building blocks: arguments, configuration
//! loading, tracing and the access log file.

#![deny(unsafe_code)]

pub mod access_file;
pub mod error;
pub mod logging;
pub mod parser;

use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

use ollagate_core::{AccessLogSink, Config, MultiAccessLog, TracingAccessLog};

pub use access_file::JsonlAccessLog;
pub use error::CliError;
pub use parser::Cli;

/// Load the configuration file and apply command-line overrides.
///
/// The listen address is validated here so a bad value fails before any
/// logging or socket setup.
pub fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.server.listen_addr()?;
    Ok(config)
}

/// Access sinks for `config`: tracing always, plus the JSON-lines file when
/// enabled.
pub fn build_access_log(
    config: &Config,
) -> Result<(Arc<dyn AccessLogSink>, Option<WorkerGuard>), CliError> {
    if !config.logging.access_log {
        return Ok((Arc::new(TracingAccessLog), None));
    }

    let (file, guard) = JsonlAccessLog::open(&config.logging.dir)?;
    let sink = MultiAccessLog::new(vec![Box::new(TracingAccessLog), Box::new(file)]);
    Ok((Arc::new(sink), Some(guard)))
}
