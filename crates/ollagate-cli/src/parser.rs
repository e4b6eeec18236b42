//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use ollagate_core::Config;

/// Authenticating gateway with an OpenAI-compatible surface in front of Ollama.
#[derive(Debug, Parser)]
#[command(name = "ollagate")]
#[command(about = "Authenticating Ollama gateway with OpenAI-compatible routes")]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", env = "OLLAGATE_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen address, overrides `server.listen`
    #[arg(short = 'l', long = "listen", env = "OLLAGATE_LISTEN")]
    pub listen: Option<String>,

    /// Log directory, overrides `logging.dir`
    #[arg(long = "log-dir", env = "OLLAGATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.server.listen = Some(listen.clone());
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir.clone_from(dir);
        }
    }
}
