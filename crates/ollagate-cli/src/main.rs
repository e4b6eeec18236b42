//! `ollagate` entry point - the composition root.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ollagate_cli::{Cli, build_access_log, load_config, logging};
use ollagate_proxy::{GatewayContext, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ollagate: {err}");
            std::process::exit(err.exit_code());
        }
    };

    let _log_guard = logging::init_tracing(&config.logging.dir, cli.verbose)
        .context("failed to initialize logging")?;
    info!(
        config = %cli.config.display(),
        base_url = %config.service.effective_base_url(),
        generate_tokens = config.auth.generate_tokens.len(),
        model_tokens = config.auth.model_tokens.len(),
        log_dir = %config.logging.dir.display(),
        "Configuration loaded"
    );
    if config.auth.is_empty() {
        warn!("No tokens configured; every authenticated route will be rejected");
    }

    let (access_log, _access_guard) =
        build_access_log(&config).context("failed to open access log")?;

    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let ctx = Arc::new(GatewayContext::new(config, access_log)?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    serve(listener, ctx, cancel).await.context("gateway server failed")?;
    Ok(())
}
