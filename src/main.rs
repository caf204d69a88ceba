//! ==============================================================================
//! main.rs - coldchain hub entry point
//! ==============================================================================
//!
//! purpose:
//!     the process that sits between the sensor stream and the monitoring
//!     dashboard. everything interesting lives in the library; this file
//!     parses the command line, loads hub.toml, starts logging, wires the
//!     background tasks and serves http until ctrl-c.
//!
//! startup:
//!     1. command line + config file (cli flags win)
//!     2. tracing subscriber (RUST_LOG wins over config)
//!     3. device directory client (optional)
//!     4. hub tasks: ingest worker, sweeper, enrichment, stream client
//!     5. web server, graceful shutdown on ctrl-c
//!
//! ==============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use coldchain_hub::server::{self, AppState};
use coldchain_hub::{Hub, HubConfig};

/// Live cold-chain telemetry aggregator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to hub.toml (default: config/hub.toml, then ../config/hub.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve the query api on (overrides server.bind)
    #[arg(short, long)]
    bind: Option<String>,

    /// WebSocket url of the sensor stream (overrides ingest.stream_url)
    #[arg(short, long)]
    stream_url: Option<String>,

    /// Device directory base url (overrides enrichment.base_url)
    #[arg(short, long)]
    directory_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // step 1: load configuration
    // logging is not up yet, so a load failure is reported through the error
    let mut config = HubConfig::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(url) = args.stream_url {
        config.ingest.stream_url = Some(url);
    }
    if let Some(url) = args.directory_url {
        config.enrichment.base_url = Some(url);
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // step 2: initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("===========================================================");
    info!("  coldchain-hub v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================================");
    config.print_summary();

    // step 3: device directory
    let directory = Hub::directory_from_config(&config).context("invalid enrichment config")?;

    // step 4: background tasks
    let hub = Hub::start(&config, directory).context("failed to start hub")?;
    info!("[STARTUP] ✓ Ingest, sweeper and enrichment tasks running");

    // step 5: web server
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!("[STARTUP] ✓ Query api live at http://{}", config.server.bind);

    let state = Arc::new(AppState::new(hub.query(), hub.queue.clone()));
    if let Err(e) = server::serve(listener, state, shutdown_signal()).await {
        error!("web server error: {}", e);
    }

    info!("[SHUTDOWN] draining ingest queue...");
    hub.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("[SHUTDOWN] ctrl-c received");
}
