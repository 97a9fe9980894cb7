use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::http::{router, HttpServer};
use tollgate::ratelimit::{spawn_compaction, LimiterOptions, RateLimiter};

/// Per-client rate limiting HTTP server.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration file
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Tokens per client, overrides the configuration file
    #[arg(long)]
    rate: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config.server.http_addr = addr;
    }
    if let Some(rate) = cli.rate {
        config.rate_limiting.rate = rate;
    }
    config.validate()?;
    info!(http_addr = %config.server.http_addr, rate = config.rate_limiting.rate, "Configuration loaded");

    let limiter = match RateLimiter::with_options(LimiterOptions::from(&config.rate_limiting)) {
        Ok(limiter) => Arc::new(limiter),
        Err(e) => {
            error!(error = %e, "Failed to create rate limiter");
            return Err(e.into());
        }
    };
    info!("Rate limiter initialized");

    let compaction = spawn_compaction(
        Arc::clone(&limiter),
        Duration::from_secs(config.rate_limiting.compaction_interval_secs),
    );

    let app = router(limiter, config.rate_limiting.trust_forwarded_for);
    HttpServer::new(config.server.http_addr, app)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    compaction.abort();
    info!("Tollgate stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
