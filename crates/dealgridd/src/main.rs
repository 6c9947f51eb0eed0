//! dealgridd — the DealGrid daemon.
//!
//! Single binary that assembles the flash-deal service:
//! - Durable ledger (redb)
//! - Fast-path reservation cache
//! - Discovery cache
//! - Claim engine
//! - REST API
//!
//! # Usage
//!
//! ```text
//! dealgridd serve --port 8080 --data-dir /var/lib/dealgrid
//! dealgridd seed --data-dir /var/lib/dealgrid
//! ```

mod seed;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use dealgrid_api::{ApiState, build_router};
use dealgrid_cache::{DiscoveryCache, DiscoveryConfig, ReservationCache};
use dealgrid_engine::ClaimEngine;
use dealgrid_ledger::Ledger;

#[derive(Parser)]
#[command(name = "dealgridd", about = "DealGrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for the durable ledger.
        #[arg(long, default_value = "/var/lib/dealgrid")]
        data_dir: PathBuf,

        /// Discovery snapshot TTL in seconds.
        #[arg(long, default_value = "30")]
        discovery_ttl: u64,

        /// Discovery cache key quantization in degrees.
        #[arg(long, default_value = "0.001")]
        quantization: f64,

        /// Durable-commit timeout in milliseconds.
        #[arg(long, default_value = "5000")]
        commit_timeout_ms: u64,
    },

    /// Populate the ledger with sample deals.
    Seed {
        /// Data directory for the durable ledger.
        #[arg(long, default_value = "/var/lib/dealgrid")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dealgridd=debug,dealgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            discovery_ttl,
            quantization,
            commit_timeout_ms,
        } => {
            run_serve(port, data_dir, discovery_ttl, quantization, commit_timeout_ms).await
        }
        Command::Seed { data_dir } => seed::run(&data_dir),
    }
}

async fn run_serve(
    port: u16,
    data_dir: PathBuf,
    discovery_ttl: u64,
    quantization: f64,
    commit_timeout_ms: u64,
) -> anyhow::Result<()> {
    info!("DealGrid daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("dealgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let ledger = Ledger::open(&db_path)?;
    info!(path = ?db_path, "ledger opened");

    let reservations = Arc::new(ReservationCache::new(ledger.clone()));
    info!("reservation cache initialized");

    let discovery = Arc::new(DiscoveryCache::new(
        ledger.clone(),
        DiscoveryConfig {
            ttl: Duration::from_secs(discovery_ttl),
            quantization,
            ..DiscoveryConfig::default()
        },
    ));
    info!(ttl = discovery_ttl, "discovery cache initialized");

    let engine = Arc::new(
        ClaimEngine::new(ledger.clone(), reservations.clone())
            .with_commit_timeout(Duration::from_millis(commit_timeout_ms)),
    );
    info!(commit_timeout_ms, "claim engine initialized");

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        ledger,
        reservations,
        discovery,
        engine,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    server.await?;

    info!("DealGrid daemon stopped");
    Ok(())
}
