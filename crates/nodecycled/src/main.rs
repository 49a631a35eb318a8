//! nodecycled: the node lifecycle daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Deprovisioning controller (drift, then expiration)
//! - Replacement tracker (hands replaced nodes over for termination)
//! - Machine garbage collector
//! - `/metrics` + `/healthz` endpoint
//!
//! # Usage
//!
//! ```text
//! nodecycled run --config /etc/nodecycle/nodecycled.toml --port 8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use nodecycle_deprovision::{BinPackSimulator, DeprovisioningController, Drift, Expiration};
use nodecycle_gc::{GarbageCollector, HttpProvider, PresenceCache};
use nodecycle_metrics::Metrics;
use nodecycle_state::{Clock, StateStore, SystemClock};
use nodecycled::{Config, StoreExecutor, build_router};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "nodecycled", about = "Node lifecycle daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controllers and the metrics endpoint until interrupted.
    Run {
        /// Path to nodecycled.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port for /metrics and /healthz; overrides the config file.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, port } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            if let Some(port) = port {
                config.server.port = port;
            }
            run(config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodecycled=debug,nodecycle=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("nodecycle daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    if let Some(dir) = config.state.path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let state = StateStore::open(&config.state.path)?;
    info!(path = ?config.state.path, "state store opened");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Metrics::new();

    // Deprovisioning controller.
    let simulator = Arc::new(BinPackSimulator::new(state.clone()));
    let executor = Arc::new(
        StoreExecutor::new(state.clone(), clock.clone())
            .with_replacement_timeout(config.deprovisioning.replacement_timeout),
    );
    let controller = DeprovisioningController::new(state.clone(), executor.clone(), metrics.clone())
        .with_deprovisioner(Drift::new(state.clone(), simulator.clone(), metrics.clone()))
        .with_deprovisioner(Expiration::new(
            clock.clone(),
            state.clone(),
            simulator,
            metrics.clone(),
        ));
    info!(
        drift_enabled = config.settings.drift_enabled,
        "deprovisioning controller initialized"
    );

    // Garbage collector.
    let (address, prefix) = config.provider.address_and_prefix()?;
    let provider = Arc::new(HttpProvider::new(&address, &prefix, config.provider.timeout));
    let cache = PresenceCache::new(clock, config.gc.presence_ttl);
    let gc = Arc::new(GarbageCollector::new(
        state.clone(),
        provider,
        cache,
        metrics.clone(),
    ));
    info!(provider = %config.provider.endpoint, "garbage collector initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let cancel = CancellationToken::new();

    // ── Start background tasks ─────────────────────────────────

    let settings = config.settings;
    let deprovision_interval = config.deprovisioning.interval;
    let controller_cancel = cancel.child_token();
    let controller_handle = tokio::spawn(async move {
        controller
            .run(settings, deprovision_interval, controller_cancel)
            .await;
    });

    let replacements_handle =
        tokio::spawn(executor.run(deprovision_interval, cancel.child_token()));

    let gc_handle = tokio::spawn(gc.run(config.gc.interval, cancel.child_token()));

    // ── Start metrics server ───────────────────────────────────

    let router = build_router(metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "metrics server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server_cancel = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                r = tokio::signal::ctrl_c() => {
                    if let Err(e) = r {
                        tracing::error!(error = %e, "failed to listen for ctrl-c");
                    }
                    info!("shutdown signal received");
                }
                _ = server_cancel.cancelled() => {}
            }
            server_cancel.cancel();
        })
        .await?;

    cancel.cancel();
    let _ = controller_handle.await;
    let _ = replacements_handle.await;
    let _ = gc_handle.await;

    info!("nodecycle daemon stopped");
    Ok(())
}
