//! Circuit gateway.
//!
//! An HTTP gateway forwarding requests to configured upstreams through
//! per-destination circuit breakers.
//!
//! ```text
//!     Client ──▶ http::server ──▶ routing ──▶ CircuitBreakerService ──▶ Upstream
//!                                                 │
//!                                                 ├─ CircuitRegistry ── CircuitStore
//!                                                 └─ 503 fallback when open
//!
//!     Admin API ──▶ CircuitRegistry::snapshot
//!     Config watcher ──▶ CircuitRegistry::update_config
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use circuit_guard::admin::{setup_admin_router, AdminState};
use circuit_guard::config::loader::load_config;
use circuit_guard::config::watcher::ConfigWatcher;
use circuit_guard::config::GatewayConfig;
use circuit_guard::http::HttpServer;
use circuit_guard::lifecycle::{wait_for_signal, Shutdown};
use circuit_guard::observability::{logging, metrics};
use circuit_guard::resilience::{CircuitRegistry, RequestGuard};
use circuit_guard::store::MemoryStore;

#[derive(Parser)]
#[command(name = "circuit-gateway", version, about = "HTTP gateway with per-upstream circuit breakers")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "CIRCUIT_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "circuit-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        circuit_overrides = config.circuits.overrides.len(),
        identifier = ?config.circuits.identifier,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(CircuitRegistry::from_config(
        Arc::new(MemoryStore::new()),
        &config.circuits,
    ));
    let shutdown = Shutdown::new();

    // Hot reload of circuit policy. The watcher handle must outlive the loop.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let registry = registry.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(new_config) = updates.recv() => {
                            registry.update_config(&new_config.circuits);
                            tracing::info!("Circuit defaults reloaded; route changes need a restart");
                        }
                        _ = stop.recv() => break,
                        else => break,
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    if config.admin.enabled {
        let admin = setup_admin_router(AdminState {
            registry: registry.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, RequestGuard::new(registry))?;
    let gateway = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    gateway.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
