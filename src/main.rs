//! Egress proxy binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Internal caller                                            External API
//!     ───────────────┐                                        ┌──────────────
//!                    ▼                                        │
//!   ┌────────────────────────────────────────────────────────┼───────────┐
//!   │  http::server ──▶ routing ──▶ rate_limit ──▶ breaker ──▶ redirect  │
//!   │                                  │              │       + transport│
//!   │                                  ▼              ▼                  │
//!   │                           ┌─────────────────────────┐              │
//!   │                           │ store (Redis / memory)  │ ◀── admin    │
//!   │                           └─────────────────────────┘              │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use egress_proxy::admin::{setup_admin_router, AdminState};
use egress_proxy::clock::SystemClock;
use egress_proxy::config::{load_config, ProxyConfig, StoreBackend};
use egress_proxy::http::{HttpServer, ProxyService, ReqwestTransport};
use egress_proxy::lifecycle::{wait_for_signal, Shutdown};
use egress_proxy::observability::{logging, metrics};
use egress_proxy::store::{BreakerRepository, MemoryRepository, RedisRepository};

#[derive(Parser)]
#[command(name = "egress-proxy", version, about = "Outbound HTTP proxy with rate limiting and circuit breaking")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "EGRESS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "egress-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        mappings = config.mappings.len(),
        store = ?config.store.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );
    if config.mappings.is_empty() {
        tracing::warn!("No mappings configured; every request will be rejected");
    }

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

    let repo: Arc<dyn BreakerRepository> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryRepository::with_prefix(config.store.key_prefix.clone())),
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .ok_or("store.redis_url is required for the redis backend")?;
            Arc::new(RedisRepository::connect(url, config.store.key_prefix.clone()).await?)
        }
    };
    tracing::info!(store = repo.store_type(), "State store ready");

    let transport = Arc::new(ReqwestTransport::new(&config.timeouts)?);
    let service = Arc::new(ProxyService::new(&config, repo, transport, Arc::new(SystemClock))?);

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(service.clone(), &config.admin.api_key));
        let mut rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(service, &config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
