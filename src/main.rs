//! Marketplace security gate.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → timeout
//!                          │
//!                          ▼
//!                  ┌───────────────┐   deny (401/403/429)
//!                  │ security gate │──────────────────────▶ JSON denial
//!                  └───────┬───────┘
//!                          │ allow
//!                          ▼
//!                    application  ──▶ security headers, X-Response-Time
//!
//!     every outcome → performance monitor + audit log
//!     background   → housekeeping (1h), pruning (5m), error rate (1m)
//! ```
//!
//! Configuration comes from the file named by `GATE_CONFIG` (hot reloaded),
//! otherwise from the preset named by `GATE_PRESET` (default `production`).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use marketplace_gate::config::loader::{load_config, load_preset};
use marketplace_gate::config::watcher::ConfigWatcher;
use marketplace_gate::lifecycle::{signals, spawn_maintenance};
use marketplace_gate::observability::{logging, metrics};
use marketplace_gate::{GateContext, HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os("GATE_CONFIG").map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => {
            let preset = std::env::var("GATE_PRESET").unwrap_or_else(|_| "production".to_string());
            load_preset(&preset)?
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!("marketplace-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        rate_limit_max = config.rate_limiting.max_requests,
        rate_limit_window_ms = config.rate_limiting.window_ms,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let maintenance_config = config.maintenance.clone();
    let context = Arc::new(GateContext::new(config)?);

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);
    let tasks = spawn_maintenance(context.clone(), &maintenance_config, &shutdown);

    // The watcher must stay alive for reloads to keep arriving.
    let (_watcher, config_updates) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let server = HttpServer::new(context);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
