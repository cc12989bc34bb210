//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: gated application routes plus admin routes
//! - Wire up middleware (tracing, request ID, timeout)
//! - Apply hot-reloaded configuration to the gate
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::GateConfig;
use crate::context::GateContext;
use crate::http::middleware::security_gate_middleware;

/// HTTP server fronting the application with the security gate.
pub struct HttpServer {
    router: Router,
    context: Arc<GateContext>,
}

impl HttpServer {
    pub fn new(context: Arc<GateContext>) -> Self {
        let router = Self::build_router(context.clone());
        Self { router, context }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(context: Arc<GateContext>) -> Router {
        let config = context.config();

        let mut router = Router::new()
            .route("/", any(application_handler))
            .route("/{*path}", any(application_handler))
            .route_layer(middleware::from_fn_with_state(
                context.clone(),
                security_gate_middleware,
            ));

        if config.admin.enabled {
            router = router.merge(setup_admin_router(context));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Configurations arriving on `config_updates` are applied to the gate;
    /// invalid ones are logged and the current policy is kept.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let context = self.context.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match context.gate.update_config(config) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Rejected configuration update"),
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Stand-in for the application behind the gate.
async fn application_handler(request: Request) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "method": request.method().as_str(),
            "path": request.uri().path(),
        })),
    )
}
