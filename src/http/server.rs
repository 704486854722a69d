//! Demo HTTP server protected by the gate.
//!
//! # Responsibilities
//! - Create the Axum Router with the demo handlers
//! - Wire up middleware (tracing, inspection)
//! - Serve with connect info so the gate sees peer addresses
//! - Shut down gracefully on Ctrl+C

use axum::{
    body::Body,
    http::Request,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::http::middleware::inspection_middleware;
use crate::inspection::{EnrichmentHeaders, Gate};

/// HTTP server for the demo application.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a new HTTP server in front of `gate`.
    pub fn new(config: AppConfig, gate: Arc<Gate>) -> Self {
        Self {
            router: Self::build_router(gate),
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(gate: Arc<Gate>) -> Router {
        Router::new()
            .route("/", get(hello_handler))
            .route("/whoami", get(whoami_handler))
            .layer(middleware::from_fn_with_state(gate, inspection_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

async fn hello_handler() -> &'static str {
    "Hello World\n"
}

/// Echo the scoring API's classification of this request.
async fn whoami_handler(request: Request<Body>) -> impl IntoResponse {
    let enrichment = request.extensions().get::<EnrichmentHeaders>().cloned();
    let forwarded_isbot = request
        .headers()
        .get("x-armigate-isbot")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(json!({
        "enrichment": enrichment,
        "x-armigate-isbot": forwarded_isbot,
    }))
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
