//! ARmigate inline request-inspection gate.
//!
//! For every inbound request the gate asks the ARmigate scoring API whether
//! to let it through, then either stages the API's block page or forwards the
//! request with the API's enrichment headers. Any failure to get a verdict
//! lets the request through.
//!
//! ```no_run
//! use std::sync::Arc;
//! use armigate::{Gate, GateConfig};
//! use armigate::http::inspection_middleware;
//! use axum::{middleware, routing::get, Router};
//!
//! # fn build() -> Result<Router, armigate::inspection::GateError> {
//! let gate = Arc::new(Gate::new(&GateConfig {
//!     api_key: "key".into(),
//!     endpoint: "api.armigate.example".into(),
//!     ..Default::default()
//! })?);
//! let app = Router::new()
//!     .route("/", get(|| async { "Hello World" }))
//!     .layer(middleware::from_fn_with_state(gate, inspection_middleware));
//! # Ok(app)
//! # }
//! ```

pub mod config;
pub mod http;
pub mod inspection;
pub mod observability;

pub use config::schema::{AppConfig, GateConfig};
pub use http::HttpServer;
pub use inspection::{EnrichmentHeaders, Gate, GateEvent, InspectOptions, OutboundResponse, Verdict};
