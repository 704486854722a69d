//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve, connect info)
//!     → request.rs (peer address, TLS flag, CSP nonce)
//!     → middleware/inspection.rs (gate verdict)
//!         Block → staged scoring API page
//!         Allow → application handler → staged headers merged into response
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::inspection_middleware;
pub use request::CspNonce;
pub use server::HttpServer;
