//! Inline request inspection.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → fingerprint.rs (path filters, then snapshot: headers.rs + cookies.rs)
//!     → decision.rs (POST to scoring API under a deadline, classify)
//!     → mediator.rs (block page / header passthrough)
//!     → gate.rs (exactly one Verdict per request)
//! ```
//!
//! # Design Decisions
//! - Fail open: any failure to obtain a verdict lets the request through
//! - One pooled scoring client per gate, shared by all requests
//! - Request-time failures are outcomes, not errors; only construction fails

pub mod cookies;
pub mod decision;
pub mod fingerprint;
pub mod gate;
pub mod headers;
pub mod mediator;

use thiserror::Error;

pub use cookies::ClientIdentity;
pub use decision::{Decision, DecisionClient, Outcome, RemoteResponse, SkipReason};
pub use fingerprint::{BypassReason, ClientConnection, Fingerprint, FingerprintBuilder, Inspection, PathFilter};
pub use gate::{Gate, GateEvent, InspectOptions, Verdict};
pub use mediator::{EnrichmentHeaders, OutboundResponse};

/// Errors building a [`Gate`].
#[derive(Debug, Error)]
pub enum GateError {
    /// A path filter does not compile.
    #[error("invalid {field} pattern: {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    /// The scoring endpoint does not form a valid URL.
    #[error("invalid scoring endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("failed to build scoring API client: {0}")]
    Client(#[from] reqwest::Error),
}
