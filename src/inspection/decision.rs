//! Scoring API client.
//!
//! # Responsibilities
//! - POST one fingerprint per request over a pooled keep-alive client
//! - Bound the whole exchange (connect, headers, body) by a single deadline
//! - Classify the reply into Allow / Block / Skip
//!
//! # State Machine
//! ```text
//! Pending ──headers + body──▶ StatusKnown ──301/302/401/403──▶ Block
//!    │                             ├──────────200─────────────▶ Allow
//!    │                             └──────────other───────────▶ Skip
//!    └──connect error / read error / deadline──▶ Failed ──────▶ Skip
//! ```
//!
//! # Design Decisions
//! - The exchange future races the deadline inside `tokio::time::timeout`,
//!   so exactly one completion source resolves a call
//! - Failures are logged here and never returned as errors
//! - Redirects are not followed: a 301/302 is itself the verdict

use axum::body::Bytes;
use axum::http::header::{CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::GateConfig;
use crate::inspection::fingerprint::Fingerprint;
use crate::inspection::mediator::EnrichmentHeaders;
use crate::inspection::GateError;
use crate::observability::metrics;

/// Request header asking the scoring API to set the identity cookie.
pub const SET_COOKIE_REQUEST_HEADER: &str = "x-armigate-x-set-cookie";

/// Why a request was let through without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("error establishing the connection to the scoring API")]
    Connect,

    #[error("error retrieving the response from the scoring API")]
    Response,

    #[error("timeout waiting for the scoring API")]
    Timeout,

    #[error("unrecognized status {0} from the scoring API")]
    UnrecognizedStatus(u16),
}

/// Classification of one scoring exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Block,
    /// No usable verdict; the request proceeds without enrichment.
    Skip(SkipReason),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Block => "block",
            Outcome::Skip(_) => "skip",
        }
    }
}

/// Map a scoring API status code to an outcome.
pub fn classify(status: StatusCode) -> Outcome {
    match status.as_u16() {
        301 | 302 | 401 | 403 => Outcome::Block,
        200 => Outcome::Allow,
        other => Outcome::Skip(SkipReason::UnrecognizedStatus(other)),
    }
}

/// A fully read scoring API reply.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Result of [`DecisionClient::evaluate`].
#[derive(Debug, Clone)]
pub struct Decision {
    pub outcome: Outcome,
    /// The reply, whenever one was fully read.
    pub response: Option<RemoteResponse>,
    /// Present only for Allow and Block when the reply carries a manifest.
    pub enrichment: Option<EnrichmentHeaders>,
}

impl Decision {
    fn skipped(reason: SkipReason, response: Option<RemoteResponse>) -> Self {
        Self {
            outcome: Outcome::Skip(reason),
            response,
            enrichment: None,
        }
    }
}

enum ExchangeError {
    Connect(reqwest::Error),
    Response(reqwest::Error),
}

/// Client for the scoring endpoint, one per gate.
#[derive(Debug, Clone)]
pub struct DecisionClient {
    http: reqwest::Client,
    endpoint: url::Url,
    timeout: Duration,
}

impl DecisionClient {
    pub fn new(config: &GateConfig) -> Result<Self, GateError> {
        let endpoint = config
            .endpoint_url()
            .map_err(|source| GateError::Endpoint {
                endpoint: config.endpoint.clone(),
                source,
            })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `fingerprint` and classify the reply. Never fails: every
    /// failure becomes [`Outcome::Skip`].
    pub async fn evaluate(&self, fingerprint: &Fingerprint) -> Decision {
        let started = Instant::now();

        let decision = match tokio::time::timeout(self.timeout, self.exchange(fingerprint)).await {
            Ok(Ok(response)) => self.decide(response),
            Ok(Err(ExchangeError::Connect(e))) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "ARmigate: Error establishing the connection to the scoring API, request skipped"
                );
                Decision::skipped(SkipReason::Connect, None)
            }
            Ok(Err(ExchangeError::Response(e))) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "ARmigate: Error retrieving the response from the scoring API, request skipped"
                );
                Decision::skipped(SkipReason::Response, None)
            }
            Err(_) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ARmigate: Timeout happened with connection to the scoring API, request skipped"
                );
                Decision::skipped(SkipReason::Timeout, None)
            }
        };

        metrics::record_decision(decision.outcome.as_str(), started);
        decision
    }

    async fn exchange(&self, fingerprint: &Fingerprint) -> Result<RemoteResponse, ExchangeError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONNECTION, "keep-alive")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(fingerprint.to_form());
        if fingerprint.requests_client_cookie() {
            request = request.header(SET_COOKIE_REQUEST_HEADER, "true");
        }

        let response = request.send().await.map_err(ExchangeError::Connect)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(ExchangeError::Response)?;

        Ok(RemoteResponse {
            status,
            headers,
            body,
        })
    }

    fn decide(&self, response: RemoteResponse) -> Decision {
        let outcome = classify(response.status);
        match outcome {
            Outcome::Allow | Outcome::Block => Decision {
                outcome,
                enrichment: EnrichmentHeaders::from_manifest(&response.headers),
                response: Some(response),
            },
            Outcome::Skip(reason) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    status = response.status.as_u16(),
                    "ARmigate: Unrecognized status from the scoring API, request skipped"
                );
                Decision::skipped(reason, Some(response))
            }
        }
    }
}
