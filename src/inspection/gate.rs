//! Per-request orchestration.
//!
//! Every call resolves to exactly one [`Verdict`]. The continuation form
//! takes `FnOnce` callbacks and the publish/subscribe form sends exactly one
//! [`GateEvent`] to every live subscriber, so neither can fire twice or not
//! at all. Subscriber queues are unbounded: a slow consumer delays its own
//! events but never loses them.

use axum::http::request::Parts;
use axum::http::{Method, Uri};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::config::GateConfig;
use crate::inspection::decision::{DecisionClient, Outcome};
use crate::inspection::fingerprint::{
    detect_server_name, ClientConnection, FingerprintBuilder, Inspection, PathFilter,
};
use crate::inspection::mediator::{stage_allow, stage_block, EnrichmentHeaders, OutboundResponse};
use crate::inspection::GateError;
use crate::observability::metrics;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// CSP nonce stamped on `<script>` and `<style>` tags of block pages.
    pub nonce: Option<String>,
}

/// What the host must do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Continue to the application.
    Allow { enrichment: Option<EnrichmentHeaders> },
    /// Send the staged [`OutboundResponse`] instead.
    Block { enrichment: Option<EnrichmentHeaders> },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    pub fn enrichment(&self) -> Option<&EnrichmentHeaders> {
        match self {
            Verdict::Allow { enrichment } | Verdict::Block { enrichment } => enrichment.as_ref(),
        }
    }
}

/// Notification published by [`Gate::auth`].
///
/// `id` is the value [`Gate::auth`] returned for the same call.
#[derive(Debug, Clone)]
pub enum GateEvent {
    Valid {
        id: u64,
        method: Method,
        uri: Uri,
        enrichment: Option<EnrichmentHeaders>,
    },
    Blocked {
        id: u64,
        method: Method,
        uri: Uri,
        enrichment: Option<EnrichmentHeaders>,
    },
}

impl GateEvent {
    pub fn id(&self) -> u64 {
        match self {
            GateEvent::Valid { id, .. } | GateEvent::Blocked { id, .. } => *id,
        }
    }
}

/// Inline inspection gate, one per configuration.
///
/// Cheap to share behind an `Arc`; the pooled scoring client is reused by
/// every request.
#[derive(Debug)]
pub struct Gate {
    fingerprints: FingerprintBuilder,
    client: DecisionClient,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<GateEvent>>>,
    next_id: AtomicU64,
}

impl Gate {
    /// Build a gate from a validated configuration.
    pub fn new(config: &GateConfig) -> Result<Self, GateError> {
        let include = compile("uri_regex", config.inclusion_pattern())?;
        let exclude = compile("uri_regex_exclusion", config.exclusion_pattern())?;
        let server_name = config
            .server_name
            .clone()
            .unwrap_or_else(detect_server_name);

        let fingerprints = FingerprintBuilder::new(
            config.api_key.clone(),
            &server_name,
            config.client_id_cookie.clone(),
            PathFilter::new(include, exclude),
        );
        let client = DecisionClient::new(config)?;
        tracing::info!(
            endpoint = %client.endpoint(),
            timeout_ms = config.timeout_ms,
            server_name = %server_name,
            "ARmigate gate initialized"
        );

        Ok(Self {
            fingerprints,
            client,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Inspect one request.
    ///
    /// On Allow, headers listed by the scoring API are injected into
    /// `request.headers`; on Block, `outbound` holds the page to send.
    pub async fn inspect(
        &self,
        request: &mut Parts,
        connection: &ClientConnection,
        outbound: &mut OutboundResponse,
        options: &InspectOptions,
    ) -> Verdict {
        let fingerprint = match self.fingerprints.build(request, connection) {
            Inspection::Bypass(reason) => {
                tracing::debug!(path = %request.uri.path(), reason = reason.as_str(), "Inspection bypassed");
                metrics::record_bypass(reason.as_str());
                return Verdict::Allow { enrichment: None };
            }
            Inspection::Submit(fingerprint) => fingerprint,
        };

        let decision = self.client.evaluate(&fingerprint).await;
        tracing::debug!(
            method = %request.method,
            path = %request.uri.path(),
            outcome = decision.outcome.as_str(),
            "Scoring API decision"
        );

        match (decision.outcome, decision.response) {
            (Outcome::Block, Some(remote)) => {
                stage_block(&remote, outbound, options.nonce.as_deref());
                Verdict::Block {
                    enrichment: decision.enrichment,
                }
            }
            (Outcome::Allow, Some(remote)) => {
                stage_allow(&remote, &mut request.headers, outbound);
                Verdict::Allow {
                    enrichment: decision.enrichment,
                }
            }
            _ => Verdict::Allow { enrichment: None },
        }
    }

    /// Inspect one request and run exactly one of the continuations.
    pub async fn handle<A, B, T>(
        &self,
        request: &mut Parts,
        connection: &ClientConnection,
        outbound: &mut OutboundResponse,
        on_allow: A,
        on_block: B,
        options: &InspectOptions,
    ) -> T
    where
        A: FnOnce(Option<EnrichmentHeaders>) -> T,
        B: FnOnce(Option<EnrichmentHeaders>) -> T,
    {
        match self.inspect(request, connection, outbound, options).await {
            Verdict::Allow { enrichment } => on_allow(enrichment),
            Verdict::Block { enrichment } => on_block(enrichment),
        }
    }

    /// Subscribe to the notifications published by [`Gate::auth`] from now on.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<GateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Inspect one request and publish the result as `Valid` or `Blocked`.
    ///
    /// Returns the id carried by the published event alongside the verdict.
    pub async fn auth(
        &self,
        request: &mut Parts,
        connection: &ClientConnection,
        outbound: &mut OutboundResponse,
        options: &InspectOptions,
    ) -> (u64, Verdict) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let verdict = self.inspect(request, connection, outbound, options).await;
        let method = request.method.clone();
        let uri = request.uri.clone();
        let enrichment = verdict.enrichment().cloned();
        let event = if verdict.is_blocked() {
            GateEvent::Blocked {
                id,
                method,
                uri,
                enrichment,
            }
        } else {
            GateEvent::Valid {
                id,
                method,
                uri,
                enrichment,
            }
        };
        self.publish(event);
        (id, verdict)
    }

    fn publish(&self, event: GateEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Closed receivers are pruned here.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn compile(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, GateError> {
    pattern
        .map(|p| Regex::new(p).map_err(|source| GateError::Pattern { field, source }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn config() -> GateConfig {
        GateConfig {
            api_key: "k".into(),
            // Nothing listens here; bypassed requests must never notice.
            endpoint: "127.0.0.1".into(),
            ssl: false,
            port: 9,
            server_name: Some("test-host".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = config();
        config.uri_regex = Some("(".into());
        let err = Gate::new(&config).unwrap_err();
        assert!(matches!(err, GateError::Pattern { field: "uri_regex", .. }));
    }

    #[tokio::test]
    async fn test_excluded_path_allows_without_enrichment() {
        let gate = Gate::new(&config()).unwrap();
        let (mut parts, _) = Request::get("/assets/logo.png").body(()).unwrap().into_parts();
        let mut outbound = OutboundResponse::new();

        let verdict = gate
            .inspect(&mut parts, &ClientConnection::default(), &mut outbound, &InspectOptions::default())
            .await;

        assert_eq!(verdict, Verdict::Allow { enrichment: None });
        assert!(outbound.headers.is_empty());
        assert_eq!(outbound.status, None);
    }

    #[tokio::test]
    async fn test_auth_publishes_valid_for_bypass() {
        let mut config = config();
        config.uri_regex = Some("^/protected".into());
        let gate = Gate::new(&config).unwrap();
        let mut events = gate.subscribe();
        let (mut parts, _) = Request::get("/public").body(()).unwrap().into_parts();

        let (id, verdict) = gate
            .auth(
                &mut parts,
                &ClientConnection::default(),
                &mut OutboundResponse::new(),
                &InspectOptions::default(),
            )
            .await;

        assert!(!verdict.is_blocked());
        match events.recv().await.unwrap() {
            GateEvent::Valid {
                id: event_id,
                uri,
                enrichment,
                ..
            } => {
                assert_eq!(event_id, id);
                assert_eq!(uri.path(), "/public");
                assert_eq!(enrichment, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_burst_of_auth_calls_delivers_every_event() {
        let gate = Gate::new(&config()).unwrap();
        let mut events = gate.subscribe();
        let mut ids = Vec::new();

        for n in 0..200 {
            let uri = format!("/a{}.png", n);
            let (mut parts, _) = Request::get(uri.as_str()).body(()).unwrap().into_parts();
            let (id, _) = gate
                .auth(
                    &mut parts,
                    &ClientConnection::default(),
                    &mut OutboundResponse::new(),
                    &InspectOptions::default(),
                )
                .await;
            ids.push(id);
        }

        let mut delivered = Vec::new();
        while let Ok(event) = events.try_recv() {
            delivered.push(event.id());
        }
        assert_eq!(delivered, ids);

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 200);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let gate = Gate::new(&config()).unwrap();
        let mut kept = gate.subscribe();
        drop(gate.subscribe());
        let (mut parts, _) = Request::get("/logo.png").body(()).unwrap().into_parts();

        gate.auth(
            &mut parts,
            &ClientConnection::default(),
            &mut OutboundResponse::new(),
            &InspectOptions::default(),
        )
        .await;

        assert!(kept.try_recv().is_ok());
        assert_eq!(gate.subscribers.lock().unwrap().len(), 1);
    }
}
