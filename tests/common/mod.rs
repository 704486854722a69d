//! Shared utilities for integration testing against a mock scoring API.

#![allow(dead_code)]

use armigate::GateConfig;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// What the mock scoring API answers with.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: &'static str,
    pub delay: Duration,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: "",
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn body(mut self, body: &'static str) -> Self {
        self.body = body;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request received by the mock scoring API.
#[derive(Debug, Clone)]
pub struct Received {
    pub headers: HeaderMap,
    pub form: HashMap<String, String>,
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    received: Arc<Mutex<Vec<Received>>>,
}

/// Handle to a running mock scoring API.
pub struct MockScoring {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MockScoring {
    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// Gate configuration pointing at this mock.
    pub fn gate_config(&self, timeout_ms: u64) -> GateConfig {
        gate_config_for(self.addr, timeout_ms)
    }
}

pub fn gate_config_for(addr: SocketAddr, timeout_ms: u64) -> GateConfig {
    GateConfig {
        api_key: "test-key".into(),
        endpoint: addr.ip().to_string(),
        ssl: false,
        port: addr.port(),
        timeout_ms,
        server_name: Some("test-host".into()),
        ..Default::default()
    }
}

/// Start a mock scoring API on an ephemeral port answering every request
/// with `reply`.
pub async fn start_mock_scoring(reply: Reply) -> MockScoring {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let state = MockState {
        reply,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/v1/roz/inspect", post(inspect_handler))
        .with_state(state);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockScoring { addr, received }
}

async fn inspect_handler(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let form = url::form_urlencoded::parse(&body).into_owned().collect();
    state
        .received
        .lock()
        .unwrap()
        .push(Received { headers, form });

    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }

    let mut response = state.reply.body.into_response();
    *response.status_mut() = StatusCode::from_u16(state.reply.status).unwrap();
    let response_headers = response.headers_mut();
    response_headers.remove("content-type");
    for &(name, value) in &state.reply.headers {
        response_headers.append(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// An address on which nothing is listening.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Log events recorded on the current thread while installed.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing_subscriber::registry().with(self.clone()).set_default()
    }

    /// Messages logged at error level.
    pub fn errors(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == Level::ERROR)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), message.0));
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}
