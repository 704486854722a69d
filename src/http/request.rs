//! Inbound request facts the gate needs from the host.
//!
//! # Responsibilities
//! - Recover peer address and TLS flag from request extensions
//! - Carry the per-request CSP nonce set by earlier middleware

use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::uri::Scheme;
use std::net::SocketAddr;

use crate::inspection::{ClientConnection, InspectOptions};

/// CSP nonce for the current response, inserted as a request extension by
/// whatever layer generates the `Content-Security-Policy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(pub String);

/// Connection facts for `parts`.
///
/// A [`ClientConnection`] extension wins; otherwise the peer comes from
/// axum's `ConnectInfo` and TLS is inferred from an `https` request URI.
/// Origin-form URIs have no scheme, so TLS listeners must supply the
/// extension to report `encrypted`.
pub fn client_connection(parts: &Parts) -> ClientConnection {
    if let Some(connection) = parts.extensions.get::<ClientConnection>() {
        return connection.clone();
    }
    ClientConnection {
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        encrypted: parts.uri.scheme() == Some(&Scheme::HTTPS),
    }
}

/// Per-call options for `parts`.
pub fn inspect_options(parts: &Parts) -> InspectOptions {
    InspectOptions {
        nonce: parts.extensions.get::<CspNonce>().map(|n| n.0.clone()),
    }
}
