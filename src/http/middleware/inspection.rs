//! Inspection middleware.
//! Runs the gate in front of every request.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::http::request::{client_connection, inspect_options};
use crate::inspection::{Gate, OutboundResponse, Verdict};

/// Blocked requests get the scoring API's page; allowed requests continue
/// with any enrichment headers attached as a request extension.
///
/// Staged response headers only fill in what the handler did not set,
/// except `Set-Cookie`, whose staged values are placed first.
///
/// The peer address comes from `ConnectInfo<SocketAddr>`, so serve with
/// `into_make_service_with_connect_info`. Origin-form requests carry no
/// scheme, so behind a TLS listener the host must insert a
/// [`ClientConnection`](crate::inspection::ClientConnection) extension with
/// `encrypted: true`; otherwise the scoring API sees `Protocol=http`.
pub async fn inspection_middleware(
    State(gate): State<Arc<Gate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let connection = client_connection(&parts);
    let options = inspect_options(&parts);
    let mut outbound = OutboundResponse::new();

    match gate
        .inspect(&mut parts, &connection, &mut outbound, &options)
        .await
    {
        Verdict::Block { enrichment } => {
            tracing::info!(
                method = %parts.method,
                path = %parts.uri.path(),
                enrichment = ?enrichment,
                "Request blocked"
            );
            outbound.into_response()
        }
        Verdict::Allow { enrichment } => {
            if let Some(enrichment) = enrichment {
                parts.extensions.insert(enrichment);
            }
            let mut response = next.run(Request::from_parts(parts, body)).await;
            outbound.merge_into(response.headers_mut());
            response
        }
    }
}
