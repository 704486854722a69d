//! Propagation of scoring API headers and bodies.
//!
//! # Responsibilities
//! - Read the manifest headers the scoring API uses to name significant headers
//! - Copy listed headers onto the outbound response or into the inbound request
//! - Stage the block page, optionally stamping a CSP nonce on inline tags
//!
//! # Design Decisions
//! - Manifest entries that are missing or unparsable are skipped, never fatal
//! - `Set-Cookie` is multi-valued: new values go first, staged ones are kept

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderName, HeaderValue, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::HashMap;

use crate::inspection::decision::RemoteResponse;

/// Manifest naming remote headers to copy onto the outbound response.
pub const RESPONSE_HEADERS_MANIFEST: &str = "x-armigate-headers";

/// Manifest naming remote headers to surface to the application.
pub const REQUEST_HEADERS_MANIFEST: &str = "x-armigate-request-headers";

/// Classification signals returned by the scoring API, keyed by lowercase
/// header name (e.g. `x-armigate-isbot`, `x-armigate-botname`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnrichmentHeaders(HashMap<String, String>);

impl EnrichmentHeaders {
    /// Collect the headers listed by [`REQUEST_HEADERS_MANIFEST`].
    ///
    /// `None` when the manifest itself is absent.
    pub fn from_manifest(remote: &HeaderMap) -> Option<Self> {
        let names = manifest(remote, REQUEST_HEADERS_MANIFEST)?;
        let headers = names
            .filter_map(|name| {
                let name = name.to_ascii_lowercase();
                let value = remote.get(name.as_str())?.to_str().ok()?;
                (!value.is_empty()).then(|| (name, value.to_string()))
            })
            .collect();
        Some(Self(headers))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl FromIterator<(String, String)> for EnrichmentHeaders {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        )
    }
}

/// The response the host will send, as staged by the gate.
///
/// Hosts may pre-populate `headers`; the gate adds to them and, on a block,
/// also fills `status` and `body`.
#[derive(Debug, Clone, Default)]
pub struct OutboundResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    /// Merge staged headers into a response produced downstream.
    ///
    /// Staged headers act as defaults: a header the downstream handler set
    /// is kept as is, except `Set-Cookie`, whose staged values go first.
    pub fn merge_into(self, target: &mut HeaderMap) {
        let mut current: Option<HeaderName> = None;
        let mut pending: Vec<HeaderValue> = Vec::new();
        for (name, value) in self.headers {
            if let Some(name) = name {
                if let Some(previous) = current.replace(name) {
                    merge_default(target, previous, std::mem::take(&mut pending));
                }
            }
            pending.push(value);
        }
        if let Some(name) = current {
            merge_default(target, name, pending);
        }
    }
}

impl IntoResponse for OutboundResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.unwrap_or_default()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::FORBIDDEN);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Copy the headers listed by [`RESPONSE_HEADERS_MANIFEST`] onto `outbound`.
pub fn copy_response_headers(remote: &HeaderMap, outbound: &mut HeaderMap) {
    let Some(names) = manifest(remote, RESPONSE_HEADERS_MANIFEST) else {
        return;
    };
    for name in names {
        let Some(name) = parse_name(name) else {
            continue;
        };
        let values: Vec<HeaderValue> = remote.get_all(&name).iter().cloned().collect();
        if !values.is_empty() {
            put(outbound, name, values);
        }
    }
}

/// Inject the headers listed by [`REQUEST_HEADERS_MANIFEST`] into the
/// inbound request so downstream handlers observe them.
pub fn inject_request_headers(remote: &HeaderMap, inbound: &mut HeaderMap) {
    let Some(names) = manifest(remote, REQUEST_HEADERS_MANIFEST) else {
        return;
    };
    for name in names {
        let Some(name) = parse_name(name) else {
            continue;
        };
        if let Some(value) = remote.get(&name) {
            inbound.insert(name, value.clone());
        }
    }
}

/// Insert `nonce="<nonce>" ` right after every `<script` and `<style` tag name.
pub fn add_nonce(body: &str, nonce: &str) -> String {
    body.replace("<script", &format!("<script nonce=\"{}\" ", nonce))
        .replace("<style", &format!("<style nonce=\"{}\" ", nonce))
}

/// Stage the block page from the scoring API on `outbound`.
pub fn stage_block(remote: &RemoteResponse, outbound: &mut OutboundResponse, nonce: Option<&str>) {
    copy_response_headers(&remote.headers, &mut outbound.headers);
    outbound.status = Some(remote.status);

    let body = match (nonce, std::str::from_utf8(&remote.body)) {
        (Some(nonce), Ok(text)) => Bytes::from(add_nonce(text, nonce)),
        (Some(_), Err(_)) => {
            tracing::warn!("Block page is not UTF-8, nonce not applied");
            remote.body.clone()
        }
        (None, _) => remote.body.clone(),
    };
    outbound.body = Some(body);
}

/// Apply an allow decision to the inbound request and staged response.
pub fn stage_allow(remote: &RemoteResponse, inbound: &mut HeaderMap, outbound: &mut OutboundResponse) {
    copy_response_headers(&remote.headers, &mut outbound.headers);
    inject_request_headers(&remote.headers, inbound);
}

/// `Set-Cookie` values are prepended to those already present; any other
/// header is replaced.
fn put(target: &mut HeaderMap, name: HeaderName, values: Vec<HeaderValue>) {
    let kept: Vec<HeaderValue> = if name == SET_COOKIE {
        target.get_all(&name).iter().cloned().collect()
    } else {
        Vec::new()
    };
    target.remove(&name);
    for value in values.into_iter().chain(kept) {
        target.append(name.clone(), value);
    }
}

fn merge_default(target: &mut HeaderMap, name: HeaderName, values: Vec<HeaderValue>) {
    if name == SET_COOKIE || !target.contains_key(&name) {
        put(target, name, values);
    }
}

fn manifest<'a>(headers: &'a HeaderMap, key: &str) -> Option<impl Iterator<Item = &'a str>> {
    let listed = headers.get(key)?.to_str().ok()?;
    Some(listed.split(' ').filter(|name| !name.is_empty()))
}

fn parse_name(name: &str) -> Option<HeaderName> {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            tracing::warn!(header = %name, "Ignoring invalid header name in manifest");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16, headers: &[(&'static str, &'static str)], body: &'static str) -> RemoteResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        RemoteResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn values(headers: &HeaderMap, name: &str) -> Vec<String> {
        headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_nonce_inserted_after_tag_name() {
        assert_eq!(
            add_nonce("<script>x</script>", "abc"),
            "<script nonce=\"abc\" >x</script>"
        );
        assert_eq!(
            add_nonce("<style type=\"text/css\">p{}</style><script src=\"a.js\"></script>", "n"),
            "<style nonce=\"n\"  type=\"text/css\">p{}</style><script nonce=\"n\"  src=\"a.js\"></script>"
        );
    }

    #[test]
    fn test_set_cookie_is_prepended() {
        let remote = remote(403, &[("x-armigate-headers", "Set-Cookie"), ("set-cookie", "a=1")], "");
        let mut outbound = HeaderMap::new();
        outbound.insert(SET_COOKIE, HeaderValue::from_static("b=2"));

        copy_response_headers(&remote.headers, &mut outbound);

        assert_eq!(values(&outbound, "set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_other_headers_overwrite() {
        let remote = remote(
            403,
            &[
                ("x-armigate-headers", "Content-Type Cache-Control X-Missing"),
                ("content-type", "text/html"),
                ("cache-control", "no-store"),
            ],
            "",
        );
        let mut outbound = HeaderMap::new();
        outbound.insert("content-type", HeaderValue::from_static("application/json"));

        copy_response_headers(&remote.headers, &mut outbound);

        assert_eq!(values(&outbound, "content-type"), vec!["text/html"]);
        assert_eq!(values(&outbound, "cache-control"), vec!["no-store"]);
        assert!(!outbound.contains_key("x-missing"));
    }

    #[test]
    fn test_no_manifest_copies_nothing() {
        let remote = remote(403, &[("set-cookie", "a=1")], "");
        let mut outbound = HeaderMap::new();
        copy_response_headers(&remote.headers, &mut outbound);
        assert!(outbound.is_empty());
        assert_eq!(EnrichmentHeaders::from_manifest(&remote.headers), None);
    }

    #[test]
    fn test_enrichment_from_manifest() {
        let remote = remote(
            200,
            &[
                ("x-armigate-request-headers", "X-ARmigate-IsBot X-ARmigate-BotName x-absent"),
                ("x-armigate-isbot", "1"),
                ("x-armigate-botname", "crawler"),
            ],
            "",
        );
        let enrichment = EnrichmentHeaders::from_manifest(&remote.headers).unwrap();
        assert_eq!(enrichment.len(), 2);
        assert_eq!(enrichment.get("x-armigate-isbot"), Some("1"));
        assert_eq!(enrichment.get("X-ARmigate-BotName"), Some("crawler"));
        assert_eq!(enrichment.get("x-absent"), None);
    }

    #[test]
    fn test_request_headers_injected() {
        let remote = remote(
            200,
            &[
                ("x-armigate-request-headers", "X-ARmigate-IsBot"),
                ("x-armigate-isbot", "0"),
            ],
            "",
        );
        let mut inbound = HeaderMap::new();
        inbound.insert("x-armigate-isbot", HeaderValue::from_static("spoofed"));

        inject_request_headers(&remote.headers, &mut inbound);

        assert_eq!(values(&inbound, "x-armigate-isbot"), vec!["0"]);
    }

    #[test]
    fn test_stage_block() {
        let remote = remote(
            403,
            &[("x-armigate-headers", "Content-Type"), ("content-type", "text/html")],
            "<script>x</script>",
        );
        let mut outbound = OutboundResponse::new();
        stage_block(&remote, &mut outbound, Some("abc"));

        assert_eq!(outbound.status, Some(StatusCode::FORBIDDEN));
        assert_eq!(
            outbound.body.as_deref(),
            Some(&b"<script nonce=\"abc\" >x</script>"[..])
        );
        assert_eq!(values(&outbound.headers, "content-type"), vec!["text/html"]);

        let mut plain = OutboundResponse::new();
        stage_block(&remote, &mut plain, None);
        assert_eq!(plain.body.as_deref(), Some(&b"<script>x</script>"[..]));
    }

    #[test]
    fn test_merge_into_downstream_response() {
        let mut staged = OutboundResponse::new();
        staged.headers.append(SET_COOKIE, HeaderValue::from_static("armigate=id"));
        staged.headers.append(SET_COOKIE, HeaderValue::from_static("x=1"));
        staged.headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        staged.headers.insert("cache-control", HeaderValue::from_static("no-store"));

        let mut downstream = HeaderMap::new();
        downstream.insert(SET_COOKIE, HeaderValue::from_static("session=s"));
        downstream.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));

        staged.merge_into(&mut downstream);

        assert_eq!(
            values(&downstream, "set-cookie"),
            vec!["armigate=id", "x=1", "session=s"]
        );
        // The handler's own value wins; staged headers only fill gaps.
        assert_eq!(values(&downstream, "x-frame-options"), vec!["SAMEORIGIN"]);
        assert_eq!(values(&downstream, "cache-control"), vec!["no-store"]);
    }
}
