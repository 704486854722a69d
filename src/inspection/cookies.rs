//! Client identity derived from the `Cookie` header.

use axum::http::HeaderMap;
use percent_encoding::percent_decode_str;
use std::collections::HashSet;

use crate::inspection::headers::extract;

/// Request header that carries an explicit client identifier.
pub const CLIENT_ID_HEADER: &str = "x-armigate-clientid";

/// Who the client claims to be, and how much cookie data it sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Identifier from the identity header, else the identity cookie.
    pub client_id: Option<String>,
    /// Total decoded length of all distinct cookie values, in characters.
    pub cookies_len: usize,
    /// The identifier came from [`CLIENT_ID_HEADER`].
    pub from_header: bool,
}

impl ClientIdentity {
    /// Derive the identity of the request carrying `headers`.
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        let raw = headers
            .get_all("cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");

        let mut identity = Self::default();
        for (name, value) in parse_cookies(&raw) {
            identity.cookies_len += value.chars().count();
            if name == cookie_name {
                identity.client_id = Some(value);
            }
        }

        if headers.contains_key(CLIENT_ID_HEADER) {
            identity.client_id = Some(extract(headers, CLIENT_ID_HEADER).to_string());
            identity.from_header = true;
        }

        identity
    }
}

/// Split a `Cookie` header into decoded pairs, first occurrence of a name wins.
pub fn parse_cookies(raw: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut cookies = Vec::new();

    for pair in raw.split(';') {
        let pair = pair.trim_start_matches(' ');
        let Some(eq) = pair.find('=').filter(|&eq| eq > 0) else {
            continue;
        };
        let name = pair[..eq].trim();
        let mut value = pair[eq + 1..].trim();

        if let Some(quoted) = value.strip_prefix('"') {
            let mut chars = quoted.chars();
            chars.next_back();
            value = chars.as_str();
        }

        if seen.insert(name.to_string()) {
            cookies.push((name.to_string(), decode_component(value)));
        }
    }

    cookies
}

/// Percent-decode a cookie value; malformed input is returned unchanged.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let well_formed = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return raw.to_string();
    }

    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}
