//! Header extraction and per-field truncation.
//!
//! Every header-derived fingerprint field goes through [`extract`]: a missing
//! header, or one whose value is not visible text, becomes the empty string.

use axum::http::HeaderMap;

/// How a field is cut down to its budget, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLimit {
    /// Keep the first `n` characters.
    Head(usize),
    /// Keep the last `n` characters.
    Tail(usize),
}

impl FieldLimit {
    pub fn apply(self, value: &str) -> &str {
        match self {
            FieldLimit::Head(max) => match value.char_indices().nth(max) {
                Some((cut, _)) => &value[..cut],
                None => value,
            },
            FieldLimit::Tail(max) => {
                let len = value.chars().count();
                if len <= max {
                    return value;
                }
                match value.char_indices().nth(len - max) {
                    Some((cut, _)) => &value[cut..],
                    // Only reachable with a zero budget.
                    None => "",
                }
            }
        }
    }
}

/// A fingerprint field copied from a single request header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderField {
    /// Field name in the form body.
    pub wire: &'static str,
    /// Lowercase request header name.
    pub header: &'static str,
    pub limit: FieldLimit,
}

const fn head(wire: &'static str, header: &'static str, max: usize) -> HeaderField {
    HeaderField {
        wire,
        header,
        limit: FieldLimit::Head(max),
    }
}

/// Plain request headers forwarded to the scoring API.
pub const REQUEST_HEADER_FIELDS: &[HeaderField] = &[
    head("Host", "host", 512),
    head("UserAgent", "user-agent", 768),
    head("Referer", "referer", 1024),
    head("Accept", "accept", 512),
    head("AcceptEncoding", "accept-encoding", 128),
    head("AcceptLanguage", "accept-language", 256),
    head("AcceptCharset", "accept-charset", 128),
    head("Origin", "origin", 512),
    // Most recent hops are at the end of the list.
    HeaderField {
        wire: "XForwardedForIP",
        header: "x-forwarded-for",
        limit: FieldLimit::Tail(512),
    },
    head("X-Requested-With", "x-requested-with", 128),
    head("Connection", "connection", 128),
    head("Pragma", "pragma", 128),
    head("CacheControl", "cache-control", 128),
    head("ContentType", "content-type", 128),
    head("From", "from", 128),
    head("X-Real-IP", "x-real-ip", 128),
    head("Via", "via", 256),
    head("TrueClientIP", "true-client-ip", 128),
];

/// User-agent client hints.
pub const CLIENT_HINT_FIELDS: &[HeaderField] = &[
    head("SecCHUA", "sec-ch-ua", 128),
    head("SecCHUAArch", "sec-ch-ua-arch", 16),
    head("SecCHUAFullVersionList", "sec-ch-ua-full-version-list", 256),
    head("SecCHUAPlatform", "sec-ch-ua-platform", 32),
    head("SecCHUAModel", "sec-ch-ua-model", 128),
    head("SecCHUAMobile", "sec-ch-ua-mobile", 8),
    head("SecCHDeviceMemory", "sec-ch-device-memory", 8),
];

/// Value of `name`, or `""` when absent or not valid visible text.
pub fn extract<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Extracted and truncated value for `field`.
pub fn extract_field(headers: &HeaderMap, field: &HeaderField) -> String {
    field.limit.apply(extract(headers, field.header)).to_string()
}

/// Comma-separated list of the header names present, in arrival order.
pub fn header_names(headers: &HeaderMap) -> String {
    headers
        .keys()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Character length of the `authorization` header, `None` when absent.
pub fn authorization_len(headers: &HeaderMap) -> Option<usize> {
    headers
        .get("authorization")
        .map(|_| extract(headers, "authorization").chars().count())
}
