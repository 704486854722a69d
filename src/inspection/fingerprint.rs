//! Request fingerprinting.
//!
//! # Responsibilities
//! - Decide from the path alone whether a request is inspected at all
//! - Snapshot request metadata into the flat field set the scoring API reads
//! - Encode the snapshot as an `application/x-www-form-urlencoded` body
//!
//! # Design Decisions
//! - Process identity and host name are fixed at construction
//! - Absent inputs become empty fields, never missing ones
//! - Oversized inputs are truncated, never rejected

use axum::http::request::Parts;
use regex::Regex;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::inspection::cookies::ClientIdentity;
use crate::inspection::headers::{
    authorization_len, extract, extract_field, header_names, FieldLimit, CLIENT_HINT_FIELDS,
    REQUEST_HEADER_FIELDS,
};

const MODULE_NAME: &str = env!("CARGO_PKG_NAME");
const MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transport facts about the inbound connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConnection {
    pub remote_addr: Option<SocketAddr>,
    /// The client reached us over TLS.
    pub encrypted: bool,
}

/// Why a request skipped the scoring API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// The path matched the exclusion pattern.
    Excluded,
    /// An inclusion pattern is set and the path did not match it.
    NotIncluded,
}

impl BypassReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassReason::Excluded => "excluded",
            BypassReason::NotIncluded => "not_included",
        }
    }
}

/// Path patterns deciding which requests are inspected.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl PathFilter {
    pub fn new(include: Option<Regex>, exclude: Option<Regex>) -> Self {
        Self { include, exclude }
    }

    /// `Some` when `path` must not be sent to the scoring API.
    pub fn check(&self, path: &str) -> Option<BypassReason> {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(path)) {
            return Some(BypassReason::Excluded);
        }
        if self.include.as_ref().is_some_and(|re| !re.is_match(path)) {
            return Some(BypassReason::NotIncluded);
        }
        None
    }
}

/// The request snapshot sent to the scoring API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    fields: Vec<(&'static str, String)>,
    set_client_cookie: bool,
}

impl Fingerprint {
    /// Value of the wire field `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(name, value)| (*name, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The client supplied its identifier explicitly, so the scoring API
    /// should set the identity cookie.
    pub fn requests_client_cookie(&self) -> bool {
        self.set_client_cookie
    }

    /// Form-encoded request body.
    pub fn to_form(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter().map(|(k, v)| (*k, v.as_str())))
            .finish()
    }
}

/// Result of preparing a request for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Let the request through without calling the scoring API.
    Bypass(BypassReason),
    /// Send this fingerprint to the scoring API.
    Submit(Fingerprint),
}

/// Builds fingerprints for one gate instance.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    api_key: String,
    server_name: String,
    client_id_cookie: String,
    filter: PathFilter,
}

impl FingerprintBuilder {
    pub fn new(
        api_key: impl Into<String>,
        server_name: &str,
        client_id_cookie: impl Into<String>,
        filter: PathFilter,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            server_name: FieldLimit::Head(512).apply(server_name).to_string(),
            client_id_cookie: client_id_cookie.into(),
            filter,
        }
    }

    /// Snapshot `request`, or report why it bypasses inspection.
    pub fn build(&self, request: &Parts, connection: &ClientConnection) -> Inspection {
        if let Some(reason) = self.filter.check(request.uri.path()) {
            return Inspection::Bypass(reason);
        }

        let headers = &request.headers;
        let identity = ClientIdentity::from_headers(headers, &self.client_id_cookie);
        let target = request
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let host = FieldLimit::Head(512).apply(extract(headers, "host"));

        let mut fields: Vec<(&'static str, String)> = Vec::with_capacity(48);
        fields.push(("Key", self.api_key.clone()));
        // Wire name as expected by the scoring API.
        fields.push(("RequestMouleName", MODULE_NAME.to_string()));
        fields.push(("ModuleVersion", MODULE_VERSION.to_string()));
        fields.push(("ServerName", self.server_name.clone()));
        fields.push(("APIConnectionState", "new".to_string()));
        fields.push((
            "IP",
            connection
                .remote_addr
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
        ));
        fields.push((
            "Port",
            connection
                .remote_addr
                .map(|addr| addr.port().to_string())
                .unwrap_or_default(),
        ));
        fields.push(("TimeRequest", micros_since_epoch().to_string()));
        fields.push((
            "Protocol",
            if connection.encrypted { "https" } else { "http" }.to_string(),
        ));
        fields.push(("Method", request.method.as_str().to_string()));
        fields.push(("ServerHostname", host.to_string()));
        fields.push(("Request", FieldLimit::Head(2048).apply(target).to_string()));
        fields.push((
            "HeadersList",
            FieldLimit::Head(512).apply(&header_names(headers)).to_string(),
        ));

        for field in REQUEST_HEADER_FIELDS {
            fields.push((field.wire, extract_field(headers, field)));
        }

        fields.push(("CookiesLen", identity.cookies_len.to_string()));
        fields.push((
            "AuthorizationLen",
            authorization_len(headers)
                .map(|len| len.to_string())
                .unwrap_or_default(),
        ));
        fields.push(("PostParamLen", extract(headers, "content-length").to_string()));
        fields.push((
            "ClientID",
            FieldLimit::Head(128)
                .apply(identity.client_id.as_deref().unwrap_or_default())
                .to_string(),
        ));

        for field in CLIENT_HINT_FIELDS {
            fields.push((field.wire, extract_field(headers, field)));
        }

        Inspection::Submit(Fingerprint {
            fields,
            set_client_cookie: identity.from_header,
        })
    }
}

fn micros_since_epoch() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

/// Host name reported as `ServerName`.
pub fn detect_server_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    let output = std::process::Command::new("hostname").output();
    match output {
        Ok(output) if output.status.success() => {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if name.is_empty() {
                "unknown".to_string()
            } else {
                name
            }
        }
        _ => {
            tracing::warn!("Could not detect host name, reporting 'unknown'");
            "unknown".to_string()
        }
    }
}
