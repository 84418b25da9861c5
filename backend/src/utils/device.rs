//! Device fingerprinting from connection metadata.
//!
//! The fingerprint is a coarse, deterministic hash of address + client
//! agent. It groups sessions issued to the same physical client into one
//! token family; it is not a full browser fingerprint and never the sole
//! basis for security attribution.

use axum::http::{header::USER_AGENT, HeaderMap};
use sha2::{Digest, Sha256};

/// Connection metadata the fingerprinter needs, decoupled from any
/// transport framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub remote_addr: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn new(remote_addr: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Builds metadata from request headers. The service normally sits
    /// behind a reverse proxy, so proxy headers take precedence.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let remote_addr = forwarded_for(headers)
            .or_else(|| real_ip(headers))
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|agent| agent.trim().to_string())
            .unwrap_or_default();
        Self {
            remote_addr,
            user_agent,
        }
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn real_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// One-way hash identifying "the same client". Same input pair, same id.
pub fn fingerprint(remote_addr: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(remote_addr.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

/// Best-effort classification of the client agent into a small set of
/// display labels. Order matters: Chromium-family agents also advertise
/// "Safari", and Edge/Opera also advertise "Chrome".
pub fn device_label(user_agent: &str) -> &'static str {
    if user_agent.contains("Edg/") || user_agent.contains("Edge/") {
        "Edge"
    } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
        "Opera"
    } else if user_agent.contains("Firefox/") {
        "Firefox"
    } else if user_agent.contains("CriOS") {
        "Chrome on iOS"
    } else if user_agent.contains("Chrome/") {
        "Chrome"
    } else if user_agent.contains("Safari/") {
        "Safari"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("curl/") {
        "Command line"
    } else {
        "Unknown device"
    }
}
