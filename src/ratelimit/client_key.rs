//! Client key generation and handling.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Header carrying the original client address when behind a proxy.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Key used when neither a forwarded address nor a peer address is known.
const UNKNOWN_CLIENT: &str = "unknown";

/// A key that identifies the caller a sliding window belongs to.
///
/// Keys are never empty; blank input falls back to `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from an arbitrary identifier.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            Self(UNKNOWN_CLIENT.to_string())
        } else if trimmed.len() == key.len() {
            Self(key)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Derive the key from request headers and the peer address.
    ///
    /// Uses the first non-empty entry of `X-Forwarded-For`, else the peer IP.
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .find(|entry| !entry.is_empty())
            });

        match (forwarded, peer) {
            (Some(addr), _) => Self::new(addr),
            (None, Some(peer)) => Self(peer.ip().to_string()),
            (None, None) => Self(UNKNOWN_CLIENT.to_string()),
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
