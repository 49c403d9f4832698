//! API-key extraction, trusted-proxy client-IP derivation and request IDs.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use ipnetwork::IpNetwork;

/// Extracts the API key from a request, in priority order: `X-API-Key`
/// header, `Authorization: Bearer`, then the `api_key` query parameter when
/// enabled. Returns an empty string when absent.
pub fn extract_api_key(headers: &HeaderMap, query: &[(String, String)], allow_query: bool) -> String {
    if let Some(v) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let v = v.trim();
        if !v.is_empty() {
            return v.to_string();
        }
    }

    if let Some(a) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let a = a.trim();
        if let Some(prefix) = a.get(..7) {
            if prefix.eq_ignore_ascii_case("bearer ") {
                return a[7..].trim().to_string();
            }
        }
    }

    if !allow_query {
        return String::new();
    }

    query
        .iter()
        .find(|(k, _)| k == "api_key")
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default()
}

/// Derives the client IP for rate limiting. `X-Forwarded-For` and
/// `X-Real-IP` are only honored when the immediate peer is inside one of
/// the trusted proxy CIDRs.
pub fn client_ip(peer: Option<SocketAddr>, headers: &HeaderMap, trusted: &[IpNetwork]) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    let ip = peer.ip();

    if trusted.iter().any(|net| net.contains(ip)) {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            for part in xff.split(',') {
                if let Ok(cand) = part.trim().parse::<IpAddr>() {
                    return cand.to_string();
                }
            }
        }
        if let Some(xr) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            if let Ok(cand) = xr.trim().parse::<IpAddr>() {
                return cand.to_string();
            }
        }
    }

    ip.to_string()
}

/// 16 random bytes, hex encoded.
pub fn new_request_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
