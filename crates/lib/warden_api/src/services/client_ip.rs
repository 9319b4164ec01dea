//! Client address resolution.
//!
//! Forwarding headers are only consulted when a trusted proxy sets them.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::AppState;

/// Address reported when nothing better is known.
pub const UNKNOWN_IP: &str = "unknown";

fn header_ip<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN_IP))
}

/// First `X-Forwarded-For` entry, then `X-Real-IP` (both only when
/// `trust_proxy_headers`), then the peer address.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers
        && let Some(ip) =
            header_ip(headers, "x-forwarded-for").or_else(|| header_ip(headers, "x-real-ip"))
    {
        return ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Extractor yielding the caller's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(resolve_client_ip(
            &parts.headers,
            peer,
            state.config.trust_proxy_headers,
        )))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:51000".parse().unwrap())
    }

    #[test]
    fn untrusted_headers_are_ignored() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7")]);
        assert_eq!(resolve_client_ip(&h, peer(), false), "192.0.2.10");
    }

    #[test]
    fn forwarded_for_takes_first_entry() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(resolve_client_ip(&h, peer(), true), "203.0.113.7");
    }

    #[test]
    fn unknown_falls_through() {
        let h = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(resolve_client_ip(&h, peer(), true), "198.51.100.2");

        let h = headers(&[("x-real-ip", "unknown")]);
        assert_eq!(resolve_client_ip(&h, peer(), true), "192.0.2.10");
    }

    #[test]
    fn no_peer_is_unknown() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None, true), UNKNOWN_IP);
    }
}
