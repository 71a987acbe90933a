use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use tally_core::Admission;

use crate::{error::AppError, state::AppState};

/// Resolve the client address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket peer. Unparseable header values fall through
/// to the next source.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(parse_ip);
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_ip)
    };
    forwarded
        .or_else(real_ip)
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_canonical())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        // Some proxies forward `addr:port`.
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

/// Gate in front of the event routes.
///
/// Blocked addresses get an empty 204 so a probing client cannot tell it was
/// filtered; over-limit prefixes get 429.
pub async fn admit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(ip) = client_ip(request.headers(), peer) else {
        return AppError::BadRequest("unable to determine client address".to_string())
            .into_response();
    };

    if state.ip_filter.has_ip(ip) {
        tracing::debug!(%ip, "Blocked address");
        return StatusCode::NO_CONTENT.into_response();
    }

    if !state.config.rate_limit_disable && state.rate_limiter.check(ip) == Admission::Limited {
        tracing::debug!(%ip, "Rate limited");
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().expect("header value"));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:5555".parse().expect("socket addr"))
    }

    #[test]
    fn forwarded_for_first_entry_wins() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h, peer()), Some("203.0.113.7".parse().expect("ip")));
    }

    #[test]
    fn real_ip_is_next_then_peer() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&h, peer()), Some("198.51.100.2".parse().expect("ip")));
        assert_eq!(
            client_ip(&HeaderMap::new(), peer()),
            Some("192.0.2.10".parse().expect("ip"))
        );
    }

    #[test]
    fn garbage_header_falls_through() {
        let h = headers(&[("x-forwarded-for", "unknown")]);
        assert_eq!(client_ip(&h, peer()), Some("192.0.2.10".parse().expect("ip")));
        assert_eq!(client_ip(&h, None), None);
    }

    #[test]
    fn forwarded_address_with_port_is_accepted() {
        let h = headers(&[("x-forwarded-for", "[2001:db8::1]:443")]);
        assert_eq!(client_ip(&h, None), Some("2001:db8::1".parse().expect("ip")));
    }
}
