//! Client address resolution.
//!
//! Runs first in the pipeline. Every later stage (rate limit, IP allowlist,
//! HTTPS redirect) reads the `ClientInfo` extension it inserts instead of
//! looking at headers or the socket on its own.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
};

use super::{Stage, CLIENT_IP_STAGE};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Prefix of IPv4 addresses reported through an IPv6 socket.
const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Which listener accepted the connection. Inserted by the transport layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionScheme {
    Http,
    Https,
}

/// Resolved client address and transport security of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub secure: bool,
}

/// Strips an IPv4-mapped IPv6 prefix so `::ffff:10.0.0.1` compares equal to
/// `10.0.0.1`.
pub fn normalize_ip(ip: &str) -> &str {
    ip.strip_prefix(IPV4_MAPPED_PREFIX).unwrap_or(ip)
}

#[derive(Clone, Copy, Debug)]
pub struct ClientIpState {
    pub trust_proxy: bool,
}

/// The always-present first stage.
pub fn stage(trust_proxy: bool) -> Stage {
    let state = ClientIpState { trust_proxy };
    Stage::new(CLIENT_IP_STAGE, move |router| {
        router.layer(middleware::from_fn_with_state(state, client_ip_layer))
    })
}

/// Middleware that resolves the client address and records it on the
/// current request span.
pub async fn client_ip_layer(
    State(state): State<ClientIpState>,
    mut request: Request,
    next: Next,
) -> Response {
    let info = resolve_client(&request, state.trust_proxy);
    tracing::Span::current().record("client_ip", info.ip.as_str());
    request.extensions_mut().insert(info);
    next.run(request).await
}

/// Resolves the client for a request.
///
/// With `trust_proxy`, the leftmost `X-Forwarded-For` entry is the client and
/// `X-Forwarded-Proto` decides whether the request counts as secure. Without
/// it, only the socket peer and the accepting listener are used.
pub fn resolve_client<B>(request: &axum::http::Request<B>, trust_proxy: bool) -> ClientInfo {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let connection_secure = matches!(
        request.extensions().get::<ConnectionScheme>(),
        Some(ConnectionScheme::Https)
    );

    let forwarded_ip = trust_proxy
        .then(|| first_header_value(headers, X_FORWARDED_FOR))
        .flatten();
    let forwarded_secure = trust_proxy
        .then(|| first_header_value(headers, X_FORWARDED_PROTO))
        .flatten()
        .map(|proto| proto.eq_ignore_ascii_case("https"));

    let ip = forwarded_ip
        .or(peer)
        .map(|ip| normalize_ip(&ip).to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ClientInfo {
        ip,
        secure: forwarded_secure.unwrap_or(connection_secure),
    }
}

/// First comma-separated entry of a header, trimmed.
fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn request_from(peer: &str) -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_normalize_ip() {
        assert_eq!(normalize_ip("::ffff:127.0.0.1"), "127.0.0.1");
        assert_eq!(normalize_ip("127.0.0.1"), "127.0.0.1");
        assert_eq!(normalize_ip("::1"), "::1");
        assert_eq!(normalize_ip(""), "");
    }

    #[test]
    fn test_peer_address_without_proxy_trust() {
        let mut request = request_from("10.1.2.3:5555");
        request
            .headers_mut()
            .insert(X_FORWARDED_FOR, "203.0.113.9".parse().unwrap());

        let info = resolve_client(&request, false);
        assert_eq!(info.ip, "10.1.2.3");
        assert!(!info.secure);
    }

    #[test]
    fn test_forwarded_for_with_proxy_trust() {
        let mut request = request_from("10.1.2.3:5555");
        request.headers_mut().insert(
            X_FORWARDED_FOR,
            "203.0.113.9, 10.0.0.1".parse().unwrap(),
        );
        request
            .headers_mut()
            .insert(X_FORWARDED_PROTO, "https".parse().unwrap());

        let info = resolve_client(&request, true);
        assert_eq!(info.ip, "203.0.113.9");
        assert!(info.secure);
    }

    #[test]
    fn test_proxy_trust_falls_back_to_peer() {
        let request = request_from("[::ffff:192.168.0.7]:443");
        let info = resolve_client(&request, true);
        assert_eq!(info.ip, "192.168.0.7");
    }

    #[test]
    fn test_tls_listener_marks_request_secure() {
        let mut request = request_from("10.1.2.3:5555");
        request.extensions_mut().insert(ConnectionScheme::Https);
        assert!(resolve_client(&request, false).secure);
    }

    #[test]
    fn test_forwarded_proto_overrides_listener_when_trusted() {
        let mut request = request_from("10.1.2.3:5555");
        request.extensions_mut().insert(ConnectionScheme::Https);
        request
            .headers_mut()
            .insert(X_FORWARDED_PROTO, "http".parse().unwrap());
        assert!(!resolve_client(&request, true).secure);
        assert!(resolve_client(&request, false).secure);
    }

    #[test]
    fn test_missing_peer_is_unknown() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(resolve_client(&request, false).ip, "unknown");
    }
}
