//! Exact-match client IP gate.
//!
//! Entries and client addresses are both normalized with
//! [`normalize_ip`], so `::ffff:127.0.0.1` and `127.0.0.1` are the same
//! entry. Ranges and CIDR notation are not interpreted.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use super::{normalize_ip, ClientInfo, Stage, IP_ALLOWLIST_STAGE};
use crate::config::IpAllowlistConfig;

pub const REJECTION_MESSAGE: &str = "Forbidden (IP allowlist)";

/// Normalized set of allowed client addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllowlist {
    allowed: HashSet<String>,
}

impl IpAllowlist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: entries
                .into_iter()
                .map(|entry| normalize_ip(entry.as_ref().trim()).to_string())
                .collect(),
        }
    }

    pub fn allows(&self, ip: &str) -> bool {
        self.allowed.contains(normalize_ip(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Builds the gate stage, or `None` when it is disabled or has no entries.
pub fn stage(config: &IpAllowlistConfig) -> Option<Stage> {
    if !config.enabled || config.ranges.is_empty() {
        return None;
    }
    let allowlist = Arc::new(IpAllowlist::new(&config.ranges));
    Some(Stage::new(IP_ALLOWLIST_STAGE, move |router| {
        router.layer(middleware::from_fn_with_state(allowlist, ip_allowlist_layer))
    }))
}

async fn ip_allowlist_layer(
    State(allowlist): State<Arc<IpAllowlist>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ClientInfo>()
        .map(|client| client.ip.clone())
        .unwrap_or_default();

    if allowlist.allows(&ip) {
        next.run(request).await
    } else {
        tracing::warn!(client = %ip, "Client not in IP allowlist");
        (StatusCode::FORBIDDEN, REJECTION_MESSAGE).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{client_ip, Pipeline};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    #[test]
    fn test_allows_normalized_entries() {
        let allowlist = IpAllowlist::new(["::ffff:127.0.0.1", "::1", "10.0.0.5 "]);
        assert!(allowlist.allows("127.0.0.1"));
        assert!(allowlist.allows("::ffff:127.0.0.1"));
        assert!(allowlist.allows("::1"));
        assert!(allowlist.allows("10.0.0.5"));
        assert!(!allowlist.allows("10.0.0.6"));
    }

    #[test]
    fn test_no_prefix_matching() {
        let allowlist = IpAllowlist::new(["10.0.0.0"]);
        assert!(!allowlist.allows("10.0.0.1"));
        let allowlist = IpAllowlist::new(["10.0.0.0/24"]);
        assert!(!allowlist.allows("10.0.0.1"));
    }

    #[test]
    fn test_stage_requires_enabled_and_entries() {
        let mut config = IpAllowlistConfig::default();
        assert!(stage(&config).is_none());

        config.enabled = true;
        assert!(stage(&config).is_some());

        config.ranges.clear();
        assert!(stage(&config).is_none());
    }

    async fn status_for(peer: &str) -> StatusCode {
        let config = IpAllowlistConfig {
            enabled: true,
            ranges: vec!["127.0.0.1".to_string()],
        };
        let stages = vec![client_ip::stage(false), stage(&config).unwrap()];
        let app = Pipeline::from(stages).apply(Router::new().route("/", get(|| async { "ok" })));

        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_gate_rejects_unlisted_clients() {
        assert_eq!(status_for("127.0.0.1:4000").await, StatusCode::OK);
        assert_eq!(status_for("[::ffff:127.0.0.1]:4000").await, StatusCode::OK);
        assert_eq!(status_for("192.168.1.20:4000").await, StatusCode::FORBIDDEN);
    }
}
