//! Standard security response headers.
//!
//! The bundle mirrors the defaults most web stacks ship (CSP, HSTS,
//! frame/sniffing protection, cross-origin isolation). Handlers that set one
//! of these headers themselves keep their value.

use axum::http::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

use super::{Capability, Stage, SECURITY_HEADERS_STAGE};
use crate::config::HelmetConfig;

/// Header names must be lowercase.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
         form-action 'self';frame-ancestors 'self';img-src 'self' data:;\
         object-src 'none';script-src 'self';script-src-attr 'none';\
         style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Built-in security headers capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHeaders;

impl Capability<HelmetConfig> for SecurityHeaders {
    fn stage(&self, _config: &HelmetConfig) -> Option<Stage> {
        Some(Stage::new(SECURITY_HEADERS_STAGE, |router| {
            SECURITY_HEADERS.iter().fold(router, |router, &(name, value)| {
                router.layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                ))
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Pipeline;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        let stage = SecurityHeaders.stage(&HelmetConfig { enabled: true }).unwrap();
        let routes = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/framed",
                get(|| async { ([(header::X_FRAME_OPTIONS, "DENY")], "ok").into_response() }),
            );
        Pipeline::from(vec![stage]).apply(routes)
    }

    #[test]
    fn test_header_table_is_valid() {
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(*name, name.to_ascii_lowercase());
            HeaderValue::from_str(value).unwrap();
        }
    }

    #[tokio::test]
    async fn test_headers_are_added() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(response.headers().get(*name).unwrap(), value, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_handler_value_wins() {
        let response = app()
            .oneshot(Request::builder().uri("/framed").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers().get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    }
}
