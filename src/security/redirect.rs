//! HTTP to HTTPS redirect stage.
//!
//! Requests that did not arrive over TLS (or, behind a trusted proxy, were
//! not forwarded as `https`) are sent to the same path and query on the
//! HTTPS origin of their `Host`.

use axum::{
    extract::Request,
    http::{header::HOST, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};

use super::{ClientInfo, Stage, HTTPS_REDIRECT_STAGE};

pub fn stage() -> Stage {
    Stage::new(HTTPS_REDIRECT_STAGE, |router| {
        router.layer(middleware::from_fn(https_redirect_layer))
    })
}

async fn https_redirect_layer(request: Request, next: Next) -> Response {
    let secure = request
        .extensions()
        .get::<ClientInfo>()
        .is_some_and(|client| client.secure);
    if secure {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty());

    match host {
        Some(host) => {
            let target = https_url(host, request.uri());
            tracing::debug!(from = %request.uri(), to = %target, "Redirecting HTTP to HTTPS");
            Redirect::temporary(&target).into_response()
        }
        None => (StatusCode::BAD_REQUEST, "Missing Host header").into_response(),
    }
}

/// HTTPS URL for the same host, path and query.
pub fn https_url(host: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("https://{}{}", host, path_and_query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{client_ip, ConnectionScheme, Pipeline};
    use axum::body::Body;
    use axum::http::header::LOCATION;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(trust_proxy: bool) -> Router {
        Pipeline::from(vec![client_ip::stage(trust_proxy), stage()])
            .apply(Router::new().route("/page", get(|| async { "ok" })))
    }

    #[test]
    fn test_https_url_keeps_path_and_query() {
        let uri: Uri = "/page?x=1&y=2".parse().unwrap();
        assert_eq!(https_url("example.com", &uri), "https://example.com/page?x=1&y=2");

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(https_url("example.com:8080", &uri), "https://example.com:8080/");
    }

    #[tokio::test]
    async fn test_plain_request_is_redirected() {
        let request = axum::http::Request::builder()
            .uri("/page?q=rust")
            .header(HOST, "example.com")
            .body(Body::empty())
            .unwrap();

        let response = app(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://example.com/page?q=rust"
        );
    }

    #[tokio::test]
    async fn test_tls_request_passes() {
        let mut request = axum::http::Request::builder()
            .uri("/page")
            .header(HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectionScheme::Https);

        let response = app(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_https_passes_behind_trusted_proxy() {
        let request = axum::http::Request::builder()
            .uri("/page")
            .header(HOST, "example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();

        let response = app(true).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_host_is_bad_request() {
        let request = axum::http::Request::builder()
            .uri("/page")
            .body(Body::empty())
            .unwrap();

        let response = app(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
