//! HTTP route handlers.
//!
//! API routes are never cached; static files get a short cache lifetime.
//! Every route, including the static fallback, sits behind the security
//! pipeline. When request logging is enabled, a request-log middleware wraps
//! the pipeline so rejections are logged with the same request_id.

pub mod client_log;
pub mod health;
pub mod info;
pub mod snippet;
pub mod system;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CACHE_CONTROL_API, CACHE_CONTROL_STATIC};
use crate::http::static_files::create_static_service;
use crate::middleware::request_log_layer;
use crate::security::Pipeline;
use crate::state::AppState;

/// Creates the Axum router with all routes wrapped in `pipeline`.
pub fn create_router(state: AppState, pipeline: Pipeline) -> Router {
    // API - live process state, no caching
    let api_routes = Router::new()
        .route("/api/info", get(info::info))
        .route("/api/system", get(system::system))
        .route("/api/snippet", get(snippet::snippet))
        .route("/log", get(client_log::client_log))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_API),
        ));

    // Health check - no caching, always fresh for liveness probes
    let health_routes = Router::new().route("/health", get(health::health));

    let mut router = Router::new().merge(api_routes).merge(health_routes);

    // Static files - everything no route claims
    if let Some(static_service) = state.config.static_dir.as_deref().and_then(create_static_service) {
        let static_routes = Router::new().fallback_service(static_service).layer(
            SetResponseHeaderLayer::if_not_present(
                CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_STATIC),
            ),
        );
        router = router.merge(static_routes);
    }

    let log_requests = state.config.logging.req;
    let router = pipeline.apply(router.with_state(state));

    if log_requests {
        // Request log middleware - creates root span with request_id for correlation
        router.layer(middleware::from_fn(request_log_layer))
    } else {
        router
    }
}
