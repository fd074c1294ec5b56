//! Cross-origin resource sharing.
//!
//! Two policies exist. In development with `allow_all_in_dev`, every origin
//! is accepted and answered with a wildcard. Otherwise the request origin
//! must match an allowlist entry exactly; requests without an `Origin`
//! header (same-origin navigation, curl, server-to-server) pass untouched.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
            ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use super::{Capability, Stage, CORS_STAGE};
use crate::config::{CorsConfig, DEVELOPMENT_ENV};

/// Methods advertised in preflight responses
const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

pub const REJECTION_MESSAGE: &str = "CORS: origin not allowed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin, `Access-Control-Allow-Origin: *`, no credentials
    AllowAll,
    /// Exact-match origins, reflected back with credentials allowed
    Allowlist(HashSet<String>),
}

impl CorsPolicy {
    /// Picks the policy for an environment.
    pub fn for_env(env: &str, cors: &CorsConfig) -> Self {
        if env == DEVELOPMENT_ENV && cors.allow_all_in_dev {
            Self::AllowAll
        } else {
            Self::Allowlist(cors.allowlist.iter().cloned().collect())
        }
    }

    fn decide(&self, origin: Option<&HeaderValue>) -> Decision {
        match (self, origin) {
            (Self::AllowAll, _) => Decision::Wildcard,
            (Self::Allowlist(_), None) => Decision::NoOrigin,
            (Self::Allowlist(allowed), Some(origin)) => match origin.to_str() {
                Ok(value) if allowed.contains(value) => Decision::Reflect(origin.clone()),
                _ => Decision::Reject,
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Wildcard,
    NoOrigin,
    Reflect(HeaderValue),
    Reject,
}

/// Built-in CORS capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsStage;

impl Capability<CorsPolicy> for CorsStage {
    fn stage(&self, policy: &CorsPolicy) -> Option<Stage> {
        let policy = Arc::new(policy.clone());
        Some(Stage::new(CORS_STAGE, move |router| {
            router.layer(middleware::from_fn_with_state(policy, cors_layer))
        }))
    }
}

async fn cors_layer(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let decision = policy.decide(request.headers().get(ORIGIN));

    if decision == Decision::Reject {
        tracing::debug!(
            origin = ?request.headers().get(ORIGIN),
            "Rejected cross-origin request"
        );
        return (StatusCode::FORBIDDEN, REJECTION_MESSAGE).into_response();
    }

    let is_preflight = request.method() == Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);

    if is_preflight {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_origin_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        if let Some(requested) = request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        return response;
    }

    let mut response = next.run(request).await;
    apply_origin_headers(response.headers_mut(), &decision);
    response
}

fn apply_origin_headers(headers: &mut HeaderMap, decision: &Decision) {
    match decision {
        Decision::Wildcard => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        Decision::Reflect(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        Decision::NoOrigin => {
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        Decision::Reject => {}
    }
}
