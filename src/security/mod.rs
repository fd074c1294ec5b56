//! Security middleware pipeline.
//!
//! The pipeline is assembled once at startup from the preset-resolved
//! security options. Stages run in this order for every request:
//!
//! ```text
//! client_ip → cors → security_headers → rate_limit → ip_allowlist → https_redirect → routes
//! ```
//!
//! `client_ip` is always present; the rest are attached only when enabled.
//! CORS, security headers and rate limiting are provided through
//! [`Capability`] implementations so that a deployment can swap or omit them
//! without the builder failing.

pub mod client_ip;
pub mod cors;
pub mod headers;
pub mod ip_allowlist;
pub mod preset;
pub mod rate_limit;
pub mod redirect;

use axum::Router;

use crate::config::{HelmetConfig, RateLimitConfig, SecurityConfig};

pub use client_ip::{normalize_ip, ClientInfo, ConnectionScheme};
pub use cors::CorsPolicy;
pub use preset::resolve;

pub const CLIENT_IP_STAGE: &str = "client_ip";
pub const CORS_STAGE: &str = "cors";
pub const SECURITY_HEADERS_STAGE: &str = "security_headers";
pub const RATE_LIMIT_STAGE: &str = "rate_limit";
pub const IP_ALLOWLIST_STAGE: &str = "ip_allowlist";
pub const HTTPS_REDIRECT_STAGE: &str = "https_redirect";

type ApplyFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// A named request-handling stage that wraps a router.
pub struct Stage {
    name: &'static str,
    apply: ApplyFn,
}

impl Stage {
    pub fn new<F>(name: &'static str, apply: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        Self {
            name,
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish()
    }
}

/// Source of an optional stage.
///
/// Returning `None` means the capability is not available in this build or
/// deployment; the builder then logs a warning and continues without it.
pub trait Capability<C>: Send + Sync {
    fn stage(&self, config: &C) -> Option<Stage>;
}

/// Capability placeholder that never produces a stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotConfigured;

impl<C> Capability<C> for NotConfigured {
    fn stage(&self, _config: &C) -> Option<Stage> {
        None
    }
}

/// Optional stage providers wired in at startup.
pub struct Capabilities {
    pub cors: Box<dyn Capability<CorsPolicy>>,
    pub security_headers: Box<dyn Capability<HelmetConfig>>,
    pub rate_limit: Box<dyn Capability<RateLimitConfig>>,
}

impl Capabilities {
    /// No optional stage available.
    pub fn none() -> Self {
        Self {
            cors: Box::new(NotConfigured),
            security_headers: Box::new(NotConfigured),
            rate_limit: Box::new(NotConfigured),
        }
    }
}

impl Default for Capabilities {
    /// The built-in implementations of every optional stage.
    fn default() -> Self {
        Self {
            cors: Box::new(cors::CorsStage),
            security_headers: Box::new(headers::SecurityHeaders),
            rate_limit: Box::new(rate_limit::RateLimiter),
        }
    }
}

/// Ordered set of stages, outermost first.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|stage| stage.name == name)
    }

    /// Wraps `router` so that the first stage sees each request first.
    pub fn apply(self, router: Router) -> Router {
        // The last layer added is the outermost one.
        self.stages
            .into_iter()
            .rev()
            .fold(router, |router, stage| (stage.apply)(router))
    }

    fn push(&mut self, stage: Stage) {
        tracing::debug!(stage = stage.name, "Attached pipeline stage");
        self.stages.push(stage);
    }

    fn push_optional(&mut self, name: &'static str, stage: Option<Stage>) {
        match stage {
            Some(stage) => self.push(stage),
            None => {
                tracing::warn!(stage = name, "Stage enabled but its capability is not configured, skipping");
            }
        }
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

/// Resolves the preset and assembles the request pipeline.
///
/// Returns the pipeline together with the effective security options, which
/// the transport launcher uses for its HTTPS decision.
pub fn build_pipeline(
    env: &str,
    security: &SecurityConfig,
    capabilities: &Capabilities,
) -> (Pipeline, SecurityConfig) {
    let resolved = resolve(security);
    let mut pipeline = Pipeline::default();

    if resolved.trust_proxy {
        tracing::debug!("Trusting X-Forwarded-* headers for client resolution");
    }
    pipeline.push(client_ip::stage(resolved.trust_proxy));

    if resolved.cors.enabled {
        let policy = CorsPolicy::for_env(env, &resolved.cors);
        pipeline.push_optional(CORS_STAGE, capabilities.cors.stage(&policy));
    }

    if resolved.helmet.enabled {
        pipeline.push_optional(
            SECURITY_HEADERS_STAGE,
            capabilities.security_headers.stage(&resolved.helmet),
        );
    }

    if resolved.rate_limit.enabled {
        pipeline.push_optional(
            RATE_LIMIT_STAGE,
            capabilities.rate_limit.stage(&resolved.rate_limit),
        );
    }

    if let Some(stage) = ip_allowlist::stage(&resolved.ip_allowlist) {
        pipeline.push(stage);
    }

    if resolved.https.redirect_http_to_https {
        pipeline.push(redirect::stage());
    }

    (pipeline, resolved)
}
