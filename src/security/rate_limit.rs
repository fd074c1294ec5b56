//! Fixed-window rate limiting keyed by client IP.
//!
//! Each client gets a counter that resets when its window expires. Responses
//! carry the standard `RateLimit-*` headers; the legacy `X-RateLimit-*` set
//! is not emitted. Over the limit, the request is answered with
//! `429 Too Many Requests` and a `Retry-After` hint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use super::{Capability, ClientInfo, Stage, RATE_LIMIT_STAGE};
use crate::config::RateLimitConfig;

pub const RATELIMIT_POLICY: &str = "ratelimit-policy";
pub const RATELIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
pub const RATELIMIT_RESET: &str = "ratelimit-reset";

pub const LIMIT_EXCEEDED_MESSAGE: &str = "Too many requests, please try again later.";

/// Window count above which expired entries are swept on insert
const PRUNE_THRESHOLD: usize = 10_000;

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-key fixed-window counters.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_millis(config.window_ms), config.max)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts a request for `key` now.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Counts a request for `key` at a given instant.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        // A poisoned lock only means another request panicked mid-update;
        // the counters are still usable.
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= PRUNE_THRESHOLD && !windows.contains_key(key) {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));

        if entry.count >= self.max {
            Decision::Limited {
                retry_after: reset_after,
            }
        } else {
            entry.count += 1;
            Decision::Allowed {
                remaining: self.max - entry.count,
                reset_after,
            }
        }
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Built-in rate-limit capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiter;

impl Capability<RateLimitConfig> for RateLimiter {
    fn stage(&self, config: &RateLimitConfig) -> Option<Stage> {
        let limiter = Arc::new(FixedWindowLimiter::from_config(config));
        tracing::debug!(
            window_ms = config.window_ms,
            max = config.max,
            "Rate limiter configured"
        );
        Some(Stage::new(RATE_LIMIT_STAGE, move |router| {
            router.layer(middleware::from_fn_with_state(limiter, rate_limit_layer))
        }))
    }
}

async fn rate_limit_layer(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ClientInfo>()
        .map(|client| client.ip.clone())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&key) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            insert_rate_headers(response.headers_mut(), &limiter, remaining, reset_after);
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            let mut response = (StatusCode::TOO_MANY_REQUESTS, LIMIT_EXCEEDED_MESSAGE).into_response();
            let headers = response.headers_mut();
            insert_rate_headers(headers, &limiter, 0, retry_after);
            headers.insert(RETRY_AFTER, HeaderValue::from(ceil_secs(retry_after)));
            response
        }
    }
}

fn insert_rate_headers(
    headers: &mut HeaderMap,
    limiter: &FixedWindowLimiter,
    remaining: u32,
    reset_after: Duration,
) {
    let policy = format!("{};w={}", limiter.max(), ceil_secs(limiter.window()));
    if let Ok(policy) = HeaderValue::from_str(&policy) {
        headers.insert(RATELIMIT_POLICY, policy);
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limiter.max()));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset_after)));
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}
