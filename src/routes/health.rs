//! Health check endpoint for container orchestration.
//!
//! Provides a simple liveness probe that returns 200 OK when the process is running.
//! Used by systemd, load balancers and container runtimes to verify the service is alive.

/// Health check handler.
///
/// This is a liveness probe - it only checks that the process can respond to HTTP.
/// The security pipeline still applies, so a client outside the IP allowlist or
/// over its rate limit is answered by the pipeline instead.
pub async fn health() -> &'static str {
    "OK"
}
