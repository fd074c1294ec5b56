//! Shared application state for request handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::runner::ScriptRunner;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
    pub runner: ScriptRunner,
}

impl AppState {
    /// Creates the state from the frozen startup configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            started_at: Instant::now(),
            runner: ScriptRunner::default(),
        }
    }

    /// Whole seconds since startup, rounded.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs_f64().round() as u64
    }
}
