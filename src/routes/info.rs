//! Process information endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::RUNTIME_VERSION;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub pid: u32,
    /// Runtime version string
    pub node: &'static str,
    pub env: String,
    pub uptime_s: u64,
}

pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        pid: std::process::id(),
        node: RUNTIME_VERSION,
        env: state.config.env.clone(),
        uptime_s: state.uptime_secs(),
    })
}
