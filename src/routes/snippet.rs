//! Code snippet endpoint backed by a helper script.

use axum::{extract::State, Json};
use serde_json::Value;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Runs the snippet script and returns its JSON output unchanged.
///
/// The script must print a JSON object with a string `code` field.
#[instrument(name = "snippet::snippet", skip(state))]
pub async fn snippet(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let scripts = &state.config.scripts;
    let output = state
        .runner
        .run_json(&scripts.python_cmd, &[scripts.snippet_script.as_str()])
        .await?;

    match output.get("code") {
        Some(Value::String(_)) => Ok(Json(output)),
        _ => Err(AppError::InvalidScriptOutput(
            "expected an object with a string `code` field".to_string(),
        )),
    }
}
