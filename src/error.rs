use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::runner::RunnerError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Script execution failed: {0}")]
    Script(#[from] RunnerError),

    #[error("Invalid script output: {0}")]
    InvalidScriptOutput(String),
}

impl AppError {
    /// Stable error code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Script(RunnerError::InvalidJson(_)) | AppError::InvalidScriptOutput(_) => {
                "invalid_script_output"
            }
            AppError::Script(_) => "script_exec_failed",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        let body = Json(serde_json::json!({ "error": self.code() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let spawn = AppError::Script(RunnerError::Spawn(std::io::Error::other("missing")));
        assert_eq!(spawn.code(), "script_exec_failed");

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AppError::Script(RunnerError::InvalidJson(json)).code(), "invalid_script_output");
        assert_eq!(
            AppError::InvalidScriptOutput("no code".to_string()).code(),
            "invalid_script_output"
        );
    }

    #[tokio::test]
    async fn test_response_is_json_500() {
        let response = AppError::InvalidScriptOutput("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "invalid_script_output");
    }
}
