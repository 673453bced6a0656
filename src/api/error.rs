use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generator::GenerationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("study plan is being processed; try again once it finishes")]
    Busy,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Busy => (StatusCode::CONFLICT, self.to_string()),
            Self::Generation(e) => generation_response(e),
            Self::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred on the server.".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn generation_response(e: &GenerationError) -> (StatusCode, String) {
    tracing::warn!(kind = e.kind(), error = %e, "generation request failed");
    match e {
        GenerationError::RateLimited(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "The AI service quota is exhausted. Please try again later.".to_string(),
        ),
        GenerationError::MalformedOutput(_) => (
            StatusCode::BAD_GATEWAY,
            "The AI returned an invalid format. Please try again.".to_string(),
        ),
        GenerationError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            "The AI took too long to respond. Please try again.".to_string(),
        ),
        GenerationError::MissingContent => (StatusCode::BAD_REQUEST, e.to_string()),
        GenerationError::Api { .. }
        | GenerationError::Transport(_)
        | GenerationError::Aborted(_) => (
            StatusCode::BAD_GATEWAY,
            "Failed to generate notes. Check server logs for details.".to_string(),
        ),
    }
}
