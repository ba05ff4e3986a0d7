use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// API error types, mapped deterministically to response codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client input errors: missing or empty upload.
    #[error("{0}")]
    InvalidInput(String),

    /// Any failure in saving, decoding, caption generation, or synthesis.
    /// The raw error text is surfaced in the body; that mirrors the
    /// original behavior and has not been changed without sign-off.
    #[error("Internal Server Error: {0}")]
    Pipeline(#[from] anyhow::Error),

    /// Requested audio file does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Pipeline(e) => {
                tracing::error!("pipeline error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal Server Error: {e}"),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, body).into_response()
    }
}
