//! Application-level error type for the web layer

use crate::generation::GenerateError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("predictor is not available")]
    PredictorUnavailable,

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            Self::PredictorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Generate(GenerateError::InvalidTopK) => StatusCode::BAD_REQUEST,
            Self::Generate(GenerateError::Predictor(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
