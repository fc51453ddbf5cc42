use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use scrape_core::QueueError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Everything a route handler can fail with, already carrying the HTTP
/// status its variant should render as. `QueueError` conversions classify
/// by variant rather than collapsing everything to 500 - a validation
/// failure and a missing row are both "the caller's fault", not ours.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("article not found")]
    ArticleNotFound,

    #[error("job {0} is already in a terminal state")]
    AlreadyTerminal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation(message) => ApiError::Validation(message),
            QueueError::JobNotFound(id) => ApiError::JobNotFound(id),
            QueueError::ArticleNotFound(_) => ApiError::ArticleNotFound,
            QueueError::AlreadyTerminal(id) => ApiError::AlreadyTerminal(id),
            QueueError::PreconditionFailed { .. } => ApiError::Internal(err.to_string()),
            QueueError::Sqlx(_) | QueueError::Serde(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::JobNotFound(_) | ApiError::ArticleNotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyTerminal(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "internal api error");
        }
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
