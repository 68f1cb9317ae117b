use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested match, question, or player does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Action attempted outside the phase that allows it.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Client answered a question that is not the current one.
    #[error("question mismatch: submitted index {submitted}, current index {current}")]
    QuestionMismatch {
        /// Index the client answered.
        submitted: i32,
        /// Index the match is currently on.
        current: i32,
    },
    /// A second submission for the same (question, player) pair.
    #[error("answer already submitted for this question")]
    DuplicateSubmission,
    /// Non-owner attempting an owner-only action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Consumable inventory is empty or a usage limit was reached.
    #[error("consumable unavailable: {0}")]
    ConsumableUnavailable(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A collaborator backend failed.
    #[error("storage failure: {0}")]
    Storage(#[from] crate::dao::storage::StorageError),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Actor lacks the right to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with the current match state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            mismatch @ ServiceError::QuestionMismatch { .. } => {
                AppError::Conflict(mismatch.to_string())
            }
            duplicate @ ServiceError::DuplicateSubmission => {
                AppError::Conflict(duplicate.to_string())
            }
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::ConsumableUnavailable(message) => AppError::Conflict(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            storage @ ServiceError::Storage(_) => AppError::Internal(storage.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
