use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::rate::RateError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid rate expression: {0}")]
    InvalidExpression(#[from] RateError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown session id(s): {}", .0.join(", "))]
    UnknownSessionId(Vec<String>),

    #[error("Edited view has {actual} rows but the ledger has {expected}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Schedule rule not found: {0}")]
    RuleNotFound(String),

    #[error("Malformed row {row} in '{table}', column '{column}': {message}")]
    MalformedRow {
        table: &'static str,
        row: usize,
        column: &'static str,
        message: String,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),
}

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response()
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg).into_response(),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::InvalidExpression(_) | ScheduleError::Validation(_) => {
                ApiError::BadRequest(value.to_string())
            }
            ScheduleError::UnknownSessionId(_)
            | ScheduleError::ClassNotFound(_)
            | ScheduleError::RuleNotFound(_) => ApiError::NotFound(value.to_string()),
            ScheduleError::RowCountMismatch { .. } => ApiError::Conflict(value.to_string()),
            ScheduleError::MalformedRow { .. } => {
                error!("Stored data rejected: {value}");
                ApiError::Unprocessable(value.to_string())
            }
            ScheduleError::BackendUnavailable(err) => {
                error!("Store error: {err}");
                ApiError::Unavailable("Schedule store is unavailable".into())
            }
        }
    }
}
