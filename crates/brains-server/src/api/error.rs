//! API error types and HTTP response conversion.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use brains_runtime::RuntimeError;
use brains_types::SignalRejected;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body shape every non-2xx response shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { error: error.into(), message: message.into(), code: code.into() }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Runtime(err) => runtime_error_status(err),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Runtime(err) => runtime_error_code(err),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Conflict(_) => "Conflict",
            ApiError::InternalError(_) => "InternalError",
            ApiError::Runtime(_) => "RuntimeError",
        }
    }
}

/// §7's split: unknown brain/run/schedule/slug are 404s without side effects;
/// invalid signal transitions and ownership conflicts are 409s; anything else
/// the runtime could not have predicted is a 500.
fn runtime_error_status(err: &RuntimeError) -> StatusCode {
    match err {
        RuntimeError::UnknownBrain(_)
        | RuntimeError::UnknownRun(_)
        | RuntimeError::UnknownSchedule(_)
        | RuntimeError::UnknownWebhookSlug(_) => StatusCode::NOT_FOUND,
        RuntimeError::RunTerminal(_) => StatusCode::CONFLICT,
        RuntimeError::SignalRejected(_) => StatusCode::CONFLICT,
        RuntimeError::InvalidCron(_, _) | RuntimeError::InvalidTimezone(_) => StatusCode::BAD_REQUEST,
        RuntimeError::Checkpoint(_) | RuntimeError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn runtime_error_code(err: &RuntimeError) -> &'static str {
    match err {
        RuntimeError::UnknownBrain(_) => "UNKNOWN_BRAIN",
        RuntimeError::UnknownRun(_) => "UNKNOWN_RUN",
        RuntimeError::UnknownSchedule(_) => "UNKNOWN_SCHEDULE",
        RuntimeError::UnknownWebhookSlug(_) => "UNKNOWN_WEBHOOK_SLUG",
        RuntimeError::RunTerminal(_) => "RUN_TERMINAL",
        RuntimeError::SignalRejected(inner) => match inner {
            SignalRejected::NoActiveAgent => "NO_ACTIVE_AGENT",
            SignalRejected::NotPaused => "NOT_PAUSED",
            SignalRejected::NotWaiting => "NOT_WAITING",
            SignalRejected::RunNotFound(_) => "UNKNOWN_RUN",
        },
        RuntimeError::InvalidCron(_, _) => "INVALID_CRON",
        RuntimeError::InvalidTimezone(_) => "INVALID_TIMEZONE",
        RuntimeError::Checkpoint(_) => "CHECKPOINT_ERROR",
        RuntimeError::Core(_) => "CORE_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse::new(self.error_type(), self.to_string(), self.code());
        tracing::warn!(status = %status, code = %body.code, "API error: {}", body.message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_run_is_not_found() {
        let err: ApiError = RuntimeError::UnknownRun("r1".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "UNKNOWN_RUN");
    }

    #[test]
    fn signal_rejection_is_conflict() {
        let err: ApiError = RuntimeError::from(SignalRejected::NotPaused).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "NOT_PAUSED");
    }

    #[test]
    fn invalid_cron_is_bad_request() {
        let err: ApiError = RuntimeError::InvalidCron("* *".into(), "too few fields".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
