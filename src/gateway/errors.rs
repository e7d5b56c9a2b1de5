//! Usage: Maps `AppError` codes to HTTP status + standardized JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::shared::error::{
    AppError, CODE_AUTH_EXPIRED, CODE_DB_NOT_FOUND, CODE_UNAUTHENTICATED, CODE_UPSTREAM_NOT_FOUND,
    CODE_VALIDATION,
};

pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please reconnect YouTube.";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    msg: String,
    error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Handler error. `msg` is the user-facing summary; the wrapped error supplies the code.
#[derive(Debug)]
pub(crate) struct ApiError {
    err: AppError,
    msg: Option<&'static str>,
}

impl ApiError {
    pub(crate) fn with_msg(err: AppError, msg: &'static str) -> Self {
        Self {
            err,
            msg: Some(msg),
        }
    }

    pub(crate) fn code(&self) -> &str {
        self.err.code()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self { err, msg: None }
    }
}

pub(crate) fn status_for_code(code: &str) -> StatusCode {
    match code {
        CODE_VALIDATION => StatusCode::BAD_REQUEST,
        CODE_UNAUTHENTICATED | CODE_AUTH_EXPIRED => StatusCode::UNAUTHORIZED,
        CODE_UPSTREAM_NOT_FOUND | CODE_DB_NOT_FOUND => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // All credential failures look the same to the caller; the kind is only logged.
        if let Some(kind) = self.err.credential_failure() {
            tracing::info!(kind = kind.as_str(), "delegated credentials unusable");
            let body = ErrorResponse {
                msg: SESSION_EXPIRED_MESSAGE.to_string(),
                error_code: CODE_AUTH_EXPIRED.to_string(),
                error: None,
            };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }

        let status = status_for_code(self.err.code());
        let (msg, error) = match self.msg {
            Some(msg) => (msg.to_string(), Some(self.err.message().to_string())),
            None => (self.err.message().to_string(), None),
        };
        if status.is_server_error() {
            tracing::error!(
                error_code = self.err.code(),
                status = status.as_u16(),
                "request failed: {}",
                self.err
            );
        }
        let body = ErrorResponse {
            msg,
            error_code: self.err.code().to_string(),
            error,
        };
        (status, Json(body)).into_response()
    }
}
