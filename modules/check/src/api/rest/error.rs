//! Domain-error to HTTP mapping.
//!
//! Responses carry the machine-readable code and a safe message; internal
//! error strings never leave the process.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::domain::error::CheckError;

use super::auth::AuthError;

/// Wire shape of an error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// An error ready to leave the boundary.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: code.to_owned(),
                message: message.to_owned(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => Self::new(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Missing or invalid credentials",
            ),
            AuthError::Forbidden => Self::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Credentials lack the required scope",
            ),
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        let code = err.code();
        match code {
            "invalid_request" => Self::new(StatusCode::BAD_REQUEST, code, &err.to_string()),
            "feature_disabled" => Self::new(
                StatusCode::FORBIDDEN,
                code,
                "The check service is not enabled on this deployment",
            ),
            "storage_timeout" => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                code,
                "Storage did not answer in time",
            ),
            "storage_failure" => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                code,
                "Storage is unavailable",
            ),
            _ => {
                error!(error = ?err, "unexpected check error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal error",
                )
            }
        }
    }
}
