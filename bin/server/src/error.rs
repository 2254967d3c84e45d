//! Mapping of core errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use remark42::RemarkError;
use serde::Serialize;
use tracing::error;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler error carrying the status to respond with.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn admin_only() -> Self {
        Self::new(StatusCode::FORBIDDEN, "admin access required")
    }

    /// Reports any caller error as 400, used where the contract has no 403
    /// or 404 outcome.
    pub fn rejected(err: RemarkError) -> Self {
        let api = Self::from(err);
        if api.status.is_client_error() {
            Self::bad_request(api.message)
        } else {
            api
        }
    }
}

impl From<RemarkError> for ApiError {
    fn from(err: RemarkError) -> Self {
        let status = match &err {
            RemarkError::NotFound(_) => StatusCode::NOT_FOUND,
            RemarkError::Duplicate(_) | RemarkError::Validation(_) => StatusCode::BAD_REQUEST,
            RemarkError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
