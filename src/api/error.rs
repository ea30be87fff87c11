//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error returned by API handlers.
///
/// Only the message text reaches the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The generic 401 used by every authenticated endpoint
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a plain-text body instead of JSON
    pub fn into_text(self) -> TextError {
        TextError(self)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(_) | Error::NotAFolder(_) | Error::NotAFile(_) => {
                Self::BadRequest(e.to_string())
            }
            Error::InvalidCredentials => Self::Unauthorized(e.to_string()),
            // connection details stay in the log
            Error::Unauthorized | Error::Connection(_) | Error::ConnectionTimeout(_) => {
                tracing::warn!("Rejecting request: {}", e);
                Self::unauthorized()
            }
            Error::NotFound(_) => Self::NotFound(e.to_string()),
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::Backend(_)
            | Error::TransferTimeout(_)
            | Error::Io(_)
            | Error::Internal(_) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// An [`ApiError`] rendered as `text/plain`, for the transfer endpoints
#[derive(Debug)]
pub struct TextError(pub ApiError);

impl From<ApiError> for TextError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for TextError {
    fn into_response(self) -> Response {
        (self.0.status_code(), self.0.to_string()).into_response()
    }
}

/// Result type for JSON handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
