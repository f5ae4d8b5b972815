//! エラー型定義 (relay-api)

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// relay-api のエラー型
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("A relay run is already in progress for session: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(relay_core::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthFailed => StatusCode::UNAUTHORIZED,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Io(_) | ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<relay_core::Error> for ApiError {
    fn from(err: relay_core::Error) -> Self {
        match err {
            relay_core::Error::Validation(msg) => ApiError::InvalidRequest(msg),
            relay_core::Error::SessionNotFound(id) => ApiError::SessionNotFound(id),
            relay_core::Error::Conflict(id) => ApiError::Conflict(id),
            other => ApiError::Core(other),
        }
    }
}

/// Generic API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let cases = [
            (relay_core::Error::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (relay_core::Error::SessionNotFound("x".into()), StatusCode::NOT_FOUND),
            (relay_core::Error::Conflict("x".into()), StatusCode::CONFLICT),
            (relay_core::Error::Runtime("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (core, status) in cases {
            assert_eq!(ApiError::from(core).status_code(), status);
        }
        assert_eq!(ApiError::AuthFailed.status_code(), StatusCode::UNAUTHORIZED);
    }
}
