use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid API key")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Body could not be decoded into an assistant request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Raised by the agent service; the message is surfaced verbatim.
    #[error("{0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Upstream(_) | ServiceError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::InvalidRequest(rejection.body_text())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Upstream(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
