use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{classify, ErrorReason, OrchestrationError};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// The agent has not signalled it is online.
    Locked(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Locked(_) => StatusCode::LOCKED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg),
            ApiError::NotFound(msg) => ("NOT_FOUND", msg),
            ApiError::Conflict(msg) => ("CONFLICT", msg),
            ApiError::Locked(msg) => ("LOCKED", msg),
            ApiError::Internal(msg) => ("INTERNAL_ERROR", msg),
        };

        (status, Json(ErrorBody { error: message, code })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match classify(&err) {
            Some(OrchestrationError::Api { reason, .. })
                if *reason == ErrorReason::Http400BadRequestResponse =>
            {
                ApiError::BadRequest(err.to_string())
            }
            _ => {
                log::error!("Internal error: {:?}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("JSON error: {}", err))
    }
}
