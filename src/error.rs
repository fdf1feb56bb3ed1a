use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cashfree::error::CashfreeError;
use crate::store::StoreError;

/// Standard error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Error taxonomy for the booking core.
///
/// Conflict-class errors are retried internally (see `retry`); everything
/// else maps straight onto an HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("authentication required")]
    Authentication,

    #[error("not the owner of this resource")]
    Authorization,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("gateway error: {message}")]
    Gateway { message: String, retryable: bool },

    #[error("conflicting concurrent update")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication => StatusCode::UNAUTHORIZED,
            ApiError::Authorization => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gateway { retryable, .. } => {
                if *retryable {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            ApiError::Configuration(_) | ApiError::Conflict | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Authentication => "auth_error",
            ApiError::Authorization => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Configuration(_) => "configuration_error",
            ApiError::Gateway { .. } => "gateway_error",
            ApiError::Conflict => "conflict",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Validation(violations) => violations.join("; "),
            ApiError::Authentication => "Missing or invalid identity token".to_string(),
            ApiError::Authorization => "You do not have access to this resource".to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
            // Never name the missing secret or surface transaction internals
            // to the client.
            ApiError::Configuration(detail) => {
                tracing::error!(%detail, "request failed on missing configuration");
                "Service is misconfigured".to_string()
            }
            ApiError::Gateway { message, .. } => message.clone(),
            ApiError::Conflict => "Please try again".to_string(),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                "Internal server error".to_string()
            }
        };

        let body = ErrorResponse::new(self.code(), message);
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) | StoreError::RetriesExhausted { .. } => ApiError::Conflict,
            StoreError::NotFound => ApiError::NotFound("record"),
            StoreError::InsufficientInventory { ref ticket_type_id } => ApiError::Validation(vec![
                format!("ticket type {} is sold out", ticket_type_id),
            ]),
            StoreError::DuplicateKey => ApiError::Conflict,
            StoreError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<CashfreeError> for ApiError {
    fn from(err: CashfreeError) -> Self {
        match err {
            CashfreeError::ConfigError(detail) => ApiError::Configuration(detail),
            ref api @ CashfreeError::ApiError { ref message, .. } => ApiError::Gateway {
                message: message.clone(),
                retryable: api.is_server_error(),
            },
            other => ApiError::Gateway {
                message: other.to_string(),
                retryable: true,
            },
        }
    }
}
