//! Error types for web handlers.
//!
//! Bridges domain errors and HTTP responses. Every domain error maps to a
//! stable machine-readable code that storefront clients branch on; the
//! human-readable message may change, the code must not.

use crate::error::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Wraps domain errors and provides HTTP-friendly error responses via
/// Axum's `IntoResponse`.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
        }
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// The stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::StorefrontNotFound { .. } => {
                (StatusCode::NOT_FOUND, "STOREFRONT_NOT_FOUND")
            }
            EngineError::OrderNotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            EngineError::TicketNotFound => (StatusCode::NOT_FOUND, "TICKET_NOT_FOUND"),
            EngineError::PaymentNotConfigured => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PAYMENT_NOT_CONFIGURED")
            }
            EngineError::PaymentNotEnabled => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PAYMENT_NOT_ENABLED")
            }
            EngineError::InvalidTicketTypes { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TICKET_TYPES")
            }
            EngineError::PaymentInitFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "PAYMENT_INIT_FAILED")
            }
            EngineError::PaymentNotComplete => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_NOT_COMPLETE")
            }
            EngineError::SessionVerificationFailed { .. } => {
                (StatusCode::CONFLICT, "SESSION_VERIFICATION_FAILED")
            }
            EngineError::OrderAlreadyCompleted { .. } => {
                (StatusCode::CONFLICT, "ORDER_ALREADY_COMPLETED")
            }
            EngineError::InvalidOrderState { .. } => (StatusCode::CONFLICT, "INVALID_ORDER_STATE"),
            EngineError::GatewayDeclined { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_DECLINED")
            }
            EngineError::GatewayUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNAVAILABLE")
            }
            EngineError::Store(_) => {
                tracing::error!(error = %err, "Store failure surfaced to handler");
                return Self::internal("An internal error occurred");
            }
        };
        Self::new(status, err.to_string(), code.to_string())
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Server error response"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}
