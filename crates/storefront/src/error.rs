//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use brisco_engine::cart::CartError;
use brisco_engine::checkout::CheckoutError;
use brisco_engine::gate::GateError;
use brisco_engine::services::{PaymentError, ServiceError};
use thiserror::Error;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Access gate operation failed.
    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// External service call failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Storefront is locked; visitor has not entered the access code.
    #[error("Access required")]
    AccessRequired,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Internal(_) | Self::Service(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Gate(err) => match err {
                GateError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                GateError::IncorrectCode => StatusCode::UNAUTHORIZED,
                GateError::NotAwaitingCode | GateError::AlreadyGranted => StatusCode::CONFLICT,
            },
            Self::Cart(CartError::NonPositivePrice(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Checkout(err) => match err {
                CheckoutError::SizeNotSelected
                | CheckoutError::MissingField(_)
                | CheckoutError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                CheckoutError::NotOpen
                | CheckoutError::CannotAdvance
                | CheckoutError::NotAtPayment
                | CheckoutError::PaymentInFlight => StatusCode::CONFLICT,
                CheckoutError::Payment(PaymentError::Declined { .. }) => {
                    StatusCode::PAYMENT_REQUIRED
                }
                CheckoutError::Payment(PaymentError::Gateway(_)) => StatusCode::BAD_GATEWAY,
            },
            Self::Service(_) => StatusCode::BAD_GATEWAY,
            Self::AccessRequired => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Service(_) => "External service error".to_string(),
            Self::Checkout(CheckoutError::Payment(PaymentError::Gateway(_))) => {
                "Payment could not be processed. Please try again.".to_string()
            }
            Self::AccessRequired => "Enter the access code to continue".to_string(),
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(get_status(AppError::AccessRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(
            get_status(AppError::Gate(GateError::IncorrectCode)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Gate(GateError::AlreadyGranted)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Checkout(CheckoutError::PaymentInFlight)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Checkout(CheckoutError::Payment(
                PaymentError::Declined {
                    reason: "card declined".to_string()
                }
            ))),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_declined_reason_reaches_client() {
        let err = AppError::Checkout(CheckoutError::Payment(PaymentError::Declined {
            reason: "insufficient funds".to_string(),
        }));
        assert!(err.to_string().contains("insufficient funds"));
    }
}
