use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::services::{CredentialError, OrderError, ReservationError};
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Reservation expired: {0}")]
    ReservationExpired(String),

    #[error("Reservation already {0}")]
    ReservationAlreadyTerminal(String),

    #[error("Expected {expected} ticket holders, got {actual}")]
    HolderDataMismatch { expected: usize, actual: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid credential")]
    InvalidCredential(#[source] CredentialError),

    #[error("Storage error")]
    StorageError(#[from] StoreError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::HolderDataMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidCredential(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReservationExpired(_) => StatusCode::GONE,
            AppError::ReservationAlreadyTerminal(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StorageError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ReservationExpired(_) => "RESERVATION_EXPIRED",
            AppError::ReservationAlreadyTerminal(_) => "RESERVATION_ALREADY_TERMINAL",
            AppError::HolderDataMismatch { .. } => "HOLDER_DATA_MISMATCH",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            AppError::StorageError(_) => "STORAGE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::StorageError(e) => {
                error!(error = ?e, "Storage error");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal error");
            }
            AppError::InvalidCredential(e) => {
                warn!(error = %e, "Credential rejected");
            }
            _ => {
                warn!(error = %self, code = self.code(), "Request rejected");
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::StorageError(_) => "A storage error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            AppError::InvalidCredential(_) => "The ticket credential is invalid".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::HolderDataMismatch { expected, actual } => {
                Some(json!({ "expected": expected, "actual": actual }))
            }
            _ => None,
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(error: ReservationError) -> Self {
        match error {
            ReservationError::InvalidSession
            | ReservationError::InvalidTtl { .. }
            | ReservationError::InvalidBuyer(_) => AppError::ValidationError(error.to_string()),
            ReservationError::TicketTypeNotFound(_) | ReservationError::ReservationNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            ReservationError::NotOwner(_) => AppError::Forbidden(error.to_string()),
            ReservationError::ReservationExpired(_) => {
                AppError::ReservationExpired("please select your tickets again".to_string())
            }
            ReservationError::ReservationAlreadyTerminal(status) => {
                AppError::ReservationAlreadyTerminal(status.to_string())
            }
            ReservationError::HolderDataMismatch { expected, actual } => {
                AppError::HolderDataMismatch { expected, actual }
            }
            ReservationError::Store(e) => AppError::StorageError(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::OrderNotFound(_) | OrderError::TicketTypeNotFound(_) => {
                AppError::NotFound(error.to_string())
            }
            OrderError::OrderAlreadyFinal(_) => AppError::Conflict(error.to_string()),
            OrderError::Credential(e) => AppError::InternalServerError(e.to_string()),
            OrderError::Store(e) => AppError::StorageError(e),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::Render(_) | CredentialError::Serialization(_) => {
                AppError::InternalServerError(error.to_string())
            }
            other => AppError::InvalidCredential(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), self.details(), status)
    }
}
