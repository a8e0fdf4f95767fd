use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type carrying a stable machine-readable code.
///
/// Clients branch on the `error` field of the body, so codes are part of
/// the wire contract and never change with the message text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Ride cannot be cancelled while in progress")]
    CannotCancel,

    #[error("Driver is not assigned to this ride")]
    UnauthorizedDriver,

    #[error("Ride was already accepted by another driver")]
    RideAlreadyAccepted,

    #[error("Idempotency key was replayed with a different request body")]
    IdempotencyKeyReused,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl ApiError {
    /// The stable code exposed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::CannotCancel => "CANNOT_CANCEL",
            ApiError::UnauthorizedDriver => "UNAUTHORIZED_DRIVER",
            ApiError::RideAlreadyAccepted => "RIDE_ALREADY_ACCEPTED",
            ApiError::IdempotencyKeyReused => "IDEMPOTENCY_KEY_REUSED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidState(_)
            | ApiError::CannotCancel
            | ApiError::UnauthorizedDriver
            | ApiError::RideAlreadyAccepted => StatusCode::BAD_REQUEST,
            ApiError::IdempotencyKeyReused | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => ApiError::Conflict("Resource already exists".into()),
                        "23503" => ApiError::NotFound("Referenced resource not found".into()),
                        _ => ApiError::Internal(format!("Database error: {}", db_err)),
                    }
                } else {
                    ApiError::Internal(format!("Database error: {}", db_err))
                }
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<crate::services::dispatch::DispatchError> for ApiError {
    fn from(err: crate::services::dispatch::DispatchError) -> Self {
        use crate::services::dispatch::DispatchError;
        match err {
            DispatchError::KillSwitch => {
                ApiError::ServiceUnavailable("Dispatch is temporarily disabled".into())
            }
            DispatchError::IdempotencyHashMismatch => ApiError::IdempotencyKeyReused,
            DispatchError::RideNotFound => ApiError::NotFound("Ride not found".into()),
            DispatchError::AlreadyAccepted => ApiError::RideAlreadyAccepted,
            DispatchError::UnauthorizedDriver => ApiError::UnauthorizedDriver,
            DispatchError::CannotCancel => ApiError::CannotCancel,
            DispatchError::InvalidState(msg) => ApiError::InvalidState(msg),
            DispatchError::Database(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    format!(
                        "{}: {}",
                        field,
                        e.message.as_ref().map(|m| m.to_string()).unwrap_or_default()
                    )
                })
            })
            .collect();

        ApiError::Validation(details.join(", "))
    }
}
