use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        conflicting_appointment_id: Option<Uuid>,
    },

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AppError {
    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
            conflicting_appointment_id: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::Conflict { message, conflicting_appointment_id } => {
                tracing::warn!("Error: {}: {}", status, message);
                json!({
                    "error": message,
                    "conflicting_appointment_id": conflicting_appointment_id,
                })
            }
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::InvalidState(msg)
            | AppError::ValidationError(msg) => {
                tracing::warn!("Error: {}: {}", status, msg);
                json!({ "error": msg })
            }
            AppError::Internal(msg)
            | AppError::Database(msg)
            | AppError::ExternalService(msg) => {
                tracing::error!("Error: {}: {}", status, msg);
                json!({ "error": msg })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InvalidState("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Database("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_response_status() {
        let response = AppError::Conflict {
            message: "taken".to_string(),
            conflicting_appointment_id: Some(Uuid::new_v4()),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
