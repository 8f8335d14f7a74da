// src/error.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authenticity error: {0}")]
    Authenticity(String),

    /// Missing or invalid bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The row moved under us. Idempotent callers fold this into success.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot {action} a {status} {entity}")]
    InvalidTransition {
        entity: &'static str,
        status: String,
        action: &'static str,
    },

    #[error("external service error: {message}")]
    ExternalService { message: String, retryable: bool },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Authenticity(_) => "authenticity",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::InvalidTransition { .. } => "invalid_transition",
            LedgerError::ExternalService { .. } => "external_service",
            LedgerError::Database(_) => "database",
            LedgerError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ExternalService {
                retryable: true,
                ..
            } | LedgerError::Database(_)
        )
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) | LedgerError::Authenticity(_) => StatusCode::BAD_REQUEST,
            LedgerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::Conflict(_) | LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            LedgerError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::Database(_) | LedgerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // store details stay in the logs
        let message = match self {
            LedgerError::Database(_) | LedgerError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": message,
            "kind": self.kind(),
            "retry": self.is_retryable(),
        }))
    }
}
