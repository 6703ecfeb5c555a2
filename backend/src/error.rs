//! Error handling for the Storefront Books back-end
//!
//! Every failure is serialized into the standard response envelope with a
//! field → message map, so clients handle validation and business-rule
//! errors uniformly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use thiserror::Error;

use shared::validation::FieldErrors;

use crate::models::ApiResponse;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Input errors
    #[error("Validation failed")]
    Validation(FieldErrors),

    // Domain errors
    #[error("Business rule violated: {message}")]
    BusinessRule { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency precondition failed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Debits did not equal credits; tagged for alerting because a correct
    /// engine never produces it
    #[error("Accounting invariant violated: {0}")]
    AccountingInvariant(String),

    /// Tax-authority rejection, surfaced with the upstream message
    #[error("External reporting failed: {0}")]
    ExternalReporting(String),

    /// Counter cache or another dependency is unreachable
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Counter cache error: {0}")]
    Counter(#[from] redis::RedisError),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single-field validation error
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        AppError::Validation(errors)
    }

    /// Business-rule rejection tied to a field
    pub fn business_rule(field: &str, message: impl Into<String>) -> Self {
        AppError::BusinessRule {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<shared::JournalError> for AppError {
    fn from(err: shared::JournalError) -> Self {
        match err {
            shared::JournalError::Unbalanced { .. } => {
                AppError::AccountingInvariant(err.to_string())
            }
            shared::JournalError::MissingCounterparty { .. }
            | shared::JournalError::InvalidMethod(_) => {
                AppError::validation("method", err.to_string())
            }
            shared::JournalError::NonPositiveAmount(_) => {
                AppError::validation("amount", err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errors) = match &self {
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                single_error("auth", message.clone()),
            ),
            AppError::Validation(fields) => (StatusCode::BAD_REQUEST, fields.clone()),
            AppError::BusinessRule { field, message } => {
                (StatusCode::BAD_REQUEST, single_error(field, message.clone()))
            }
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                single_error("id", format!("{} not found", resource)),
            ),
            AppError::Conflict(message) => {
                (StatusCode::CONFLICT, single_error("updated_at", message.clone()))
            }
            AppError::AccountingInvariant(message) => {
                tracing::error!(tag = "accounting_invariant", "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    single_error("accounting", "internal accounting error".to_string()),
                )
            }
            AppError::ExternalReporting(message) => (
                StatusCode::BAD_REQUEST,
                single_error("reporting", message.clone()),
            ),
            AppError::Unavailable(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                single_error("service", message.clone()),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                single_error("database", "a database error occurred".to_string()),
            ),
            AppError::Counter(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                single_error("service", "serial counter unavailable".to_string()),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                single_error("server", "an internal error occurred".to_string()),
            ),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        } else {
            tracing::debug!("request rejected: {:?}", self);
        }

        (status, Json(ApiResponse::<()>::errors(errors))).into_response()
    }
}

fn single_error(field: &str, message: String) -> FieldErrors {
    let mut errors = HashMap::new();
    errors.insert(field.to_string(), message);
    errors
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
