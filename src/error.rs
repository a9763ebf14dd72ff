use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("You are not authorized to modify this item")]
    Forbidden,

    #[error("Login required")]
    Unauthenticated,

    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("Token mismatch: {0}")]
    TokenMismatch(String),

    #[error("Provider rejected authentication: {0}")]
    UpstreamAuth(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthenticated
            | AppError::StateMismatch
            | AppError::TokenMismatch(_)
            | AppError::UpstreamAuth(_) => StatusCode::UNAUTHORIZED,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden => "authorization_error",
            AppError::Unauthenticated => "unauthenticated",
            AppError::StateMismatch => "state_mismatch",
            AppError::TokenMismatch(_) => "token_mismatch",
            AppError::UpstreamAuth(_) => "upstream_auth_error",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_integrity_failures_are_unauthorized() {
        assert_eq!(AppError::StateMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::TokenMismatch("aud".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::UpstreamAuth("rejected".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_provider_unavailable_is_retryable() {
        assert_eq!(
            AppError::ProviderUnavailable("timeout".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_forbidden_message_is_generic() {
        assert_eq!(
            AppError::Forbidden.to_string(),
            "You are not authorized to modify this item"
        );
    }
}
