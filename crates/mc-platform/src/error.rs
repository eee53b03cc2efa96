//! Platform Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mc_common::MemcardError;
use mc_config::ConfigError;
use thiserror::Error;
use tracing::error;

use crate::api::common::ApiError;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Duplicate entity: {entity_type} with {field}={value}")]
    Duplicate { entity_type: String, field: String, value: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Password hashing error: {message}")]
    PasswordHash { message: String },

    #[error("Migration {id} failed: {source}")]
    Migration {
        id: String,
        #[source]
        source: Box<PlatformError>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Duplicate { .. } => (StatusCode::CONFLICT, "DUPLICATE"),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<MemcardError> for PlatformError {
    fn from(err: MemcardError) -> Self {
        match err {
            MemcardError::Validation(message) => Self::Validation { message },
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ApiError {
            error: code.to_string(),
            message: self.to_string(),
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
