//! Error types for the data collector.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type used during startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Schema setup failed: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Request-level failures, one variant per HTTP status the API returns.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Invalid JSON")]
    InvalidJson(String),

    #[error("Missing fields: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("Conversation {0} does not exist; a user is required to create it")]
    UnknownConversation(String),

    #[error("Conversation already exists")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// The request body could not be read, e.g. it exceeded the size limit.
    #[error("{message}")]
    Body { status: StatusCode, message: String },

    #[error("Internal storage error")]
    Store(#[from] DatabaseError),

    #[error("Internal server error")]
    Internal,
}

impl From<BytesRejection> for CollectError {
    fn from(rejection: BytesRejection) -> Self {
        CollectError::Body {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl CollectError {
    pub fn status(&self) -> StatusCode {
        match self {
            CollectError::InvalidJson(_)
            | CollectError::Validation(_)
            | CollectError::UnknownConversation(_) => StatusCode::BAD_REQUEST,
            CollectError::Conflict(_) => StatusCode::CONFLICT,
            CollectError::Unauthorized => StatusCode::UNAUTHORIZED,
            CollectError::Body { status, .. } => *status,
            CollectError::Store(_) | CollectError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CollectError {
    fn into_response(self) -> Response {
        match &self {
            CollectError::Store(e) => tracing::error!(error = %e, "Store operation failed"),
            CollectError::InvalidJson(detail) => {
                tracing::debug!(detail = %detail, "Rejected malformed request body")
            }
            CollectError::Conflict(id) => tracing::info!(id = %id, "Duplicate conversation id"),
            CollectError::Body { status, message } => {
                tracing::warn!(status = %status, detail = %message, "Request body rejected")
            }
            _ => tracing::debug!(error = %self, "Request rejected"),
        }

        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Result type alias for startup code.
pub type Result<T> = std::result::Result<T, Error>;
