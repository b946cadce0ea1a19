use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;

use crate::connectors::ConnectorError;

/// Failures surfaced by the store, the preset registry and the chat relay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    /// Referenced entity is absent
    #[error("{0} not found")]
    NotFound(String),
    /// Malformed input, e.g. preset parameters out of range
    #[error("validation failed: {0}")]
    Validation(String),
    /// Another turn is already running for the conversation
    #[error("conflict: {0}")]
    Conflict(String),
    /// Model server unreachable or failed mid-stream
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Persistence I/O failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn conversation_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("conversation {}", id))
    }

    pub fn preset_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("preset {}", id))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // storage details stay in the logs
        let message = match self {
            Self::Storage(_) => "Internal error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(status).json(json!({
            "status": "Error",
            "code": status.as_u16(),
            "message": message,
        }))
    }
}

impl From<ConnectorError> for AppError {
    fn from(err: ConnectorError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
