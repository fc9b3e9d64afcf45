use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use std::error::Error as StdError;
use std::fmt;

/// Errors returned by the process and instance registries
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input
    Validation(String),
    /// No row visible to or owned by the caller
    NotFound(&'static str),
    /// Authenticated, but neither the owner nor an admin of an official row
    Forbidden(&'static str),
    /// No usable bearer token
    Unauthorized,
    /// Storage failure
    Database(sqlx::Error),
    /// A stored value could not be decoded
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(msg) => write!(f, "{}", msg),
            ApiError::NotFound(what) => write!(f, "{} not found", what),
            ApiError::Forbidden(msg) => write!(f, "{}", msg),
            ApiError::Unauthorized => write!(f, "Authentication required"),
            ApiError::Database(err) => write!(f, "Database error: {}", err),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("invalid stored JSON: {}", err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
