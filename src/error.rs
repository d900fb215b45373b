/// Unified error types for the Curricula content API
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// When set, internal error details are returned to clients (development mode)
static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Enable or disable detailed internal error messages in HTTP responses
pub fn set_expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

/// Main error type for the content API
#[derive(Error, Debug)]
pub enum CmsError {
    /// Uploaded content has the wrong media type
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Uploaded content exceeds the configured ceiling
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Blob store could not write to its medium
    #[error("Storage write error: {0}")]
    StorageWrite(String),

    /// Storage name already in use; the store never overwrites
    #[error("Storage name taken: {0}")]
    NameTaken(String),

    /// Blob store refused or failed to access a path
    #[error("Storage access error: {0}")]
    StorageAccess(String),

    /// Compressor was handed a path it will not pass to a subprocess
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// External compressor failed (recoverable inside the upload pipeline)
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl CmsError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CmsError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CmsError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CmsError::StorageAccess(_) | CmsError::Authorization(_) => StatusCode::FORBIDDEN,
            CmsError::InvalidPath(_) | CmsError::Validation(_) => StatusCode::BAD_REQUEST,
            CmsError::NotFound(_) => StatusCode::NOT_FOUND,
            CmsError::NameTaken(_) => StatusCode::CONFLICT,
            CmsError::Authentication(_) => StatusCode::UNAUTHORIZED,
            CmsError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CmsError::StorageWrite(_)
            | CmsError::CompressionFailed(_)
            | CmsError::Database(_)
            | CmsError::Io(_)
            | CmsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may carry filesystem paths or driver output
    fn is_internal(&self) -> bool {
        matches!(
            self,
            CmsError::StorageWrite(_)
                | CmsError::StorageAccess(_)
                | CmsError::InvalidPath(_)
                | CmsError::CompressionFailed(_)
                | CmsError::Database(_)
                | CmsError::Io(_)
                | CmsError::Internal(_)
        )
    }
}

/// Convert CmsError to HTTP response
impl IntoResponse for CmsError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request_failed");
        }

        let message = if self.is_internal() && !EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
            // Don't leak details
            match status {
                StatusCode::FORBIDDEN => "Access to the requested file is not allowed".to_string(),
                StatusCode::BAD_REQUEST => "Invalid file path".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            match &self {
                CmsError::RateLimitExceeded { .. } => {
                    "Too many requests, please try again later".to_string()
                }
                _ => self.to_string(),
            }
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();

        if let CmsError::RateLimitExceeded { retry_after } = self {
            if let Ok(value) = retry_after.as_secs().max(1).to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Result type alias for content API operations
pub type CmsResult<T> = Result<T, CmsError>;
