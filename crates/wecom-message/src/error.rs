//! Error types for message operations

use wecom_auth::ApiError;

/// Errors from sending messages and uploading media.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Platform rejection or exhausted retries.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("media file error: {0}")]
    Media(String),

    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("HTTP client build failed: {0}")]
    Client(String),
}

/// Result alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;
