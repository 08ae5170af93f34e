//! Error types for token operations

use crate::api::ApiError;

/// Errors from token fetch, refresh and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
