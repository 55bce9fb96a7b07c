//! Custodian error taxonomy.
//!
//! The use-case layer raises these typed errors; the REST boundary maps
//! each variant to an HTTP status via [`ServerError::status_code`] and a
//! stable message. Storage and object-store provider errors are wrapped
//! generically so internals never leak to callers.

use thiserror::Error;

/// Result type for custodian operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in custodian operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Entity absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity exists but the caller lacks rights over it (ownership
    /// mismatch, device not active).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Duplicate unique constraint (email, envelope pair).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation illegal for the entity's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Bad credential, token, or password.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Admission control rejected the call.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("object storage error: {0}")]
    ObjectStore(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP status the REST boundary emits for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => 404,
            ServerError::Forbidden(_) => 403,
            ServerError::Conflict(_) => 409,
            ServerError::InvalidState(_) => 409,
            ServerError::Unauthorized(_) => 401,
            ServerError::RateLimited(_) => 429,
            ServerError::Storage(_)
            | ServerError::ObjectStore(_)
            | ServerError::Crypto(_)
            | ServerError::Serialization(_) => 500,
        }
    }
}

impl From<duckdb::Error> for ServerError {
    fn from(e: duckdb::Error) -> Self {
        ServerError::Storage(e.to_string())
    }
}

impl From<sealbox_crypto::CryptoError> for ServerError {
    fn from(e: sealbox_crypto::CryptoError) -> Self {
        match e {
            sealbox_crypto::CryptoError::InvalidPassword => {
                ServerError::Unauthorized("invalid password".to_string())
            }
            other => ServerError::Crypto(other.to_string()),
        }
    }
}
