//! Client-side error taxonomy.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No session; call `login` first.
    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server told us this device was revoked. The caller must wipe
    /// cached secrets and re-run the authorization flow.
    #[error("device revoked: {0}")]
    DeviceRevoked(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] sealbox_crypto::CryptoError),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
