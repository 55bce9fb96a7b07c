//! Custodian configuration.

use sealbox_crypto::PepperSet;

/// Configuration for the Sealbox custodian core.
#[derive(Clone)]
pub struct ServerConfig {
    /// Versioned password-pepper secrets.
    pub peppers: PepperSet,

    /// Access token lifetime in seconds.
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl_secs: i64,

    /// Expiry window for presigned storage URLs, in seconds.
    pub presign_expiry_secs: u64,

    /// S3 bucket for file ciphertext.
    pub s3_bucket: String,

    /// AWS region for S3.
    pub s3_region: String,

    /// Optional S3 endpoint override (for MinIO in testing).
    pub s3_endpoint_override: Option<String>,

    /// Max login attempts per (ip, email) within the window.
    pub login_rate_limit: u32,
    pub login_rate_window_secs: u64,

    /// Max upload inits per user within the window.
    pub upload_rate_limit: u32,
    pub upload_rate_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Placeholder secret: deployments must supply their own.
            peppers: PepperSet::single(b"sealbox-dev-pepper-change-me!!!!".to_vec()),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 30 * 24 * 3600,
            presign_expiry_secs: 3600, // one hour
            s3_bucket: "sealbox-vault".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint_override: None,
            login_rate_limit: 10,
            login_rate_window_secs: 60,
            upload_rate_limit: 60,
            upload_rate_window_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Creates a config for tests with a fixed pepper and tight limits.
    pub fn test() -> Self {
        Self {
            peppers: PepperSet::single(b"test-pepper-0123456789abcdef0123".to_vec()),
            s3_endpoint_override: Some("http://localhost:9000".to_string()),
            login_rate_limit: 100,
            ..Self::default()
        }
    }
}
