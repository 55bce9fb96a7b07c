//! Client configuration.

use std::path::PathBuf;

/// Configuration for one device's vault client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the custodian API, no trailing slash.
    pub api_base_url: String,

    /// This device's stable name (unique per account).
    pub device_name: String,

    /// Where the passphrase-protected device key lives. `None` uses the
    /// platform data directory.
    pub key_path: Option<PathBuf>,

    /// HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            device_name: device_name.into(),
            key_path: None,
            request_timeout_secs: 30,
        }
    }

    /// Resolves the device key file path.
    pub fn key_path(&self) -> PathBuf {
        self.key_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sealbox")
                .join("device_key.json")
        })
    }
}
