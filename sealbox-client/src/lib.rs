//! Sealbox device-side client.
//!
//! Everything a device needs to participate in the vault: the custodian
//! API client (bearer auth, refresh-on-401, revocation detection), the
//! passphrase-protected local keystore, the volatile vault session holding
//! the MDK, the custody protocol for moving the MDK between devices, and
//! the encrypted file pipeline.

pub mod api_client;
pub mod config;
pub mod custody;
pub mod error;
pub mod files;
pub mod keystore;
pub mod session;

pub use api_client::{ApiClient, DEVICE_NAME_HEADER, DEVICE_REVOKED_MARKER};
pub use config::ClientConfig;
pub use custody::{parse_public_key, CustodyProtocol};
pub use error::{ClientError, ClientResult};
pub use files::FileVault;
pub use keystore::DeviceKeystore;
pub use session::VaultSession;
