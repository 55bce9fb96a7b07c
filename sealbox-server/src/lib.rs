//! Sealbox custodian core.
//!
//! The server side of the vault's key-custody protocol: accounts and
//! sessions, the device trust lifecycle, per-device MDK envelopes, the
//! revocation engine, the realtime notification hub, and the encrypted
//! file layer. The custodian stores every piece of key material opaquely
//! and can decrypt none of it.
//!
//! The REST boundary is a thin adapter over [`Custodian`]: authenticate
//! the bearer token, call the operation, map [`ServerError`] to a status
//! via [`ServerError::status_code`].

pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod devices;
pub mod envelopes;
pub mod error;
pub mod files;
pub mod notifier;
pub mod object_store;
pub mod rate_limit;
pub mod revocation;
pub mod users;

pub use auth::{AuthService, DEVICE_REVOKED};
pub use config::ServerConfig;
pub use crate::core::Custodian;
pub use db::{open, open_in_memory, Db};
pub use devices::DeviceRegistry;
pub use envelopes::EnvelopeStore;
pub use error::{ServerError, ServerResult};
pub use files::FileService;
pub use notifier::{ChannelConnection, RealtimeNotifier};
pub use object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use rate_limit::RateLimiter;
pub use revocation::RevocationEngine;
pub use users::UserStore;
