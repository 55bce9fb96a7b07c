//! Encryption layer for Sealbox.
//!
//! Provides the key-custody primitives of the vault:
//! - AES-256-GCM for MDK/FEK symmetric encryption
//! - X25519 sealed envelopes for per-device MDK distribution
//! - Argon2id with a versioned HMAC-SHA256 pepper for password hashing
//! - Passphrase protection for the local device private key
//!
//! # Architecture
//!
//! The vault uses a three-tier key system:
//!
//! 1. **MDK (Master Decryption Key)**: a random AES-256 key generated once
//!    per account. It exists only in device memory and inside envelope
//!    ciphertext; it is never stored or transmitted in plaintext.
//!
//! 2. **Device keypair**: an X25519 keypair per device. The private key
//!    never leaves the device; the public key is enrolled at registration.
//!    The MDK travels between devices only as a sealed envelope addressed
//!    to one device's public key.
//!
//! 3. **FEK (File Encryption Key)**: a random key per file, wrapping the
//!    file content; the FEK itself is wrapped by the MDK.
//!
//! This allows revoking a device without re-encrypting any files, and
//! rotating the password without touching the MDK.

mod cipher;
mod error;
mod keys;
mod keystore;
pub mod envelope;
pub mod password;

pub use cipher::{decrypt, encrypt, gcm_metadata, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    envelope_metadata, fingerprint, generate_device_keypair, open_master_key, seal_master_key,
    DeviceKeyPair, PublicKey, SealedEnvelope, SecretKey,
};
pub use error::{CryptoError, CryptoResult};
pub use keys::{unwrap_file_key, wrap_file_key, FileKey, MasterKey, KEY_SIZE};
pub use keystore::{protect_secret_key, recover_secret_key, PassphraseProtectedKey};
pub use password::{hash_password, verify_password, PasswordRecord, PepperSet};
