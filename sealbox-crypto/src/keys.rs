//! The MDK and FEK symmetric keys.
//!
//! Both are random AES-256 keys. The MDK lives only in device memory or
//! inside envelope ciphertext; the FEK is per-file and travels wrapped by
//! the MDK. Both zeroize on drop.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size (AES-256).
pub const KEY_SIZE: usize = 32;

/// The Master Decryption Key: one per account, never persisted anywhere.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generates a fresh random MDK.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Keep key material out of logs.
impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// A per-file encryption key, wrapped by the MDK before leaving the device.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; KEY_SIZE]);

impl FileKey {
    /// Generates a fresh random FEK.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey(..)")
    }
}

/// Wraps a FEK under the MDK (AES-GCM, independent nonce from the content
/// encryption).
pub fn wrap_file_key(fek: &FileKey, mdk: &MasterKey) -> CryptoResult<EncryptedData> {
    encrypt(mdk.as_bytes(), fek.as_bytes())
}

/// Unwraps a FEK using the MDK.
pub fn unwrap_file_key(wrapped: &EncryptedData, mdk: &MasterKey) -> CryptoResult<FileKey> {
    let plaintext = decrypt(mdk.as_bytes(), wrapped)?;
    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: plaintext.len(),
        });
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    Ok(FileKey::from_bytes(bytes))
}
