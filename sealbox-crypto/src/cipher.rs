//! AES-256-GCM authenticated encryption.
//!
//! The file-content and FEK-wrapping operations of the vault both use
//! AES-256-GCM with a fresh random 96-bit nonce per operation. The 128-bit
//! authentication tag is appended to the ciphertext by the AEAD.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sealbox_types::EncryptionMetadata;
use serde::{Deserialize, Serialize};

/// Nonce size for AES-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended to the ciphertext (128 bits).
pub const TAG_SIZE: usize = 16;

/// Ciphertext with its nonce. The Poly1305/GCM tag is part of `ciphertext`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Wire encoding: `nonce || ciphertext`, base64. Used for wrapped FEKs
    /// stored as opaque strings.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        BASE64.encode(bytes)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::Encoding(format!("ciphertext base64: {e}")))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Encoding(format!(
                "ciphertext too short: {} bytes",
                bytes.len()
            )));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Encrypts plaintext under a 32-byte key with a fresh random nonce.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(format!("bad key: {e}")))?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM encrypt failed: {e}")))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts and authenticates ciphertext under a 32-byte key.
pub fn decrypt(key: &[u8; 32], data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Decryption(format!("bad key: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("AES-GCM decrypt failed (wrong key or tampered data)".into())
        })
}

/// Builds the metadata block recorded alongside an AES-GCM ciphertext.
pub fn gcm_metadata(nonce: &[u8; NONCE_SIZE]) -> EncryptionMetadata {
    EncryptionMetadata {
        algorithm: "aes-256-gcm".to_string(),
        hash: None,
        iv: Some(BASE64.encode(nonce)),
        tag_bits: Some((TAG_SIZE * 8) as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut k);
        k
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let k = key();
        let data = encrypt(&k, b"file bytes").unwrap();
        assert_eq!(decrypt(&k, &data).unwrap(), b"file bytes");
    }

    #[test]
    fn ciphertext_includes_tag() {
        let k = key();
        let data = encrypt(&k, b"x").unwrap();
        assert_eq!(data.ciphertext.len(), 1 + TAG_SIZE);
    }

    #[test]
    fn wrong_key_fails() {
        let data = encrypt(&key(), b"secret").unwrap();
        assert!(decrypt(&key(), &data).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key();
        let mut data = encrypt(&k, b"secret").unwrap();
        data.ciphertext[0] ^= 0xFF;
        assert!(decrypt(&k, &data).is_err());
    }

    #[test]
    fn wire_encoding_roundtrips() {
        let k = key();
        let data = encrypt(&k, b"secret").unwrap();
        let decoded = EncryptedData::from_base64(&data.to_base64()).unwrap();
        assert_eq!(decrypt(&k, &decoded).unwrap(), b"secret");

        assert!(EncryptedData::from_base64("AAAA").is_err());
    }

    #[test]
    fn metadata_names_algorithm_and_iv() {
        let k = key();
        let data = encrypt(&k, b"secret").unwrap();
        let meta = gcm_metadata(&data.nonce);
        assert_eq!(meta.algorithm, "aes-256-gcm");
        assert_eq!(meta.tag_bits, Some(128));
        assert!(meta.iv.is_some());
    }
}
