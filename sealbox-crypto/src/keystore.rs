//! Passphrase protection for the local device private key.
//!
//! The device private key is the only long-lived secret the client writes
//! to disk, and it is never written in plaintext: Argon2id derives a key
//! from the passphrase, ChaCha20-Poly1305 encrypts the key bytes, and the
//! salt travels with the ciphertext so the passphrase is the only input
//! needed to recover it. The MDK itself is never stored this way; it
//! stays strictly in memory.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use crypto_box::SecretKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const SALT_SIZE: usize = 16;
const CHACHA_NONCE_SIZE: usize = 12;

/// A private key encrypted with a passphrase (Argon2id -> ChaCha20-Poly1305).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassphraseProtectedKey {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; CHACHA_NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Derives a 32-byte key from a passphrase and salt with Argon2id.
fn derive_key(passphrase: &str, salt: &[u8; SALT_SIZE]) -> CryptoResult<[u8; 32]> {
    let params = Params::new(19 * 1024, 2, 1, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

/// Encrypts a device secret key with a passphrase for at-rest storage.
pub fn protect_secret_key(
    sk: &SecretKey,
    passphrase: &str,
) -> CryptoResult<PassphraseProtectedKey> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt)?;

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CryptoError::Encryption(format!("bad derived key: {e}")))?;

    let mut nonce = [0u8; CHACHA_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), sk.to_bytes().as_slice())
        .map_err(|e| CryptoError::Encryption(format!("key protect failed: {e}")))?;

    Ok(PassphraseProtectedKey {
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypts a passphrase-protected device secret key.
pub fn recover_secret_key(
    protected: &PassphraseProtectedKey,
    passphrase: &str,
) -> CryptoResult<SecretKey> {
    let key = derive_key(passphrase, &protected.salt)?;

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CryptoError::Decryption(format!("bad derived key: {e}")))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&protected.nonce),
            protected.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::InvalidPassword)?;

    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: plaintext.len(),
        });
    }

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&plaintext);
    Ok(SecretKey::from(bytes))
}
