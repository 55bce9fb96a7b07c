//! Envelope encryption for per-device MDK distribution.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305 to seal the MDK for one
//! device's public key. An ephemeral keypair is generated per seal, so the
//! envelope reveals nothing about the sending device. The device private
//! key never leaves the device; the MDK travels only inside envelopes.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{MasterKey, KEY_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
pub use crypto_box::{PublicKey, SecretKey};
use rand::RngCore;
use sealbox_types::EncryptionMetadata;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// X25519 keypair identifying one device.
///
/// The secret key implements `ZeroizeOnDrop` automatically (from crypto_box).
#[derive(Debug)]
pub struct DeviceKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl DeviceKeyPair {
    /// Returns the public key as raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Base64 public key as enrolled with the device registry.
    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// SHA-256 hex fingerprint of the public key (display/audit only).
    pub fn fingerprint(&self) -> String {
        fingerprint(self.public.as_bytes())
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// Generates a new X25519 device keypair.
pub fn generate_device_keypair() -> DeviceKeyPair {
    let secret = SecretKey::generate(&mut rand::rngs::OsRng);
    let public = secret.public_key();
    DeviceKeyPair { secret, public }
}

/// SHA-256 hex digest of a public key encoding.
pub fn fingerprint(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// The MDK sealed for one device's public key.
///
/// The ephemeral public key is included so the recipient can reconstruct
/// the shared secret with its own secret key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; 24],
    /// Encrypted MDK (XSalsa20-Poly1305 ciphertext + Poly1305 tag).
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Wire encoding: `ephemeral_pk || nonce || ciphertext`, base64.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(32 + 24 + self.ciphertext.len());
        bytes.extend_from_slice(&self.ephemeral_public_key);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        BASE64.encode(bytes)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::Encoding(format!("envelope base64: {e}")))?;
        if bytes.len() < 32 + 24 {
            return Err(CryptoError::Encoding(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let mut ephemeral_public_key = [0u8; 32];
        ephemeral_public_key.copy_from_slice(&bytes[..32]);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&bytes[32..56]);
        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext: bytes[56..].to_vec(),
        })
    }
}

/// Seals the MDK for a recipient device public key.
///
/// A fresh ephemeral X25519 keypair is generated per seal, so two envelopes
/// of the same MDK are unlinkable.
pub fn seal_master_key(mdk: &MasterKey, recipient_pk: &PublicKey) -> CryptoResult<SealedEnvelope> {
    let ephemeral = SecretKey::generate(&mut rand::rngs::OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), mdk.as_bytes().as_slice())
        .map_err(|e| CryptoError::Encryption(format!("envelope seal failed: {e}")))?;

    Ok(SealedEnvelope {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed envelope with the device's secret key, recovering the MDK.
pub fn open_master_key(
    envelope: &SealedEnvelope,
    recipient_sk: &SecretKey,
) -> CryptoResult<MasterKey> {
    let ephemeral_pk = PublicKey::from(envelope.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    let plaintext = salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_ref(),
        )
        .map_err(|_| {
            CryptoError::Decryption("envelope open failed (wrong key or tampered data)".to_string())
        })?;

    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: plaintext.len(),
        });
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    Ok(MasterKey::from_bytes(bytes))
}

/// Metadata block recorded alongside an envelope ciphertext.
pub fn envelope_metadata() -> EncryptionMetadata {
    EncryptionMetadata {
        algorithm: "x25519-xsalsa20-poly1305".to_string(),
        hash: Some("sha-256".to_string()),
        iv: None,
        tag_bits: Some(128),
    }
}
