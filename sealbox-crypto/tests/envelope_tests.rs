//! Adversarial tests for MDK envelope encryption (X25519 + XSalsa20-Poly1305).
//!
//! Validates that:
//! - Wrong recipient key rejects decryption
//! - Tampered ciphertext / nonce / ephemeral key are detected
//! - Wire encoding round-trips and rejects truncation
//! - Every seal is unlinkable (fresh ephemeral key + nonce)

use sealbox_crypto::envelope::{
    fingerprint, generate_device_keypair, open_master_key, seal_master_key, SealedEnvelope,
};
use sealbox_crypto::{CryptoError, MasterKey};

#[test]
fn seal_and_open_roundtrip() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let envelope = seal_master_key(&mdk, &device.public).unwrap();
    let opened = open_master_key(&envelope, &device.secret).unwrap();
    assert_eq!(opened, mdk);
}

#[test]
fn open_with_wrong_secret_key_fails() {
    let intended = generate_device_keypair();
    let wrong = generate_device_keypair();
    let mdk = MasterKey::generate();

    let envelope = seal_master_key(&mdk, &intended.public).unwrap();

    let err = open_master_key(&envelope, &wrong.secret).unwrap_err();
    match err {
        CryptoError::Decryption(msg) => {
            assert!(
                msg.contains("wrong key") || msg.contains("tampered"),
                "should indicate wrong key or tampered data, got: {msg}"
            );
        }
        other => panic!("expected CryptoError::Decryption, got: {other:?}"),
    }
}

#[test]
fn tampered_ciphertext_detected() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let mut envelope = seal_master_key(&mdk, &device.public).unwrap();
    if let Some(byte) = envelope.ciphertext.first_mut() {
        *byte ^= 0xFF;
    }

    let err = open_master_key(&envelope, &device.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn tampered_nonce_detected() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let mut envelope = seal_master_key(&mdk, &device.public).unwrap();
    envelope.nonce[0] ^= 0xFF;

    let err = open_master_key(&envelope, &device.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn tampered_ephemeral_key_detected() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let mut envelope = seal_master_key(&mdk, &device.public).unwrap();
    envelope.ephemeral_public_key[0] ^= 0xFF;

    let err = open_master_key(&envelope, &device.secret).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn each_seal_is_unlinkable() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let env1 = seal_master_key(&mdk, &device.public).unwrap();
    let env2 = seal_master_key(&mdk, &device.public).unwrap();

    assert_ne!(env1.ephemeral_public_key, env2.ephemeral_public_key);
    assert_ne!(env1.nonce, env2.nonce);
    assert_ne!(env1.ciphertext, env2.ciphertext);

    assert_eq!(open_master_key(&env1, &device.secret).unwrap(), mdk);
    assert_eq!(open_master_key(&env2, &device.secret).unwrap(), mdk);
}

#[test]
fn wire_encoding_roundtrips() {
    let device = generate_device_keypair();
    let mdk = MasterKey::generate();

    let envelope = seal_master_key(&mdk, &device.public).unwrap();
    let encoded = envelope.to_base64();
    let decoded = SealedEnvelope::from_base64(&encoded).unwrap();

    assert_eq!(decoded.ephemeral_public_key, envelope.ephemeral_public_key);
    assert_eq!(decoded.nonce, envelope.nonce);
    assert_eq!(decoded.ciphertext, envelope.ciphertext);
    assert_eq!(open_master_key(&decoded, &device.secret).unwrap(), mdk);
}

#[test]
fn truncated_wire_encoding_rejected() {
    let err = SealedEnvelope::from_base64("AAAA").unwrap_err();
    assert!(matches!(err, CryptoError::Encoding(_)));

    let err = SealedEnvelope::from_base64("not base64 !!!").unwrap_err();
    assert!(matches!(err, CryptoError::Encoding(_)));
}

#[test]
fn fingerprint_is_stable_sha256_hex() {
    let device = generate_device_keypair();
    let fp = device.fingerprint();
    assert_eq!(fp.len(), 64);
    assert_eq!(fp, fingerprint(&device.public_bytes()));

    let other = generate_device_keypair();
    assert_ne!(fp, other.fingerprint());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Seal-then-open must recover the exact MDK bytes for arbitrary
        // key material.
        #[test]
        fn seal_open_recovers_exact_mdk(bytes in proptest::array::uniform32(any::<u8>())) {
            let device = generate_device_keypair();
            let mdk = MasterKey::from_bytes(bytes);

            let envelope = seal_master_key(&mdk, &device.public).unwrap();
            let opened = open_master_key(&envelope, &device.secret).unwrap();
            prop_assert_eq!(opened.as_bytes(), &bytes);
        }
    }
}
