//! Two-stage password hashing: HMAC-SHA256 pepper, then Argon2id.
//!
//! The pepper is a server-wide secret applied before Argon2id so that a
//! leaked database alone is not enough to mount an offline attack. Peppers
//! are versioned: the version used at hash time is stored next to the PHC
//! string, so the active pepper can be rotated without invalidating
//! existing hashes. Argon2 cost parameters travel inside the PHC string
//! and are therefore bound at creation time.

use crate::error::{CryptoError, CryptoResult};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Argon2id memory cost in KiB (19 MiB).
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
/// Argon2id iteration count.
const ARGON2_ITERATIONS: u32 = 2;
/// Argon2id lanes.
const ARGON2_PARALLELISM: u32 = 1;

/// Versioned set of server-wide pepper secrets.
///
/// `current` is used for new hashes; older versions stay resolvable so
/// stored hashes keep verifying after a rotation.
#[derive(Clone)]
pub struct PepperSet {
    current: u8,
    secrets: HashMap<u8, Vec<u8>>,
}

impl PepperSet {
    pub fn new(current: u8, secrets: HashMap<u8, Vec<u8>>) -> CryptoResult<Self> {
        if !secrets.contains_key(&current) {
            return Err(CryptoError::UnknownPepperVersion(current));
        }
        Ok(Self { current, secrets })
    }

    /// Single-version set (version 1) for first deployments and tests.
    pub fn single(secret: impl Into<Vec<u8>>) -> Self {
        let mut secrets = HashMap::new();
        secrets.insert(1, secret.into());
        Self {
            current: 1,
            secrets,
        }
    }

    pub fn current_version(&self) -> u8 {
        self.current
    }

    fn secret_for(&self, version: u8) -> CryptoResult<&[u8]> {
        self.secrets
            .get(&version)
            .map(Vec::as_slice)
            .ok_or(CryptoError::UnknownPepperVersion(version))
    }
}

/// A stored credential: the Argon2id PHC string plus the pepper version
/// that was applied before hashing.
#[derive(Clone, Debug)]
pub struct PasswordRecord {
    pub phc: String,
    pub pepper_version: u8,
}

/// Stage one: HMAC-SHA256 the password with the pepper secret.
fn prehash(password: &str, pepper: &[u8]) -> CryptoResult<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(pepper)
        .map_err(|e| CryptoError::KeyDerivation(format!("pepper HMAC init: {e}")))?;
    mac.update(password.as_bytes());
    Ok(mac.finalize().into_bytes().into())
}

fn argon2() -> CryptoResult<Argon2<'static>> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, None)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password with the current pepper version and a fresh salt.
pub fn hash_password(password: &str, peppers: &PepperSet) -> CryptoResult<PasswordRecord> {
    let pepper = peppers.secret_for(peppers.current)?;
    let peppered = prehash(password, pepper)?;

    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let phc = argon2()?
        .hash_password(&peppered, &salt)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 hash: {e}")))?
        .to_string();

    Ok(PasswordRecord {
        phc,
        pepper_version: peppers.current,
    })
}

/// Verifies a password against a stored record.
///
/// Fails closed: any parse or derivation problem surfaces as an error, and
/// a mismatch is `CryptoError::InvalidPassword`. The pepper version stored
/// with the hash selects the secret, so rotated peppers keep verifying.
pub fn verify_password(
    password: &str,
    record: &PasswordRecord,
    peppers: &PepperSet,
) -> CryptoResult<()> {
    let pepper = peppers.secret_for(record.pepper_version)?;
    let peppered = prehash(password, pepper)?;

    let parsed = PasswordHash::new(&record.phc)
        .map_err(|e| CryptoError::KeyDerivation(format!("stored hash malformed: {e}")))?;

    // Cost parameters come from the PHC string, not from this context.
    Argon2::default()
        .verify_password(&peppered, &parsed)
        .map_err(|_| CryptoError::InvalidPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peppers() -> PepperSet {
        PepperSet::single(*b"server-wide-pepper-secret-32byte")
    }

    #[test]
    fn hash_then_verify_succeeds() {
        let record = hash_password("Secret1!", &peppers()).unwrap();
        assert_eq!(record.pepper_version, 1);
        verify_password("Secret1!", &record, &peppers()).unwrap();
    }

    #[test]
    fn wrong_password_is_rejected() {
        let record = hash_password("Secret1!", &peppers()).unwrap();
        let err = verify_password("secret1!", &record, &peppers()).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPassword));
    }

    #[test]
    fn same_password_different_salts() {
        let a = hash_password("Secret1!", &peppers()).unwrap();
        let b = hash_password("Secret1!", &peppers()).unwrap();
        assert_ne!(a.phc, b.phc);
    }

    #[test]
    fn rotated_pepper_still_verifies_old_hashes() {
        let old = peppers();
        let record = hash_password("Secret1!", &old).unwrap();

        let mut secrets = HashMap::new();
        secrets.insert(1, b"server-wide-pepper-secret-32byte".to_vec());
        secrets.insert(2, b"rotated-pepper-secret-version-02".to_vec());
        let rotated = PepperSet::new(2, secrets).unwrap();

        // Old hash verifies via version 1; new hashes use version 2.
        verify_password("Secret1!", &record, &rotated).unwrap();
        let fresh = hash_password("Secret1!", &rotated).unwrap();
        assert_eq!(fresh.pepper_version, 2);
    }

    #[test]
    fn unknown_pepper_version_is_an_error_not_a_mismatch() {
        let record = PasswordRecord {
            phc: "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into(),
            pepper_version: 9,
        };
        let err = verify_password("x", &record, &peppers()).unwrap_err();
        assert!(matches!(err, CryptoError::UnknownPepperVersion(9)));
    }

    #[test]
    fn phc_string_records_cost_parameters() {
        let record = hash_password("Secret1!", &peppers()).unwrap();
        assert!(record.phc.contains("m=19456"));
        assert!(record.phc.contains("t=2"));
    }
}
