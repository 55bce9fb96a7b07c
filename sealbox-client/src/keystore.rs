//! Local device keystore.
//!
//! The device private key is the only long-lived secret on disk, stored
//! passphrase-protected as JSON. The MDK is never written here; it lives
//! only in [`crate::session::VaultSession`].

use crate::error::{ClientError, ClientResult};
use sealbox_crypto::{
    generate_device_keypair, protect_secret_key, recover_secret_key, DeviceKeyPair,
    PassphraseProtectedKey,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of the key file.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    device_name: String,
    protected_key: PassphraseProtectedKey,
}

const KEY_FILE_VERSION: u32 = 1;

pub struct DeviceKeystore {
    path: PathBuf,
}

impl DeviceKeystore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Generates a fresh keypair and persists it under the passphrase.
    pub fn initialize(&self, device_name: &str, passphrase: &str) -> ClientResult<DeviceKeyPair> {
        let keypair = generate_device_keypair();
        self.save(device_name, &keypair, passphrase)?;
        Ok(keypair)
    }

    pub fn save(
        &self,
        device_name: &str,
        keypair: &DeviceKeyPair,
        passphrase: &str,
    ) -> ClientResult<()> {
        let file = KeyFile {
            version: KEY_FILE_VERSION,
            device_name: device_name.to_string(),
            protected_key: protect_secret_key(&keypair.secret, passphrase)?,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&file)?)?;
        tracing::debug!(path = %self.path.display(), "device key saved");
        Ok(())
    }

    /// Unlocks the stored keypair with the passphrase.
    pub fn load(&self, passphrase: &str) -> ClientResult<DeviceKeyPair> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            ClientError::Keystore(format!("no device key at {}: {e}", self.path.display()))
        })?;
        let file: KeyFile = serde_json::from_slice(&bytes)?;
        if file.version != KEY_FILE_VERSION {
            return Err(ClientError::Keystore(format!(
                "unsupported key file version {}",
                file.version
            )));
        }
        let secret = recover_secret_key(&file.protected_key, passphrase)?;
        Ok(DeviceKeyPair::from_secret_bytes(secret.to_bytes()))
    }

    /// Destroys the local key (revocation cleanup).
    pub fn wipe(&self) -> ClientResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            tracing::info!(path = %self.path.display(), "device key wiped");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealbox_crypto::CryptoError;

    fn keystore() -> (DeviceKeystore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (DeviceKeystore::new(dir.path().join("device_key.json")), dir)
    }

    #[test]
    fn initialize_then_load_recovers_the_same_keypair() {
        let (store, _dir) = keystore();
        let created = store.initialize("laptop", "hunter2-but-longer").unwrap();
        let loaded = store.load("hunter2-but-longer").unwrap();
        assert_eq!(created.public_bytes(), loaded.public_bytes());
    }

    #[test]
    fn wrong_passphrase_fails_to_unlock() {
        let (store, _dir) = keystore();
        store.initialize("laptop", "right-passphrase").unwrap();
        let err = store.load("wrong-passphrase").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Crypto(CryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn key_file_never_contains_plaintext_secret() {
        let (store, _dir) = keystore();
        let keypair = store.initialize("laptop", "passphrase").unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let secret_b64 = {
            use base64::engine::general_purpose::STANDARD;
            use base64::Engine;
            STANDARD.encode(keypair.secret.to_bytes())
        };
        assert!(!raw.contains(&secret_b64));
    }

    #[test]
    fn wipe_removes_the_file_and_is_idempotent() {
        let (store, _dir) = keystore();
        store.initialize("laptop", "passphrase").unwrap();
        assert!(store.exists());
        store.wipe().unwrap();
        assert!(!store.exists());
        store.wipe().unwrap();
    }
}
