//! Volatile vault session.
//!
//! Holds the unlocked MDK in memory only. Locking (or a revocation event)
//! drops the key; `MasterKey` zeroizes on drop.

use sealbox_crypto::MasterKey;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct VaultSession {
    mdk: RwLock<Option<MasterKey>>,
}

impl VaultSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn unlock(&self, mdk: MasterKey) {
        *self.mdk.write().await = Some(mdk);
    }

    pub async fn is_unlocked(&self) -> bool {
        self.mdk.read().await.is_some()
    }

    /// Clones the MDK for a crypto operation, if unlocked.
    pub async fn master_key(&self) -> Option<MasterKey> {
        self.mdk.read().await.clone()
    }

    /// Drops the MDK from memory.
    pub async fn lock(&self) {
        *self.mdk.write().await = None;
    }
}
