//! Device-side custody protocol.
//!
//! The flows that move the MDK between devices without it ever touching
//! the wire in plaintext: first-device setup (mint the MDK, seal it to
//! yourself), joining (register and wait to be authorized), authorizing a
//! peer (seal the MDK to its enrolled public key), and reacting to a
//! revocation event by destroying every local secret.

use crate::api_client::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::keystore::DeviceKeystore;
use crate::session::VaultSession;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sealbox_crypto::{
    envelope_metadata, open_master_key, seal_master_key, DeviceKeyPair, MasterKey, PublicKey,
    SealedEnvelope,
};
use sealbox_types::{ChannelEvent, CreateEnvelopeRequest, DeviceRecord, RegisterDeviceRequest};
use std::sync::Arc;

pub struct CustodyProtocol {
    api: Arc<ApiClient>,
    keystore: DeviceKeystore,
    session: Arc<VaultSession>,
}

impl CustodyProtocol {
    pub fn new(api: Arc<ApiClient>, keystore: DeviceKeystore, session: Arc<VaultSession>) -> Self {
        Self {
            api,
            keystore,
            session,
        }
    }

    pub fn session(&self) -> &Arc<VaultSession> {
        &self.session
    }

    fn enrollment(&self, keypair: &DeviceKeyPair) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            device_name: self.api.device_name().to_string(),
            public_key: keypair.public_base64(),
            key_format: "x25519-raw".to_string(),
            fingerprint: keypair.fingerprint(),
        }
    }

    /// First-device setup: generate the device keypair, enroll it, mint
    /// the account MDK, and seal it to this device. The MDK exists only
    /// here and inside the stored envelope.
    pub async fn setup_first_device(&self, passphrase: &str) -> ClientResult<DeviceRecord> {
        let keypair = self.keystore.initialize(self.api.device_name(), passphrase)?;
        let device = self.api.register_device(&self.enrollment(&keypair)).await?;

        let mdk = MasterKey::generate();
        let sealed = seal_master_key(&mdk, &keypair.public)?;
        self.api
            .store_envelope(&CreateEnvelopeRequest {
                device_id: device.id,
                ciphertext: sealed.to_base64(),
                metadata: envelope_metadata(),
            })
            .await?;

        self.session.unlock(mdk).await;
        tracing::info!(device_id = %device.id, "vault initialized on first device");
        Ok(device)
    }

    /// Joining device: enroll a fresh keypair and wait to be authorized.
    /// The MDK arrives later, via [`Self::fetch_master_key`], once another
    /// device has sealed an envelope for us.
    pub async fn join(&self, passphrase: &str) -> ClientResult<DeviceRecord> {
        let keypair = self.keystore.initialize(self.api.device_name(), passphrase)?;
        let device = self.api.register_device(&self.enrollment(&keypair)).await?;
        tracing::info!(device_id = %device.id, "device enrolled, awaiting authorization");
        Ok(device)
    }

    /// Fetches and opens this device's envelope, unlocking the session.
    pub async fn fetch_master_key(&self, passphrase: &str) -> ClientResult<MasterKey> {
        let keypair = self.keystore.load(passphrase)?;
        let device = self.own_device().await?;
        let envelope = self.api.get_envelope(device.id).await?;
        let sealed = SealedEnvelope::from_base64(&envelope.ciphertext)?;
        let mdk = open_master_key(&sealed, &keypair.secret)?;
        self.session.unlock(mdk.clone()).await;
        Ok(mdk)
    }

    /// Authorizes a peer device: seals the session MDK to its enrolled
    /// public key. Requires an unlocked session; the custodian cannot do
    /// this for us.
    pub async fn authorize_device(&self, peer_device_name: &str) -> ClientResult<DeviceRecord> {
        let mdk = self
            .session
            .master_key()
            .await
            .ok_or(ClientError::AuthRequired)?;

        let peer = self
            .api
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.device_name == peer_device_name)
            .ok_or_else(|| ClientError::Api(format!("no device named '{peer_device_name}'")))?;

        let public = parse_public_key(&peer.public_key)?;
        let sealed = seal_master_key(&mdk, &public)?;
        self.api
            .store_envelope(&CreateEnvelopeRequest {
                device_id: peer.id,
                ciphertext: sealed.to_base64(),
                metadata: envelope_metadata(),
            })
            .await?;
        tracing::info!(peer = %peer.device_name, "peer device authorized");
        Ok(peer)
    }

    /// Reacts to a realtime event. A revocation naming this device wipes
    /// the session MDK, the local key file, and the API session; returns
    /// whether a wipe happened.
    pub async fn handle_event(&self, event: &ChannelEvent) -> ClientResult<bool> {
        match event {
            ChannelEvent::DeviceRevoked { device_name, .. }
                if device_name == self.api.device_name() =>
            {
                tracing::warn!("this device was revoked; destroying local secrets");
                self.session.lock().await;
                self.keystore.wipe()?;
                self.api.clear_session().await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn own_device(&self) -> ClientResult<DeviceRecord> {
        let name = self.api.device_name().to_string();
        self.api
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.device_name == name)
            .ok_or_else(|| ClientError::Api(format!("device '{name}' is not registered")))
    }
}

/// Decodes a base64 X25519 public key as enrolled in the registry.
pub fn parse_public_key(encoded: &str) -> ClientResult<PublicKey> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| ClientError::Api(format!("invalid public key encoding: {e}")))?;
    if bytes.len() != 32 {
        return Err(ClientError::Api(format!(
            "invalid public key length: expected 32, got {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(PublicKey::from(key))
}
