//! The custodian facade.
//!
//! One handle over every store and engine, in the shape the REST boundary
//! consumes: authenticate a bearer token, then call the operation. The
//! custodian never sees key material in plaintext: envelopes, wrapped
//! FEKs, and file ciphertext are all opaque to it.

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::db::Db;
use crate::devices::DeviceRegistry;
use crate::envelopes::EnvelopeStore;
use crate::error::ServerResult;
use crate::files::FileService;
use crate::notifier::{ChannelConnection, RealtimeNotifier};
use crate::object_store::ObjectStore;
use crate::revocation::RevocationEngine;
use crate::users::UserStore;
use sealbox_types::{
    AuthTokens, ChannelHandshake, CreateEnvelopeRequest, DeviceRecord, DeviceStatus,
    DownloadResponse, EnvelopeRecord, FileRecord, LoginRequest, ReauthorizeDeviceRequest,
    RefreshRequest, RegisterDeviceRequest, RegisterUserRequest, RevokeDeviceRequest,
    UploadCompleteRequest, UploadInitRequest, UploadInitResponse, UserRecord,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct Custodian {
    users: Arc<UserStore>,
    devices: Arc<DeviceRegistry>,
    envelopes: Arc<EnvelopeStore>,
    auth: Arc<AuthService>,
    notifier: Arc<RealtimeNotifier>,
    revocation: RevocationEngine,
    files: FileService,
}

impl Custodian {
    pub fn new(db: Db, config: &ServerConfig, object_store: Arc<dyn ObjectStore>) -> Self {
        let users = Arc::new(UserStore::new(db.clone(), config.peppers.clone()));
        let devices = Arc::new(DeviceRegistry::new(db.clone()));
        let envelopes = Arc::new(EnvelopeStore::new(db.clone()));
        let auth = Arc::new(AuthService::new(
            db.clone(),
            users.clone(),
            devices.clone(),
            config,
        ));
        let notifier = Arc::new(RealtimeNotifier::new(auth.clone(), devices.clone()));
        let revocation = RevocationEngine::new(
            users.clone(),
            devices.clone(),
            envelopes.clone(),
            notifier.clone(),
        );
        let files = FileService::new(
            db,
            object_store,
            config.presign_expiry_secs,
            config.upload_rate_limit,
            config.upload_rate_window_secs,
        );
        Self {
            users,
            devices,
            envelopes,
            auth,
            notifier,
            revocation,
            files,
        }
    }

    // ── Accounts & sessions ──

    pub fn register_user(&self, req: &RegisterUserRequest) -> ServerResult<UserRecord> {
        self.users.create_user(&req.name, &req.email, &req.password)
    }

    pub fn login(
        &self,
        req: &LoginRequest,
        device_name: Option<&str>,
        client_ip: &str,
    ) -> ServerResult<AuthTokens> {
        self.auth
            .login(&req.email, &req.password, device_name, client_ip)
    }

    pub fn refresh(&self, req: &RefreshRequest) -> ServerResult<AuthTokens> {
        self.auth.refresh(&req.refresh_token)
    }

    pub fn authenticate(&self, access_token: &str) -> ServerResult<UserRecord> {
        self.auth.authenticate(access_token)
    }

    pub fn logout(&self, access_token: &str) -> ServerResult<()> {
        self.auth.logout(access_token)
    }

    // ── Device trust lifecycle ──

    pub fn register_device(
        &self,
        user_id: Uuid,
        req: &RegisterDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.devices.register(user_id, req)
    }

    pub fn list_devices(
        &self,
        user_id: Uuid,
        status_filter: Option<DeviceStatus>,
    ) -> ServerResult<Vec<DeviceRecord>> {
        self.devices.list(user_id, status_filter)
    }

    pub fn get_device(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<DeviceRecord> {
        self.devices.find_by_id(device_id, user_id)
    }

    pub fn deactivate_device(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<DeviceRecord> {
        self.devices.deactivate(user_id, device_id)
    }

    pub async fn revoke_device(
        &self,
        user_id: Uuid,
        acting_device_name: Option<&str>,
        req: &RevokeDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.revocation.revoke(user_id, acting_device_name, req).await
    }

    pub fn reauthorize_device(
        &self,
        user_id: Uuid,
        req: &ReauthorizeDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.revocation.reauthorize(user_id, req)
    }

    pub fn delete_device(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<()> {
        self.devices.delete(user_id, device_id)
    }

    // ── MDK envelopes ──

    pub fn create_envelope(
        &self,
        user_id: Uuid,
        req: &CreateEnvelopeRequest,
    ) -> ServerResult<EnvelopeRecord> {
        self.envelopes.create(user_id, req)
    }

    pub fn get_envelope(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<EnvelopeRecord> {
        self.envelopes.get_for_device(user_id, device_id)
    }

    // ── Files ──

    pub async fn upload_init(
        &self,
        user_id: Uuid,
        req: &UploadInitRequest,
    ) -> ServerResult<UploadInitResponse> {
        self.files.upload_init(user_id, req).await
    }

    pub async fn upload_complete(
        &self,
        user_id: Uuid,
        req: &UploadCompleteRequest,
    ) -> ServerResult<FileRecord> {
        self.files.upload_complete(user_id, req).await
    }

    pub async fn download(&self, user_id: Uuid, file_id: &str) -> ServerResult<DownloadResponse> {
        self.files.download(user_id, file_id).await
    }

    pub fn list_files(&self, user_id: Uuid) -> ServerResult<Vec<FileRecord>> {
        self.files.list(user_id)
    }

    pub async fn delete_file(&self, user_id: Uuid, file_id: &str) -> ServerResult<()> {
        self.files.delete(user_id, file_id).await
    }

    // ── Realtime channel ──

    pub async fn channel_connect(
        &self,
        handshake: &ChannelHandshake,
    ) -> ServerResult<ChannelConnection> {
        self.notifier.connect(handshake).await
    }

    pub async fn channel_ping(&self, user_id: Uuid, connection_id: Uuid) {
        self.notifier.ping(user_id, connection_id).await
    }

    pub async fn channel_disconnect(&self, user_id: Uuid, connection_id: Uuid) {
        self.notifier.disconnect(user_id, connection_id).await
    }
}
