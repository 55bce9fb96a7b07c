//! HTTP client for the custodian API.
//!
//! Handles bearer authentication, token refresh on 401, and the custody
//! endpoints. Every request carries the device name header so the server
//! can bind sessions to this device; a refresh answered with the
//! `DEVICE_REVOKED` marker surfaces as [`ClientError::DeviceRevoked`] and
//! clears the session.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use reqwest::Client;
use sealbox_types::{
    AuthTokens, CreateEnvelopeRequest, DeviceRecord, DownloadResponse, EnvelopeRecord, FileRecord,
    ReauthorizeDeviceRequest, RegisterDeviceRequest, RegisterUserRequest, RevokeDeviceRequest,
    UploadCompleteRequest, UploadInitRequest, UploadInitResponse, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Header naming the device a request originates from.
pub const DEVICE_NAME_HEADER: &str = "x-device-name";

/// Marker the custodian puts in refresh failures for revoked devices.
pub const DEVICE_REVOKED_MARKER: &str = "DEVICE_REVOKED";

/// State shared across API client clones.
struct AuthState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<Uuid>,
    /// Bumped on every successful refresh; lets a waiter detect that a
    /// concurrent refresh already rotated the tokens.
    refresh_generation: u64,
}

/// HTTP client for the Sealbox custodian.
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
    auth: Arc<RwLock<AuthState>>,
    /// Serializes refresh operations. Without this, concurrent 401s all
    /// read the same old refresh token; the server rotates on the first
    /// call and the rest fail.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            auth: Arc::new(RwLock::new(AuthState {
                access_token: None,
                refresh_token: None,
                user_id: None,
                refresh_generation: 0,
            })),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.config.device_name
    }

    /// Restores a saved session.
    pub async fn set_tokens(&self, access_token: String, refresh_token: String, user_id: Uuid) {
        let mut auth = self.auth.write().await;
        auth.access_token = Some(access_token);
        auth.refresh_token = Some(refresh_token);
        auth.user_id = Some(user_id);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.read().await.access_token.is_some()
    }

    pub async fn user_id(&self) -> Option<Uuid> {
        self.auth.read().await.user_id
    }

    pub async fn clear_session(&self) {
        let mut auth = self.auth.write().await;
        auth.access_token = None;
        auth.refresh_token = None;
        auth.user_id = None;
    }

    // ── Accounts & sessions ──

    pub async fn register_user(&self, req: &RegisterUserRequest) -> ClientResult<UserRecord> {
        let url = format!("{}/api/auth/register", self.config.api_base_url);
        let resp = self.client.post(&url).json(req).send().await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<AuthTokens> {
        let url = format!("{}/api/auth/login", self.config.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header(DEVICE_NAME_HEADER, &self.config.device_name)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::AuthFailed("invalid email or password".into()));
        }
        let tokens: AuthTokens = Self::json_or_api_error(resp).await?;
        self.set_tokens(
            tokens.access_token.clone(),
            tokens.refresh_token.clone(),
            tokens.user.id,
        )
        .await;
        Ok(tokens)
    }

    pub async fn logout(&self) -> ClientResult<()> {
        if let Ok(token) = self.get_token().await {
            let url = format!("{}/api/auth/logout", self.config.api_base_url);
            let _ = self.client.post(&url).bearer_auth(&token).send().await;
        }
        self.clear_session().await;
        Ok(())
    }

    pub async fn refresh_access_token(&self) -> ClientResult<String> {
        // Capture the generation before taking the lock so a refresh that
        // completed while we waited is detected.
        let pre_gen = self.auth.read().await.refresh_generation;

        let _guard = self.refresh_lock.lock().await;

        {
            let auth = self.auth.read().await;
            if auth.refresh_generation > pre_gen {
                return auth.access_token.clone().ok_or(ClientError::AuthRequired);
            }
        }

        let refresh_token = {
            let auth = self.auth.read().await;
            auth.refresh_token.clone().ok_or(ClientError::AuthRequired)?
        };

        let url = format!("{}/api/auth/refresh", self.config.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header(DEVICE_NAME_HEADER, &self.config.device_name)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            let body = resp.text().await.unwrap_or_default();
            self.clear_session().await;
            if body.contains(DEVICE_REVOKED_MARKER) {
                return Err(ClientError::DeviceRevoked(
                    "access from this device has been revoked".to_string(),
                ));
            }
            return Err(ClientError::AuthFailed(
                "token refresh failed: session expired, re-authentication required".to_string(),
            ));
        }

        let tokens: AuthTokens = Self::json_or_api_error(resp).await?;

        let mut auth = self.auth.write().await;
        auth.access_token = Some(tokens.access_token.clone());
        auth.refresh_token = Some(tokens.refresh_token);
        auth.user_id = Some(tokens.user.id);
        auth.refresh_generation += 1;

        Ok(tokens.access_token)
    }

    // ── Devices ──

    pub async fn register_device(&self, req: &RegisterDeviceRequest) -> ClientResult<DeviceRecord> {
        let resp = self.auth_post("/api/devices", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn list_devices(&self) -> ClientResult<Vec<DeviceRecord>> {
        let resp = self.auth_get("/api/devices").await?;

        #[derive(Deserialize)]
        struct Resp {
            devices: Vec<DeviceRecord>,
        }
        let data: Resp = Self::json_or_api_error(resp).await?;
        Ok(data.devices)
    }

    pub async fn deactivate_device(&self, device_id: Uuid) -> ClientResult<DeviceRecord> {
        let resp = self
            .auth_post(
                &format!("/api/devices/{device_id}/deactivate"),
                &serde_json::json!({}),
            )
            .await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn revoke_device(&self, req: &RevokeDeviceRequest) -> ClientResult<DeviceRecord> {
        let resp = self.auth_post("/api/devices/revoke", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn reauthorize_device(
        &self,
        req: &ReauthorizeDeviceRequest,
    ) -> ClientResult<DeviceRecord> {
        let resp = self.auth_post("/api/devices/reauthorize", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn delete_device(&self, device_id: Uuid) -> ClientResult<()> {
        let resp = self.auth_delete(&format!("/api/devices/{device_id}")).await?;
        Self::ok_or_api_error(resp).await
    }

    // ── Envelopes ──

    pub async fn store_envelope(&self, req: &CreateEnvelopeRequest) -> ClientResult<EnvelopeRecord> {
        let resp = self.auth_post("/api/envelopes", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn get_envelope(&self, device_id: Uuid) -> ClientResult<EnvelopeRecord> {
        let resp = self.auth_get(&format!("/api/envelopes/{device_id}")).await?;
        Self::json_or_api_error(resp).await
    }

    // ── Files ──

    pub async fn upload_init(&self, req: &UploadInitRequest) -> ClientResult<UploadInitResponse> {
        let resp = self.auth_post("/api/files/upload-init", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn upload_complete(&self, req: &UploadCompleteRequest) -> ClientResult<FileRecord> {
        let resp = self.auth_post("/api/files/upload-complete", req).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn list_files(&self) -> ClientResult<Vec<FileRecord>> {
        let resp = self.auth_get("/api/files").await?;

        #[derive(Deserialize)]
        struct Resp {
            files: Vec<FileRecord>,
        }
        let data: Resp = Self::json_or_api_error(resp).await?;
        Ok(data.files)
    }

    pub async fn download_info(&self, file_id: &str) -> ClientResult<DownloadResponse> {
        let resp = self.auth_get(&format!("/api/files/{file_id}/download")).await?;
        Self::json_or_api_error(resp).await
    }

    pub async fn delete_file(&self, file_id: &str) -> ClientResult<()> {
        let resp = self.auth_delete(&format!("/api/files/{file_id}")).await?;
        Self::ok_or_api_error(resp).await
    }

    /// PUTs ciphertext against a presigned upload URL.
    pub async fn put_object(&self, presigned_url: &str, bytes: Vec<u8>) -> ClientResult<()> {
        self.client
            .put(presigned_url)
            .body(bytes)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Api(format!("object upload failed: {e}")))?;
        Ok(())
    }

    /// GETs ciphertext from a presigned download URL.
    pub async fn get_object(&self, presigned_url: &str) -> ClientResult<Vec<u8>> {
        let resp = self
            .client
            .get(presigned_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Api(format!("object download failed: {e}")))?;
        Ok(resp.bytes().await?.to_vec())
    }

    // ── Request plumbing ──

    async fn auth_get(&self, path: &str) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let resp = self.request(reqwest::Method::GET, &url, &token).send().await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on GET {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            return Ok(self
                .request(reqwest::Method::GET, &url, &new_token)
                .send()
                .await?);
        }
        Ok(resp)
    }

    async fn auth_post(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let resp = self
            .request(reqwest::Method::POST, &url, &token)
            .json(body)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on POST {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            return Ok(self
                .request(reqwest::Method::POST, &url, &new_token)
                .json(body)
                .send()
                .await?);
        }
        Ok(resp)
    }

    async fn auth_delete(&self, path: &str) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let resp = self
            .request(reqwest::Method::DELETE, &url, &token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on DELETE {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            return Ok(self
                .request(reqwest::Method::DELETE, &url, &new_token)
                .send()
                .await?);
        }
        Ok(resp)
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header(DEVICE_NAME_HEADER, &self.config.device_name)
    }

    async fn get_token(&self) -> ClientResult<String> {
        self.auth
            .read()
            .await
            .access_token
            .clone()
            .ok_or(ClientError::AuthRequired)
    }

    async fn json_or_api_error<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> ClientResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api(format!("{status}: {body}")));
        }
        Ok(resp.json().await?)
    }

    async fn ok_or_api_error(resp: reqwest::Response) -> ClientResult<()> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api(format!("{status}: {body}")));
        }
        Ok(())
    }
}
