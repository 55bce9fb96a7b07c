//! Client-side file envelope pipeline.
//!
//! Upload: fresh FEK, AES-GCM the content, wrap the FEK under the session
//! MDK, PUT the ciphertext against the presigned URL, then complete with
//! the wrapped FEK and both metadata blocks. Download is the mirror image.
//! Plaintext and plaintext keys never leave this process.

use crate::api_client::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::session::VaultSession;
use sealbox_crypto::{
    decrypt, encrypt, gcm_metadata, unwrap_file_key, wrap_file_key, EncryptedData, FileKey,
};
use sealbox_types::{FileRecord, UploadCompleteRequest, UploadInitRequest};
use std::sync::Arc;

pub struct FileVault {
    api: Arc<ApiClient>,
    session: Arc<VaultSession>,
}

impl FileVault {
    pub fn new(api: Arc<ApiClient>, session: Arc<VaultSession>) -> Self {
        Self { api, session }
    }

    /// Encrypts and uploads one file.
    pub async fn upload(
        &self,
        file_id: &str,
        file_name: &str,
        plaintext: &[u8],
    ) -> ClientResult<FileRecord> {
        let mdk = self
            .session
            .master_key()
            .await
            .ok_or(ClientError::AuthRequired)?;

        let fek = FileKey::generate();
        let encrypted = encrypt(fek.as_bytes(), plaintext)?;
        let wrapped = wrap_file_key(&fek, &mdk)?;

        let init = self
            .api
            .upload_init(&UploadInitRequest {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                size: encrypted.ciphertext.len() as u64,
            })
            .await?;

        self.api
            .put_object(&init.upload_url, encrypted.ciphertext.clone())
            .await?;

        let record = self
            .api
            .upload_complete(&UploadCompleteRequest {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                size: encrypted.ciphertext.len() as u64,
                storage_path: init.storage_path,
                wrapped_fek: wrapped.to_base64(),
                fek_metadata: gcm_metadata(&wrapped.nonce),
                file_metadata: gcm_metadata(&encrypted.nonce),
            })
            .await?;
        tracing::info!(file_id, size = plaintext.len(), "file uploaded");
        Ok(record)
    }

    /// Downloads and decrypts one file.
    pub async fn download(&self, file_id: &str) -> ClientResult<Vec<u8>> {
        let mdk = self
            .session
            .master_key()
            .await
            .ok_or(ClientError::AuthRequired)?;

        let info = self.api.download_info(file_id).await?;
        let ciphertext = self.api.get_object(&info.download_url).await?;

        let wrapped = EncryptedData::from_base64(&info.record.wrapped_fek)?;
        let fek = unwrap_file_key(&wrapped, &mdk)?;

        let nonce = decode_iv(&info.record.file_metadata.iv)?;
        let data = EncryptedData { nonce, ciphertext };
        Ok(decrypt(fek.as_bytes(), &data)?)
    }

    pub async fn list(&self) -> ClientResult<Vec<FileRecord>> {
        self.api.list_files().await
    }

    pub async fn delete(&self, file_id: &str) -> ClientResult<()> {
        self.api.delete_file(file_id).await
    }
}

/// Recovers the content nonce from the recorded metadata block.
fn decode_iv(iv: &Option<String>) -> ClientResult<[u8; sealbox_crypto::NONCE_SIZE]> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    let encoded = iv
        .as_deref()
        .ok_or_else(|| ClientError::Api("file metadata is missing the IV".to_string()))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| ClientError::Api(format!("invalid IV encoding: {e}")))?;
    if bytes.len() != sealbox_crypto::NONCE_SIZE {
        return Err(ClientError::Api(format!(
            "invalid IV length: expected {}, got {}",
            sealbox_crypto::NONCE_SIZE,
            bytes.len()
        )));
    }
    let mut nonce = [0u8; sealbox_crypto::NONCE_SIZE];
    nonce.copy_from_slice(&bytes);
    Ok(nonce)
}
