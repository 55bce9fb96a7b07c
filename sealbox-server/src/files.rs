//! Encrypted file metadata and transfer capabilities.
//!
//! Uploads are two-phase. `upload_init` hands out a presigned PUT for a
//! server-chosen storage path; `upload_complete` records metadata (wrapped
//! FEK included) only after verifying the ciphertext actually landed, so a
//! row never points at a missing object. The custodian stores the wrapped
//! FEK opaquely; only a device holding the MDK can unwrap it.

use crate::db::{parse_millis, parse_uuid, Db};
use crate::error::{ServerError, ServerResult};
use crate::object_store::ObjectStore;
use crate::rate_limit::RateLimiter;
use chrono::{Duration as ChronoDuration, Utc};
use sealbox_types::{
    DownloadResponse, EncryptionMetadata, FileRecord, UploadCompleteRequest, UploadInitRequest,
    UploadInitResponse,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct FileService {
    db: Db,
    store: Arc<dyn ObjectStore>,
    presign_expiry: Duration,
    upload_limiter: RateLimiter,
}

impl FileService {
    pub fn new(
        db: Db,
        store: Arc<dyn ObjectStore>,
        presign_expiry_secs: u64,
        upload_rate_limit: u32,
        upload_rate_window_secs: u64,
    ) -> Self {
        Self {
            db,
            store,
            presign_expiry: Duration::from_secs(presign_expiry_secs),
            upload_limiter: RateLimiter::new(
                upload_rate_limit,
                Duration::from_secs(upload_rate_window_secs),
            ),
        }
    }

    fn storage_path(user_id: Uuid, file_id: &str) -> String {
        format!("users/{user_id}/files/{file_id}")
    }

    fn user_prefix(user_id: Uuid) -> String {
        format!("users/{user_id}/")
    }

    fn expires_at(&self) -> chrono::DateTime<Utc> {
        Utc::now() + ChronoDuration::seconds(self.presign_expiry.as_secs() as i64)
    }

    /// Starts an upload: picks the storage path and signs a write
    /// capability for it. No metadata is recorded yet.
    pub async fn upload_init(
        &self,
        user_id: Uuid,
        req: &UploadInitRequest,
    ) -> ServerResult<UploadInitResponse> {
        if !self.upload_limiter.check(&user_id.to_string()) {
            return Err(ServerError::RateLimited(
                "too many uploads; try again later".to_string(),
            ));
        }

        let storage_path = Self::storage_path(user_id, &req.file_id);
        let upload_url = self
            .store
            .presign_put(&storage_path, self.presign_expiry)
            .await?;
        tracing::debug!(file_id = %req.file_id, "upload initialized");
        Ok(UploadInitResponse {
            storage_path,
            upload_url,
            expires_at: self.expires_at(),
        })
    }

    /// Finishes an upload: verifies the ciphertext exists at the claimed
    /// path, then records (or overwrites) the file row. The path must sit
    /// under the caller's own prefix.
    pub async fn upload_complete(
        &self,
        user_id: Uuid,
        req: &UploadCompleteRequest,
    ) -> ServerResult<FileRecord> {
        if !req.storage_path.starts_with(&Self::user_prefix(user_id)) {
            return Err(ServerError::Forbidden(
                "storage path does not belong to this account".to_string(),
            ));
        }
        if !self.store.exists(&req.storage_path).await? {
            return Err(ServerError::InvalidState(
                "no object at the storage path; upload the ciphertext before completing"
                    .to_string(),
            ));
        }

        let now = Utc::now();
        let fek_metadata_json = serde_json::to_string(&req.fek_metadata)?;
        let file_metadata_json = serde_json::to_string(&req.file_metadata)?;

        let existing = self.load(user_id, &req.file_id)?;
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let id = match existing {
            // Overwrite: same file_id replaces content and keys in place.
            Some(old) => {
                conn.execute(
                    "UPDATE files
                     SET file_name = ?, size = ?, storage_path = ?, wrapped_fek = ?,
                         fek_metadata_json = ?, file_metadata_json = ?, updated_at = ?
                     WHERE id = ?",
                    duckdb::params![
                        req.file_name,
                        req.size as i64,
                        req.storage_path,
                        req.wrapped_fek,
                        fek_metadata_json,
                        file_metadata_json,
                        now.timestamp_millis(),
                        old.id.to_string(),
                    ],
                )?;
                old.id
            }
            None => {
                let id = Uuid::now_v7();
                conn.execute(
                    "INSERT INTO files
                         (id, user_id, file_id, file_name, size, storage_path, wrapped_fek,
                          fek_metadata_json, file_metadata_json, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    duckdb::params![
                        id.to_string(),
                        user_id.to_string(),
                        req.file_id,
                        req.file_name,
                        req.size as i64,
                        req.storage_path,
                        req.wrapped_fek,
                        fek_metadata_json,
                        file_metadata_json,
                        now.timestamp_millis(),
                        now.timestamp_millis(),
                    ],
                )?;
                id
            }
        };
        drop(conn);

        tracing::info!(file_id = %req.file_id, size = req.size, "upload completed");
        self.load(user_id, &req.file_id)?
            .ok_or_else(|| ServerError::Storage(format!("file row vanished: {id}")))
    }

    /// Signs a read capability for one file's ciphertext.
    pub async fn download(&self, user_id: Uuid, file_id: &str) -> ServerResult<DownloadResponse> {
        let record = self
            .load(user_id, file_id)?
            .ok_or_else(|| ServerError::NotFound(format!("no file '{file_id}'")))?;
        let download_url = self
            .store
            .presign_get(&record.storage_path, self.presign_expiry)
            .await?;
        Ok(DownloadResponse {
            download_url,
            expires_at: self.expires_at(),
            record,
        })
    }

    pub fn list(&self, user_id: Uuid) -> ServerResult<Vec<FileRecord>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, user_id, file_id, file_name, size, storage_path, wrapped_fek,
                    fek_metadata_json, file_metadata_json, created_at, updated_at
             FROM files WHERE user_id = ? ORDER BY created_at",
        )?;
        let rows = stmt.query_map([user_id.to_string()], Self::map_row)?;
        let mut files = Vec::new();
        for row in rows {
            files.push(Self::finish_row(row?)?);
        }
        Ok(files)
    }

    /// Deletes a file: ciphertext first, then the row. A missing object is
    /// tolerated so deletion can be retried.
    pub async fn delete(&self, user_id: Uuid, file_id: &str) -> ServerResult<()> {
        let record = self
            .load(user_id, file_id)?
            .ok_or_else(|| ServerError::NotFound(format!("no file '{file_id}'")))?;

        self.store.delete(&record.storage_path).await?;
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM files WHERE id = ?", [record.id.to_string()])?;
        tracing::info!(file_id = %file_id, "file deleted");
        Ok(())
    }

    fn load(&self, user_id: Uuid, file_id: &str) -> ServerResult<Option<FileRecord>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, user_id, file_id, file_name, size, storage_path, wrapped_fek,
                    fek_metadata_json, file_metadata_json, created_at, updated_at
             FROM files WHERE user_id = ? AND file_id = ?",
            duckdb::params![user_id.to_string(), file_id],
            Self::map_row,
        );
        crate::db::optional(row)?.map(Self::finish_row).transpose()
    }

    #[allow(clippy::type_complexity)]
    fn map_row(
        row: &duckdb::Row<'_>,
    ) -> Result<
        (String, String, String, String, i64, String, String, String, String, i64, i64),
        duckdb::Error,
    > {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn finish_row(
        (id, user_id, file_id, file_name, size, storage_path, wrapped_fek, fek_meta, file_meta, created, updated): (
            String,
            String,
            String,
            String,
            i64,
            String,
            String,
            String,
            String,
            i64,
            i64,
        ),
    ) -> ServerResult<FileRecord> {
        let fek_metadata: EncryptionMetadata = serde_json::from_str(&fek_meta)?;
        let file_metadata: EncryptionMetadata = serde_json::from_str(&file_meta)?;
        Ok(FileRecord {
            id: parse_uuid(&id)?,
            user_id: parse_uuid(&user_id)?,
            file_id,
            file_name,
            size: size as u64,
            storage_path,
            wrapped_fek,
            fek_metadata,
            file_metadata,
            created_at: parse_millis(created),
            updated_at: parse_millis(updated),
        })
    }
}
