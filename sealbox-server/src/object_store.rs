//! Ciphertext object storage.
//!
//! File bytes never pass through the custodian: clients PUT and GET
//! ciphertext directly against presigned URLs. The custodian only needs
//! existence checks (upload-complete verification), deletion, and URL
//! signing, so that is the whole trait.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, path: &str) -> ServerResult<bool>;

    async fn delete(&self, path: &str) -> ServerResult<()>;

    /// Presigned PUT: a time-limited write capability for one key.
    async fn presign_put(&self, path: &str, expires_in: Duration) -> ServerResult<String>;

    /// Presigned GET: a time-limited read capability for one key.
    async fn presign_get(&self, path: &str, expires_in: Duration) -> ServerResult<String>;
}

/// S3-compatible backend (AWS S3 or MinIO via endpoint override).
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn connect(config: &ServerConfig) -> Self {
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.s3_region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = &config.s3_endpoint_override {
            // MinIO needs path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.s3_bucket.clone(),
        }
    }

    fn presigning(expires_in: Duration) -> ServerResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| ServerError::ObjectStore(format!("presigning config: {e}")))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, path: &str) -> ServerResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(ServerError::ObjectStore(format!(
                        "head {path}: {service_err}"
                    )))
                }
            }
        }
    }

    async fn delete(&self, path: &str) -> ServerResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| ServerError::ObjectStore(format!("delete {path}: {e}")))?;
        Ok(())
    }

    async fn presign_put(&self, path: &str, expires_in: Duration) -> ServerResult<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| ServerError::ObjectStore(format!("presign put {path}: {e}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, path: &str, expires_in: Duration) -> ServerResult<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| ServerError::ObjectStore(format!("presign get {path}: {e}")))?;
        Ok(presigned.uri().to_string())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a client PUT against a presigned URL.
    pub async fn put(&self, path: &str, bytes: Vec<u8>) {
        self.objects.write().await.insert(path.to_string(), bytes);
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, path: &str) -> ServerResult<bool> {
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> ServerResult<()> {
        self.objects.write().await.remove(path);
        Ok(())
    }

    async fn presign_put(&self, path: &str, expires_in: Duration) -> ServerResult<String> {
        Ok(format!(
            "memory://put/{path}?expires={}",
            expires_in.as_secs()
        ))
    }

    async fn presign_get(&self, path: &str, expires_in: Duration) -> ServerResult<String> {
        Ok(format!(
            "memory://get/{path}?expires={}",
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_tracks_objects() {
        let store = MemoryObjectStore::new();
        assert!(!store.exists("users/a/files/1").await.unwrap());

        store.put("users/a/files/1", vec![1, 2, 3]).await;
        assert!(store.exists("users/a/files/1").await.unwrap());

        store.delete("users/a/files/1").await.unwrap();
        assert!(!store.exists("users/a/files/1").await.unwrap());
    }

    #[tokio::test]
    async fn presigned_urls_encode_verb_and_path() {
        let store = MemoryObjectStore::new();
        let put = store
            .presign_put("users/a/files/1", Duration::from_secs(60))
            .await
            .unwrap();
        let get = store
            .presign_get("users/a/files/1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(put.starts_with("memory://put/"));
        assert!(get.starts_with("memory://get/"));
    }
}
