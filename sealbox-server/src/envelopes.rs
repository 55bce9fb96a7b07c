//! Per-device MDK envelopes.
//!
//! The server stores envelope ciphertext opaquely: it can never open one.
//! Exactly one envelope exists per (user, device); revocation and key
//! re-enrollment delete it, so a revoked device loses its path to the MDK
//! even if its bearer tokens are still in flight.

use crate::db::{parse_millis, parse_uuid, Db};
use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use sealbox_types::{CreateEnvelopeRequest, DeviceStatus, EncryptionMetadata, EnvelopeRecord};
use uuid::Uuid;

pub struct EnvelopeStore {
    db: Db,
}

impl EnvelopeStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Stores the MDK envelope for one device.
    ///
    /// The device must exist, belong to the caller, and be active; a device
    /// that already holds an envelope conflicts (delete or re-enroll first).
    pub fn create(
        &self,
        user_id: Uuid,
        req: &CreateEnvelopeRequest,
    ) -> ServerResult<EnvelopeRecord> {
        let (owner, status) = self
            .device_state(req.device_id)?
            .ok_or_else(|| ServerError::NotFound("device not found".to_string()))?;
        if owner != user_id {
            return Err(ServerError::Forbidden(
                "device belongs to a different account".to_string(),
            ));
        }
        if status != DeviceStatus::Active {
            return Err(ServerError::Forbidden(format!(
                "device is {status}; envelopes can only target active devices"
            )));
        }
        if self.get_for_device(user_id, req.device_id).is_ok() {
            return Err(ServerError::Conflict(
                "device already holds an envelope".to_string(),
            ));
        }

        let id = Uuid::now_v7();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&req.metadata)?;
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO envelopes (id, user_id, device_id, ciphertext, metadata_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                id.to_string(),
                user_id.to_string(),
                req.device_id.to_string(),
                req.ciphertext,
                metadata_json,
                now.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;
        tracing::info!(device_id = %req.device_id, "envelope stored");
        Ok(EnvelopeRecord {
            id,
            user_id,
            device_id: req.device_id,
            ciphertext: req.ciphertext.clone(),
            metadata: req.metadata.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetches the envelope addressed to one device.
    ///
    /// Ownership and status are resolved first: a device of another
    /// account or an inactive device is `Forbidden`, distinct from the
    /// `NotFound` a device without an envelope gets.
    pub fn get_for_device(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<EnvelopeRecord> {
        let (owner, status) = self
            .device_state(device_id)?
            .ok_or_else(|| ServerError::NotFound("device not found".to_string()))?;
        if owner != user_id {
            return Err(ServerError::Forbidden(
                "device belongs to a different account".to_string(),
            ));
        }
        if status == DeviceStatus::Inactive {
            return Err(ServerError::Forbidden(
                "device is inactive; reactivate it before fetching its envelope".to_string(),
            ));
        }

        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, user_id, device_id, ciphertext, metadata_json, created_at, updated_at
             FROM envelopes WHERE user_id = ? AND device_id = ?",
            duckdb::params![user_id.to_string(), device_id.to_string()],
            Self::map_row,
        );
        crate::db::optional(row)?
            .map(Self::finish_row)
            .transpose()?
            .ok_or_else(|| {
                ServerError::NotFound(
                    "no MDK envelope for this device; set it up here or sync the key from \
                     another authorized device"
                        .to_string(),
                )
            })
    }

    /// Removes the envelope for a device, if any. Returns whether one
    /// existed.
    pub fn delete_for_device(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<bool> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn.execute(
            "DELETE FROM envelopes WHERE user_id = ? AND device_id = ?",
            duckdb::params![user_id.to_string(), device_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    fn device_state(&self, device_id: Uuid) -> ServerResult<Option<(Uuid, DeviceStatus)>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT user_id, status FROM devices WHERE id = ?",
            [device_id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        match crate::db::optional(row)? {
            None => Ok(None),
            Some((owner, status)) => {
                let status = DeviceStatus::parse(&status).ok_or_else(|| {
                    ServerError::Storage(format!("corrupt device status: {status}"))
                })?;
                Ok(Some((parse_uuid(&owner)?, status)))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn map_row(
        row: &duckdb::Row<'_>,
    ) -> Result<(String, String, String, String, String, i64, i64), duckdb::Error> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn finish_row(
        (id, user_id, device_id, ciphertext, metadata_json, created, updated): (
            String,
            String,
            String,
            String,
            String,
            i64,
            i64,
        ),
    ) -> ServerResult<EnvelopeRecord> {
        let metadata: EncryptionMetadata = serde_json::from_str(&metadata_json)?;
        Ok(EnvelopeRecord {
            id: parse_uuid(&id)?,
            user_id: parse_uuid(&user_id)?,
            device_id: parse_uuid(&device_id)?,
            ciphertext,
            metadata,
            created_at: parse_millis(created),
            updated_at: parse_millis(updated),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::devices::DeviceRegistry;
    use sealbox_types::RegisterDeviceRequest;

    fn setup() -> (DeviceRegistry, EnvelopeStore, Uuid) {
        let db = open_in_memory().unwrap();
        (
            DeviceRegistry::new(db.clone()),
            EnvelopeStore::new(db),
            Uuid::now_v7(),
        )
    }

    fn device_request(name: &str) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            device_name: name.to_string(),
            public_key: format!("pk-{name}"),
            key_format: "x25519-raw".to_string(),
            fingerprint: format!("fp-{name}"),
        }
    }

    fn envelope_request(device_id: Uuid) -> CreateEnvelopeRequest {
        CreateEnvelopeRequest {
            device_id,
            ciphertext: "c2VhbGVk".to_string(),
            metadata: EncryptionMetadata {
                algorithm: "x25519-xsalsa20-poly1305".to_string(),
                hash: Some("sha-256".to_string()),
                iv: None,
                tag_bits: Some(128),
            },
        }
    }

    #[test]
    fn store_and_fetch_roundtrips() {
        let (registry, envelopes, user) = setup();
        let device = registry.register(user, &device_request("laptop")).unwrap();

        envelopes.create(user, &envelope_request(device.id)).unwrap();
        let fetched = envelopes.get_for_device(user, device.id).unwrap();
        assert_eq!(fetched.ciphertext, "c2VhbGVk");
        assert_eq!(fetched.metadata.algorithm, "x25519-xsalsa20-poly1305");
    }

    #[test]
    fn one_envelope_per_device() {
        let (registry, envelopes, user) = setup();
        let device = registry.register(user, &device_request("laptop")).unwrap();

        envelopes.create(user, &envelope_request(device.id)).unwrap();
        let err = envelopes
            .create(user, &envelope_request(device.id))
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[test]
    fn missing_envelope_explains_recovery() {
        let (registry, envelopes, user) = setup();
        let device = registry.register(user, &device_request("laptop")).unwrap();

        let err = envelopes.get_for_device(user, device.id).unwrap_err();
        match err {
            ServerError::NotFound(msg) => assert!(msg.contains("another authorized device")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn envelope_rejects_foreign_and_inactive_devices() {
        let (registry, envelopes, user) = setup();
        let stranger = Uuid::now_v7();
        let device = registry.register(user, &device_request("laptop")).unwrap();
        envelopes.create(user, &envelope_request(device.id)).unwrap();

        let err = envelopes
            .create(stranger, &envelope_request(device.id))
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));
        // Fetching someone else's envelope is Forbidden, not NotFound.
        let err = envelopes.get_for_device(stranger, device.id).unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));

        registry.deactivate(user, device.id).unwrap();
        let err = envelopes
            .create(user, &envelope_request(device.id))
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));
        let err = envelopes.get_for_device(user, device.id).unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));

        let err = envelopes.get_for_device(user, Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn key_reenrollment_drops_stale_envelope() {
        let (registry, envelopes, user) = setup();
        let device = registry.register(user, &device_request("laptop")).unwrap();
        envelopes.create(user, &envelope_request(device.id)).unwrap();

        let mut fresh = device_request("laptop");
        fresh.public_key = "pk-fresh".to_string();
        registry.register(user, &fresh).unwrap();

        assert!(envelopes.get_for_device(user, device.id).is_err());
    }
}
