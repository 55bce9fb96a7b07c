//! Device registry and trust lifecycle.
//!
//! A device is (server id, per-user-unique name, enrolled public key,
//! status). Legal transitions: `active <-> inactive`, `active|inactive ->
//! revoked` (revocation engine only), `revoked -> deleted`. A revoked
//! device never comes back through bare registration; only the explicit
//! re-authorization path (password re-verified, fresh key) reactivates it.

use crate::db::{parse_millis, parse_uuid, Db};
use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use sealbox_types::{DeviceRecord, DeviceStatus, RegisterDeviceRequest};
use uuid::Uuid;

pub struct DeviceRegistry {
    db: Db,
}

impl DeviceRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Registers a device for a user, keyed by device name.
    ///
    /// - New name: inserted as `active`.
    /// - Existing `active` device, same public key: idempotent no-op.
    /// - Existing `active`/`inactive` device, new public key: the key is
    ///   re-enrolled and the stale envelope dropped (it is addressed to the
    ///   old key and can never be opened again).
    /// - Existing `inactive` device: reactivated.
    /// - Existing `revoked` device: rejected. Revocation is sticky.
    pub fn register(
        &self,
        user_id: Uuid,
        req: &RegisterDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        let existing = self.find_by_name(user_id, &req.device_name)?;
        match existing {
            None => self.insert(user_id, req),
            Some(device) if device.status == DeviceStatus::Revoked => {
                Err(ServerError::InvalidState(format!(
                    "device '{}' has been revoked; re-authorization is required",
                    req.device_name
                )))
            }
            Some(device)
                if device.status == DeviceStatus::Active && device.public_key == req.public_key =>
            {
                tracing::debug!(device_id = %device.id, "device re-registration is idempotent");
                Ok(device)
            }
            Some(device) if device.public_key == req.public_key => {
                // Inactive, key unchanged: reactivate and keep the envelope.
                self.set_status(user_id, device.id, DeviceStatus::Active)?;
                self.find_by_id(device.id, user_id)
            }
            Some(device) => {
                // Fresh key: re-enroll, dropping the stale envelope.
                self.enroll_key(user_id, device.id, req, DeviceStatus::Active)?;
                self.find_by_id(device.id, user_id)
            }
        }
    }

    fn insert(&self, user_id: Uuid, req: &RegisterDeviceRequest) -> ServerResult<DeviceRecord> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO devices
                 (id, user_id, device_name, public_key, key_format, key_fingerprint,
                  status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                id.to_string(),
                user_id.to_string(),
                req.device_name,
                req.public_key,
                req.key_format,
                req.fingerprint,
                DeviceStatus::Active.as_str(),
                now.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;
        tracing::info!(device_id = %id, device_name = %req.device_name, "device registered");
        Ok(DeviceRecord {
            id,
            user_id,
            device_name: req.device_name.clone(),
            public_key: req.public_key.clone(),
            key_format: req.key_format.clone(),
            key_fingerprint: req.fingerprint.clone(),
            status: DeviceStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces a device's enrolled key and status, dropping any envelope
    /// addressed to the previous key.
    fn enroll_key(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        req: &RegisterDeviceRequest,
        status: DeviceStatus,
    ) -> ServerResult<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "UPDATE devices
             SET public_key = ?, key_format = ?, key_fingerprint = ?, status = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
            duckdb::params![
                req.public_key,
                req.key_format,
                req.fingerprint,
                status.as_str(),
                now,
                device_id.to_string(),
                user_id.to_string(),
            ],
        )?;
        conn.execute(
            "DELETE FROM envelopes WHERE user_id = ? AND device_id = ?",
            duckdb::params![user_id.to_string(), device_id.to_string()],
        )?;
        Ok(())
    }

    /// Looks up a device by id, distinguishing "does not exist" from
    /// "belongs to someone else".
    pub fn find_by_id(&self, device_id: Uuid, user_id: Uuid) -> ServerResult<DeviceRecord> {
        let device = self
            .load_by_id(device_id)?
            .ok_or_else(|| ServerError::NotFound("device not found".to_string()))?;
        if device.user_id != user_id {
            return Err(ServerError::Forbidden(
                "device belongs to a different account".to_string(),
            ));
        }
        Ok(device)
    }

    pub fn find_by_name(&self, user_id: Uuid, name: &str) -> ServerResult<Option<DeviceRecord>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, user_id, device_name, public_key, key_format, key_fingerprint,
                    status, created_at, updated_at
             FROM devices WHERE user_id = ? AND device_name = ?",
            duckdb::params![user_id.to_string(), name],
            Self::map_row,
        );
        crate::db::optional(row)?.map(Self::finish_row).transpose()
    }

    /// Lists a user's devices, optionally narrowed to one status.
    pub fn list(
        &self,
        user_id: Uuid,
        status_filter: Option<DeviceStatus>,
    ) -> ServerResult<Vec<DeviceRecord>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let mut devices = Vec::new();
        if let Some(status) = status_filter {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, device_name, public_key, key_format, key_fingerprint,
                        status, created_at, updated_at
                 FROM devices WHERE user_id = ? AND status = ? ORDER BY created_at",
            )?;
            let rows = stmt.query_map(
                duckdb::params![user_id.to_string(), status.as_str()],
                Self::map_row,
            )?;
            for row in rows {
                devices.push(Self::finish_row(row?)?);
            }
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, device_name, public_key, key_format, key_fingerprint,
                        status, created_at, updated_at
                 FROM devices WHERE user_id = ? ORDER BY created_at",
            )?;
            let rows = stmt.query_map([user_id.to_string()], Self::map_row)?;
            for row in rows {
                devices.push(Self::finish_row(row?)?);
            }
        }
        Ok(devices)
    }

    /// Marks a device inactive. Revoked devices stay revoked.
    pub fn deactivate(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<DeviceRecord> {
        let device = self.find_by_id(device_id, user_id)?;
        if device.status == DeviceStatus::Revoked {
            return Err(ServerError::InvalidState(
                "a revoked device cannot be deactivated".to_string(),
            ));
        }
        self.set_status(user_id, device_id, DeviceStatus::Inactive)?;
        self.find_by_id(device_id, user_id)
    }

    /// Atomically moves a device to `revoked`.
    ///
    /// The status check and the write are one conditional UPDATE, so two
    /// concurrent revocations cannot both observe `active`: exactly one
    /// caller sees `true`, the other `false`.
    pub fn mark_revoked(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<bool> {
        let now = Utc::now().timestamp_millis();
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn.execute(
            "UPDATE devices SET status = 'revoked', updated_at = ?
             WHERE id = ? AND user_id = ? AND status <> 'revoked'",
            duckdb::params![now, device_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Brings a revoked device back to `active` with a freshly enrolled
    /// key. Only the re-authorization path calls this, after the owner's
    /// password has been re-verified.
    pub fn reactivate_with_key(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        req: &RegisterDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.enroll_key(user_id, device_id, req, DeviceStatus::Active)?;
        self.find_by_id(device_id, user_id)
    }

    /// Permanently removes a revoked device and its envelope row.
    ///
    /// Active and inactive devices must be revoked first, so deletion is
    /// always the end of an audited lifecycle.
    pub fn delete(&self, user_id: Uuid, device_id: Uuid) -> ServerResult<()> {
        let device = self.find_by_id(device_id, user_id)?;
        if device.status != DeviceStatus::Revoked {
            return Err(ServerError::InvalidState(
                "only revoked devices can be deleted".to_string(),
            ));
        }
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "DELETE FROM envelopes WHERE user_id = ? AND device_id = ?",
            duckdb::params![user_id.to_string(), device_id.to_string()],
        )?;
        conn.execute(
            "DELETE FROM devices WHERE id = ? AND user_id = ?",
            duckdb::params![device_id.to_string(), user_id.to_string()],
        )?;
        tracing::info!(device_id = %device_id, "revoked device deleted");
        Ok(())
    }

    fn set_status(&self, user_id: Uuid, device_id: Uuid, status: DeviceStatus) -> ServerResult<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "UPDATE devices SET status = ?, updated_at = ? WHERE id = ? AND user_id = ?",
            duckdb::params![
                status.as_str(),
                now,
                device_id.to_string(),
                user_id.to_string()
            ],
        )?;
        Ok(())
    }

    fn load_by_id(&self, device_id: Uuid) -> ServerResult<Option<DeviceRecord>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, user_id, device_name, public_key, key_format, key_fingerprint,
                    status, created_at, updated_at
             FROM devices WHERE id = ?",
            [device_id.to_string()],
            Self::map_row,
        );
        crate::db::optional(row)?.map(Self::finish_row).transpose()
    }

    #[allow(clippy::type_complexity)]
    fn map_row(
        row: &duckdb::Row<'_>,
    ) -> Result<(String, String, String, String, String, String, String, i64, i64), duckdb::Error>
    {
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
        ))
    }

    #[allow(clippy::type_complexity)]
    fn finish_row(
        (id, user_id, device_name, public_key, key_format, key_fingerprint, status, created, updated): (
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            i64,
            i64,
        ),
    ) -> ServerResult<DeviceRecord> {
        let status = DeviceStatus::parse(&status)
            .ok_or_else(|| ServerError::Storage(format!("corrupt device status: {status}")))?;
        Ok(DeviceRecord {
            id: parse_uuid(&id)?,
            user_id: parse_uuid(&user_id)?,
            device_name,
            public_key,
            key_format,
            key_fingerprint,
            status,
            created_at: parse_millis(created),
            updated_at: parse_millis(updated),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn registry() -> (DeviceRegistry, Uuid) {
        (DeviceRegistry::new(open_in_memory().unwrap()), Uuid::now_v7())
    }

    fn request(name: &str, key: &str) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            device_name: name.to_string(),
            public_key: key.to_string(),
            key_format: "x25519-raw".to_string(),
            fingerprint: format!("fp-{key}"),
        }
    }

    #[test]
    fn register_is_idempotent_for_same_key() {
        let (registry, user) = registry();
        let first = registry.register(user, &request("laptop", "key-a")).unwrap();
        let second = registry.register(user, &request("laptop", "key-a")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.list(user, None).unwrap().len(), 1);
    }

    #[test]
    fn list_filters_by_status() {
        let (registry, user) = registry();
        registry.register(user, &request("laptop", "key-a")).unwrap();
        let phone = registry.register(user, &request("phone", "key-b")).unwrap();
        registry.mark_revoked(user, phone.id).unwrap();

        let revoked = registry.list(user, Some(DeviceStatus::Revoked)).unwrap();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].device_name, "phone");

        let active = registry.list(user, Some(DeviceStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device_name, "laptop");

        assert!(registry.list(user, Some(DeviceStatus::Inactive)).unwrap().is_empty());
        assert_eq!(registry.list(user, None).unwrap().len(), 2);
    }

    #[test]
    fn register_with_new_key_reenrolls() {
        let (registry, user) = registry();
        let first = registry.register(user, &request("laptop", "key-a")).unwrap();
        let second = registry.register(user, &request("laptop", "key-b")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.public_key, "key-b");
        assert_eq!(second.status, DeviceStatus::Active);
    }

    #[test]
    fn revoked_device_cannot_reregister() {
        let (registry, user) = registry();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();
        assert!(registry.mark_revoked(user, device.id).unwrap());

        let err = registry
            .register(user, &request("laptop", "key-b"))
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidState(_)));

        // Still revoked with the original key.
        let current = registry.find_by_id(device.id, user).unwrap();
        assert_eq!(current.status, DeviceStatus::Revoked);
        assert_eq!(current.public_key, "key-a");
    }

    #[test]
    fn revocation_is_atomic_and_one_shot() {
        let (registry, user) = registry();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();
        assert!(registry.mark_revoked(user, device.id).unwrap());
        assert!(!registry.mark_revoked(user, device.id).unwrap());
    }

    #[test]
    fn inactive_device_reactivates_through_register() {
        let (registry, user) = registry();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();
        registry.deactivate(user, device.id).unwrap();
        assert_eq!(
            registry.find_by_id(device.id, user).unwrap().status,
            DeviceStatus::Inactive
        );

        let back = registry.register(user, &request("laptop", "key-a")).unwrap();
        assert_eq!(back.status, DeviceStatus::Active);
    }

    #[test]
    fn other_users_devices_are_forbidden_not_hidden() {
        let (registry, user) = registry();
        let other = Uuid::now_v7();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();

        let err = registry.find_by_id(device.id, other).unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));

        let err = registry.find_by_id(Uuid::now_v7(), user).unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn delete_requires_revoked_state() {
        let (registry, user) = registry();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();

        let err = registry.delete(user, device.id).unwrap_err();
        assert!(matches!(err, ServerError::InvalidState(_)));

        registry.mark_revoked(user, device.id).unwrap();
        registry.delete(user, device.id).unwrap();
        let err = registry.find_by_id(device.id, user).unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn reauthorization_reactivates_with_fresh_key() {
        let (registry, user) = registry();
        let device = registry.register(user, &request("laptop", "key-a")).unwrap();
        registry.mark_revoked(user, device.id).unwrap();

        let back = registry
            .reactivate_with_key(user, device.id, &request("laptop", "key-fresh"))
            .unwrap();
        assert_eq!(back.status, DeviceStatus::Active);
        assert_eq!(back.public_key, "key-fresh");
    }
}
