//! Device revocation and re-authorization.
//!
//! Revocation order matters and is fixed:
//!
//! 1. Re-verify the owner's password (a stolen bearer token is not enough)
//! 2. Resolve the acting device; it must exist and be active
//! 3. Resolve the target by name
//! 4. Refuse self-revocation, before any mutation
//! 5. Atomically flip the status (exactly one winner under races)
//! 6. Delete the target's MDK envelope
//! 7. Best-effort realtime broadcast
//!
//! Password verification comes first so an unauthenticated caller learns
//! nothing about the device inventory. Everything after step 5 is cleanup
//! of an already-revoked device; a
//! notification failure never rolls the revocation back.

use crate::devices::DeviceRegistry;
use crate::error::{ServerError, ServerResult};
use crate::notifier::RealtimeNotifier;
use crate::users::UserStore;
use sealbox_types::{DeviceRecord, ReauthorizeDeviceRequest, RegisterDeviceRequest, RevokeDeviceRequest};
use std::sync::Arc;
use uuid::Uuid;

pub struct RevocationEngine {
    users: Arc<UserStore>,
    devices: Arc<DeviceRegistry>,
    envelopes: Arc<crate::envelopes::EnvelopeStore>,
    notifier: Arc<RealtimeNotifier>,
}

impl RevocationEngine {
    pub fn new(
        users: Arc<UserStore>,
        devices: Arc<DeviceRegistry>,
        envelopes: Arc<crate::envelopes::EnvelopeStore>,
        notifier: Arc<RealtimeNotifier>,
    ) -> Self {
        Self {
            users,
            devices,
            envelopes,
            notifier,
        }
    }

    /// Revokes a device by name.
    ///
    /// `acting_device_name` is the device the caller is operating from. It
    /// must be present and active, and it cannot be the target: revoking
    /// the acting device would strand the session that issued the command.
    /// Use another device, or deactivate instead.
    pub async fn revoke(
        &self,
        user_id: Uuid,
        acting_device_name: Option<&str>,
        req: &RevokeDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.users.verify_password_for(user_id, &req.password)?;

        // Missing acting-device header fails closed.
        let acting_name = acting_device_name.ok_or_else(|| {
            ServerError::Forbidden("revocation requires the acting device name".to_string())
        })?;
        let acting = self
            .devices
            .find_by_name(user_id, acting_name)?
            .ok_or_else(|| ServerError::NotFound(format!("no device named '{acting_name}'")))?;
        if acting.status != sealbox_types::DeviceStatus::Active {
            return Err(ServerError::Forbidden(format!(
                "acting device '{acting_name}' is not active"
            )));
        }

        let target = self
            .devices
            .find_by_name(user_id, &req.device_name)?
            .ok_or_else(|| {
                ServerError::NotFound(format!("no device named '{}'", req.device_name))
            })?;

        if target.device_name == acting.device_name {
            return Err(ServerError::InvalidState(
                "cannot revoke your current device; use another device".to_string(),
            ));
        }

        if !self.devices.mark_revoked(user_id, target.id)? {
            return Err(ServerError::InvalidState(format!(
                "device '{}' is already revoked",
                req.device_name
            )));
        }

        // The envelope is the device's only path to the MDK.
        self.envelopes.delete_for_device(user_id, target.id)?;

        tracing::info!(
            device_id = %target.id,
            device_name = %target.device_name,
            reason = ?req.reason,
            "device revoked"
        );

        let delivered = self
            .notifier
            .notify_device_revoked(user_id, target.id, &target.device_name)
            .await;
        tracing::debug!(delivered, "revocation broadcast");

        self.devices.find_by_id(target.id, user_id)
    }

    /// Re-authorizes a revoked device: password re-verified, fresh key
    /// enrolled, status back to active. The old envelope is already gone;
    /// the device receives a new one addressed to the fresh key.
    pub fn reauthorize(
        &self,
        user_id: Uuid,
        req: &ReauthorizeDeviceRequest,
    ) -> ServerResult<DeviceRecord> {
        self.users.verify_password_for(user_id, &req.password)?;

        let target = self
            .devices
            .find_by_name(user_id, &req.device_name)?
            .ok_or_else(|| {
                ServerError::NotFound(format!("no device named '{}'", req.device_name))
            })?;
        if target.status != sealbox_types::DeviceStatus::Revoked {
            return Err(ServerError::InvalidState(format!(
                "device '{}' is {}; only revoked devices need re-authorization",
                req.device_name, target.status
            )));
        }

        let enrollment = RegisterDeviceRequest {
            device_name: req.device_name.clone(),
            public_key: req.public_key.clone(),
            key_format: req.key_format.clone(),
            fingerprint: req.fingerprint.clone(),
        };
        let device = self
            .devices
            .reactivate_with_key(user_id, target.id, &enrollment)?;
        tracing::info!(device_id = %device.id, "device re-authorized");
        Ok(device)
    }
}
