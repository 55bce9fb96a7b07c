//! Shared types for the Sealbox vault protocol.
//!
//! These are the wire and domain types exchanged between the client-side
//! custody protocol and the server-side custodian: device lifecycle states,
//! persisted record shapes, encryption metadata blocks, auth tokens, and
//! realtime channel events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registered device.
///
/// Transitions: `active -> revoked` (revocation engine only),
/// `active <-> inactive` (deactivation), `revoked -> deleted`.
/// A revoked device re-enters `active` only through explicit
/// re-authorization, never through bare re-registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Revoked,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DeviceStatus::Active),
            "inactive" => Some(DeviceStatus::Inactive),
            "revoked" => Some(DeviceStatus::Revoked),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata describing one encryption operation.
///
/// Every stored ciphertext (envelope, wrapped FEK, file content) carries one
/// of these blocks so the client can select the right primitive on decrypt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    /// Algorithm identifier, e.g. `x25519-xsalsa20-poly1305` or `aes-256-gcm`.
    pub algorithm: String,
    /// Hash function for schemes that take one (fingerprints, OAEP variants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Base64 IV/nonce for symmetric operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Authentication tag length in bits, where the AEAD appends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_bits: Option<u32>,
}

/// A registered user (wire shape; the password hash never leaves the server).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered device with its enrolled public key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Human-assigned stable name, unique per user.
    pub device_name: String,
    /// Base64 public key enrolled at registration.
    pub public_key: String,
    /// Key encoding, e.g. `x25519-raw`.
    pub key_format: String,
    /// SHA-256 hex digest of the public key encoding (display/audit only).
    pub key_fingerprint: String,
    pub status: DeviceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The MDK wrapped for exactly one device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    /// Base64 envelope ciphertext.
    pub ciphertext: String,
    pub metadata: EncryptionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for one encrypted file object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Client-assigned stable file identifier.
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
    pub storage_path: String,
    /// Base64 FEK ciphertext (wrapped by the MDK).
    pub wrapped_fek: String,
    /// Metadata for the FEK-wrapping operation.
    pub fek_metadata: EncryptionMetadata,
    /// Metadata for the file-content encryption.
    pub file_metadata: EncryptionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tokens returned by login and refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: u64,
    pub user: UserRecord,
}

// ── Request/response bodies ──

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_name: String,
    pub public_key: String,
    pub key_format: String,
    pub fingerprint: String,
}

/// Explicit owner-approval path that brings a revoked device back to
/// `active` with a fresh key pair. Bare re-registration never does this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReauthorizeDeviceRequest {
    pub device_name: String,
    pub password: String,
    pub public_key: String,
    pub key_format: String,
    pub fingerprint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevokeDeviceRequest {
    pub device_name: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateEnvelopeRequest {
    pub device_id: Uuid,
    pub ciphertext: String,
    pub metadata: EncryptionMetadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadInitRequest {
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
}

/// Write capability for one upload: the client PUTs ciphertext to
/// `upload_url` before the expiry, then calls complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadInitResponse {
    pub storage_path: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadCompleteRequest {
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
    pub storage_path: String,
    pub wrapped_fek: String,
    pub fek_metadata: EncryptionMetadata,
    pub file_metadata: EncryptionMetadata,
}

/// Read capability for one download.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
    pub record: FileRecord,
}

// ── Realtime channel ──

/// Authentication payload for the realtime channel handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelHandshake {
    pub token: String,
    pub device_id: Uuid,
    pub device_name: String,
}

/// Server-to-client events on the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChannelEvent {
    /// A device of this user was revoked. A client whose own device name
    /// matches must wipe cached secrets and force re-authentication.
    DeviceRevoked {
        device_id: Uuid,
        device_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Heartbeat reply.
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn device_status_roundtrips_through_strings() {
        for status in [
            DeviceStatus::Active,
            DeviceStatus::Inactive,
            DeviceStatus::Revoked,
        ] {
            assert_eq!(DeviceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeviceStatus::parse("deleted"), None);
    }

    #[test]
    fn device_status_serializes_lowercase() {
        let json = serde_json::to_string(&DeviceStatus::Revoked).unwrap();
        assert_eq!(json, "\"revoked\"");
    }

    #[test]
    fn channel_event_uses_kebab_case_tag() {
        let event = ChannelEvent::DeviceRevoked {
            device_id: Uuid::nil(),
            device_name: "laptop".into(),
            message: "device revoked".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "device-revoked");
        assert_eq!(value["deviceName"], serde_json::Value::Null); // snake_case fields
        assert_eq!(value["device_name"], "laptop");

        let pong = serde_json::to_value(ChannelEvent::Pong).unwrap();
        assert_eq!(pong["type"], "pong");
    }

    #[test]
    fn encryption_metadata_omits_absent_fields() {
        let meta = EncryptionMetadata {
            algorithm: "aes-256-gcm".into(),
            hash: None,
            iv: Some("AAAA".into()),
            tag_bits: Some(128),
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("hash").is_none());
        assert_eq!(value["tag_bits"], 128);
    }
}
