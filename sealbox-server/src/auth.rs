//! Session tokens.
//!
//! Tokens are opaque 256-bit random values; only their SHA-256 digests are
//! stored, so a leaked sessions table yields nothing replayable. Refresh
//! rotates both tokens and re-checks the status of the device the session
//! was opened from: a revoked device gets `DEVICE_REVOKED` even if its
//! refresh token is still within its lifetime. The envelope deletion
//! already cut that device off from the MDK; this closes the API surface
//! too.

use crate::config::ServerConfig;
use crate::db::{parse_uuid, Db};
use crate::devices::DeviceRegistry;
use crate::error::{ServerError, ServerResult};
use crate::rate_limit::RateLimiter;
use crate::users::UserStore;
use chrono::Utc;
use rand::RngCore;
use sealbox_types::{AuthTokens, DeviceStatus, UserRecord};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Error message prefix a client watches for to wipe local secrets.
pub const DEVICE_REVOKED: &str = "DEVICE_REVOKED";

pub struct AuthService {
    db: Db,
    users: Arc<UserStore>,
    devices: Arc<DeviceRegistry>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    login_limiter: RateLimiter,
}

impl AuthService {
    pub fn new(
        db: Db,
        users: Arc<UserStore>,
        devices: Arc<DeviceRegistry>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            db,
            users,
            devices,
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
            login_limiter: RateLimiter::new(
                config.login_rate_limit,
                Duration::from_secs(config.login_rate_window_secs),
            ),
        }
    }

    /// Verifies credentials and opens a session.
    ///
    /// `device_name` binds the session to a device so refresh can enforce
    /// revocation; a session opened without one lives only until its
    /// access token expires and can never be refreshed.
    /// Attempts are rate limited per (client, email) pair.
    pub fn login(
        &self,
        email: &str,
        password: &str,
        device_name: Option<&str>,
        client_ip: &str,
    ) -> ServerResult<AuthTokens> {
        let limit_key = format!("login:{client_ip}:{}", email.trim().to_lowercase());
        if !self.login_limiter.check(&limit_key) {
            tracing::warn!(client_ip, "login rate limit tripped");
            return Err(ServerError::RateLimited(
                "too many login attempts; try again later".to_string(),
            ));
        }

        let user = self.users.verify_credentials(email, password)?;
        self.login_limiter.reset(&limit_key);
        self.open_session(user, device_name)
    }

    /// Rotates a session's token pair.
    pub fn refresh(&self, refresh_token: &str) -> ServerResult<AuthTokens> {
        let now = Utc::now().timestamp_millis();
        let session = self
            .find_session_by_refresh(refresh_token)?
            .ok_or_else(|| ServerError::Unauthorized("invalid refresh token".to_string()))?;

        if session.refresh_expires_at <= now {
            self.delete_session(session.id)?;
            return Err(ServerError::Unauthorized(
                "refresh token expired".to_string(),
            ));
        }

        // No device binding means the revocation check cannot run; fail
        // closed rather than hand out fresh tokens.
        let Some(name) = &session.device_name else {
            self.delete_session(session.id)?;
            return Err(ServerError::Unauthorized(
                "session has no device binding; log in again from a named device".to_string(),
            ));
        };
        match self.devices.find_by_name(session.user_id, name)? {
            Some(device) if device.status == DeviceStatus::Revoked => {
                self.delete_session(session.id)?;
                tracing::warn!(device_name = %name, "refresh attempt from revoked device");
                return Err(ServerError::Unauthorized(format!(
                    "{DEVICE_REVOKED}: this device's access has been revoked"
                )));
            }
            Some(_) => {}
            // The device row is gone; the session dies with it.
            None => {
                self.delete_session(session.id)?;
                return Err(ServerError::Unauthorized(
                    "session device no longer exists".to_string(),
                ));
            }
        }

        let user = self.users.find_by_id(session.user_id)?;
        self.rotate_session(session.id, user)
    }

    /// Resolves an access token to its account.
    pub fn authenticate(&self, access_token: &str) -> ServerResult<UserRecord> {
        let now = Utc::now().timestamp_millis();
        let digest = token_digest(access_token);
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT user_id, access_expires_at FROM sessions WHERE access_token_hash = ?",
            [&digest],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        );
        let (user_id, expires_at) = crate::db::optional(row)?
            .ok_or_else(|| ServerError::Unauthorized("invalid access token".to_string()))?;
        drop(conn);

        if expires_at <= now {
            return Err(ServerError::Unauthorized("access token expired".to_string()));
        }
        self.users.find_by_id(parse_uuid(&user_id)?)
    }

    /// Ends the session behind an access token. Unknown tokens are a no-op.
    pub fn logout(&self, access_token: &str) -> ServerResult<()> {
        let digest = token_digest(access_token);
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "DELETE FROM sessions WHERE access_token_hash = ?",
            [&digest],
        )?;
        Ok(())
    }

    fn open_session(&self, user: UserRecord, device_name: Option<&str>) -> ServerResult<AuthTokens> {
        let access_token = generate_token();
        let refresh_token = generate_token();
        let now = Utc::now();
        let session_id = Uuid::now_v7();

        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO sessions
                 (id, user_id, access_token_hash, refresh_token_hash, device_name,
                  access_expires_at, refresh_expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                session_id.to_string(),
                user.id.to_string(),
                token_digest(&access_token),
                token_digest(&refresh_token),
                device_name,
                now.timestamp_millis() + self.access_ttl_secs * 1000,
                now.timestamp_millis() + self.refresh_ttl_secs * 1000,
                now.timestamp_millis(),
            ],
        )?;
        drop(conn);

        tracing::info!(user_id = %user.id, device_name = ?device_name, "session opened");
        Ok(self.tokens(user, access_token, refresh_token))
    }

    fn rotate_session(&self, session_id: Uuid, user: UserRecord) -> ServerResult<AuthTokens> {
        let access_token = generate_token();
        let refresh_token = generate_token();
        let now = Utc::now().timestamp_millis();

        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "UPDATE sessions
             SET access_token_hash = ?, refresh_token_hash = ?,
                 access_expires_at = ?, refresh_expires_at = ?
             WHERE id = ?",
            duckdb::params![
                token_digest(&access_token),
                token_digest(&refresh_token),
                now + self.access_ttl_secs * 1000,
                now + self.refresh_ttl_secs * 1000,
                session_id.to_string(),
            ],
        )?;
        drop(conn);

        Ok(self.tokens(user, access_token, refresh_token))
    }

    fn tokens(&self, user: UserRecord, access_token: String, refresh_token: String) -> AuthTokens {
        AuthTokens {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs as u64,
            refresh_expires_in: self.refresh_ttl_secs as u64,
            user,
        }
    }

    fn find_session_by_refresh(&self, refresh_token: &str) -> ServerResult<Option<SessionRow>> {
        let digest = token_digest(refresh_token);
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, user_id, device_name, refresh_expires_at
             FROM sessions WHERE refresh_token_hash = ?",
            [&digest],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        );
        match crate::db::optional(row)? {
            None => Ok(None),
            Some((id, user_id, device_name, refresh_expires_at)) => Ok(Some(SessionRow {
                id: parse_uuid(&id)?,
                user_id: parse_uuid(&user_id)?,
                device_name,
                refresh_expires_at,
            })),
        }
    }

    fn delete_session(&self, session_id: Uuid) -> ServerResult<()> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "DELETE FROM sessions WHERE id = ?",
            [session_id.to_string()],
        )?;
        Ok(())
    }
}

struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    device_name: Option<String>,
    refresh_expires_at: i64,
}

/// 256 bits of randomness, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
