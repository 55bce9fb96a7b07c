//! User accounts and password verification.
//!
//! Passwords are peppered then hashed with Argon2id; only the PHC string
//! and the pepper version used at creation are stored. Verification never
//! reveals whether the email or the password was wrong.

use crate::db::{parse_millis, parse_uuid, Db};
use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use sealbox_crypto::{hash_password, verify_password, PasswordRecord, PepperSet};
use sealbox_types::UserRecord;
use uuid::Uuid;

pub struct UserStore {
    db: Db,
    peppers: PepperSet,
}

struct StoredUser {
    record: UserRecord,
    password: PasswordRecord,
}

impl UserStore {
    pub fn new(db: Db, peppers: PepperSet) -> Self {
        Self { db, peppers }
    }

    /// Creates an account. The email must be unique.
    pub fn create_user(&self, name: &str, email: &str, password: &str) -> ServerResult<UserRecord> {
        let email = email.trim().to_lowercase();
        let hashed = hash_password(password, &self.peppers)?;
        let now = Utc::now();
        let id = Uuid::now_v7();

        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?",
            [&email],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(ServerError::Conflict(format!(
                "an account already exists for {email}"
            )));
        }

        conn.execute(
            "INSERT INTO users (id, name, email, password_phc, pepper_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                id.to_string(),
                name,
                email,
                hashed.phc,
                hashed.pepper_version as i64,
                now.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;

        tracing::info!(user_id = %id, "user account created");
        Ok(UserRecord {
            id,
            name: name.to_string(),
            email,
            created_at: now,
            updated_at: now,
        })
    }

    /// Verifies email + password, returning the account on success.
    ///
    /// A missing account and a wrong password produce the same error.
    pub fn verify_credentials(&self, email: &str, password: &str) -> ServerResult<UserRecord> {
        let email = email.trim().to_lowercase();
        let stored = self
            .load_by_email(&email)?
            .ok_or_else(|| ServerError::Unauthorized("invalid email or password".to_string()))?;

        verify_password(password, &stored.password, &self.peppers)
            .map_err(|_| ServerError::Unauthorized("invalid email or password".to_string()))?;
        Ok(stored.record)
    }

    /// Re-verifies the account password for a sensitive operation
    /// (revocation, re-authorization). The caller is already authenticated;
    /// this is a freshness check, not identification.
    pub fn verify_password_for(&self, user_id: Uuid, password: &str) -> ServerResult<()> {
        let stored = self
            .load_by_id(user_id)?
            .ok_or_else(|| ServerError::NotFound("user not found".to_string()))?;
        verify_password(password, &stored.password, &self.peppers)?;
        Ok(())
    }

    pub fn find_by_id(&self, user_id: Uuid) -> ServerResult<UserRecord> {
        self.load_by_id(user_id)?
            .map(|s| s.record)
            .ok_or_else(|| ServerError::NotFound("user not found".to_string()))
    }

    fn load_by_email(&self, email: &str) -> ServerResult<Option<StoredUser>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, name, email, password_phc, pepper_version, created_at, updated_at
             FROM users WHERE email = ?",
            [email],
            Self::map_row,
        );
        crate::db::optional(row)?.map(Self::finish_row).transpose()
    }

    fn load_by_id(&self, user_id: Uuid) -> ServerResult<Option<StoredUser>> {
        let conn = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn.query_row(
            "SELECT id, name, email, password_phc, pepper_version, created_at, updated_at
             FROM users WHERE id = ?",
            [user_id.to_string()],
            Self::map_row,
        );
        crate::db::optional(row)?.map(Self::finish_row).transpose()
    }

    #[allow(clippy::type_complexity)]
    fn map_row(
        row: &duckdb::Row<'_>,
    ) -> Result<(String, String, String, String, i64, i64, i64), duckdb::Error> {
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
        (id, name, email, phc, pepper_version, created, updated): (
            String,
            String,
            String,
            String,
            i64,
            i64,
            i64,
        ),
    ) -> ServerResult<StoredUser> {
        Ok(StoredUser {
            record: UserRecord {
                id: parse_uuid(&id)?,
                name,
                email,
                created_at: parse_millis(created),
                updated_at: parse_millis(updated),
            },
            password: PasswordRecord {
                phc,
                pepper_version: pepper_version as u8,
            },
        })
    }
}
