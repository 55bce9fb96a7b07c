//! DuckDB persistence for the custodian.
//!
//! All stores share one connection behind an `Arc<Mutex>`. The schema is
//! created on open; envelope rows reference devices and are removed by the
//! registry when a device is deleted (cascade at the store layer).

use crate::error::{ServerError, ServerResult};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared database handle.
pub type Db = Arc<Mutex<Connection>>;

/// Opens a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the
/// database, it is removed and the open retried once; an unclean shutdown
/// can leave a WAL file that prevents reopening.
pub fn open(path: &Path) -> ServerResult<Db> {
    let conn = match Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                tracing::warn!(
                    "DuckDB open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    let c = Connection::open(path)?;
                    return finish_open(c);
                }
            }
            return Err(first_err.into());
        }
    };
    finish_open(conn)
}

/// Opens an in-memory database (for testing).
pub fn open_in_memory() -> ServerResult<Db> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn finish_open(conn: Connection) -> ServerResult<Db> {
    // Cap memory/threads; DuckDB defaults to ~80% RAM per connection
    conn.execute_batch("PRAGMA memory_limit='128MB'; PRAGMA threads=2;")?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn ensure_schema(conn: &Connection) -> ServerResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id VARCHAR PRIMARY KEY,
            name VARCHAR NOT NULL,
            email VARCHAR NOT NULL UNIQUE,
            password_phc VARCHAR NOT NULL,
            pepper_version INTEGER NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS devices (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            device_name VARCHAR NOT NULL,
            public_key VARCHAR NOT NULL,
            key_format VARCHAR NOT NULL,
            key_fingerprint VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            UNIQUE (user_id, device_name)
        );
        CREATE TABLE IF NOT EXISTS envelopes (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            device_id VARCHAR NOT NULL,
            ciphertext VARCHAR NOT NULL,
            metadata_json VARCHAR NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            UNIQUE (user_id, device_id)
        );
        CREATE TABLE IF NOT EXISTS files (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            file_id VARCHAR NOT NULL,
            file_name VARCHAR NOT NULL,
            size BIGINT NOT NULL,
            storage_path VARCHAR NOT NULL,
            wrapped_fek VARCHAR NOT NULL,
            fek_metadata_json VARCHAR NOT NULL,
            file_metadata_json VARCHAR NOT NULL,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL,
            UNIQUE (user_id, file_id)
        );
        CREATE TABLE IF NOT EXISTS sessions (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            access_token_hash VARCHAR NOT NULL,
            refresh_token_hash VARCHAR NOT NULL,
            device_name VARCHAR,
            access_expires_at BIGINT NOT NULL,
            refresh_expires_at BIGINT NOT NULL,
            created_at BIGINT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Maps `QueryReturnedNoRows` to `None`, other errors through.
pub fn optional<T>(result: Result<T, duckdb::Error>) -> ServerResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ServerError::from(e)),
    }
}

/// Parses a stored uuid column.
pub fn parse_uuid(s: &str) -> ServerResult<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| ServerError::Storage(format!("corrupt uuid column: {e}")))
}

/// Converts a stored millisecond timestamp column.
pub fn parse_millis(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
