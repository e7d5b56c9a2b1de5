//! Usage: Opaque bearer sessions. Only the SHA-256 of a token is persisted.

use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use crate::shared::security::{random_token, sha256_hex};
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, Connection, OptionalExtension};

const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Returned to the caller once; never stored.
    pub token: String,
    pub user_id: i64,
    pub expires_at: i64,
}

pub fn issue(conn: &Connection, user_id: i64, ttl_secs: i64) -> AppResult<IssuedSession> {
    if user_id <= 0 {
        return Err(format!("VALIDATION: invalid user id={user_id}").into());
    }
    if ttl_secs <= 0 {
        return Err("VALIDATION: session ttl must be > 0".into());
    }

    let token = random_token(SESSION_TOKEN_BYTES);
    let now = now_unix_seconds();
    let expires_at = now.saturating_add(ttl_secs);
    conn.execute(
        "INSERT INTO user_sessions(token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![sha256_hex(&token), user_id, now, expires_at],
    )
    .map_err(|e| db_err!("failed to insert session: {e}"))?;

    Ok(IssuedSession {
        token,
        user_id,
        expires_at,
    })
}

/// Returns the owning user id of a live session.
pub(crate) fn resolve(conn: &Connection, token: &str) -> AppResult<Option<i64>> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    conn.query_row(
        "SELECT user_id FROM user_sessions WHERE token_hash = ?1 AND expires_at > ?2",
        params![sha256_hex(token), now_unix_seconds()],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map_err(|e| db_err!("failed to resolve session: {e}"))
}

pub fn revoke(conn: &Connection, token: &str) -> AppResult<bool> {
    let affected = conn
        .execute(
            "DELETE FROM user_sessions WHERE token_hash = ?1",
            params![sha256_hex(token.trim())],
        )
        .map_err(|e| db_err!("failed to revoke session: {e}"))?;
    Ok(affected > 0)
}

pub(crate) fn purge_expired(conn: &Connection) -> AppResult<usize> {
    conn.execute(
        "DELETE FROM user_sessions WHERE expires_at <= ?1",
        params![now_unix_seconds()],
    )
    .map_err(|e| db_err!("failed to purge expired sessions: {e}"))
}
