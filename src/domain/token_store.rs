//! Usage: Persisted delegated-credential token sets, one per (user, provider).

use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

pub const PROVIDER_YOUTUBE: &str = "youtube";

/// Stored credential triple. An empty set means "not connected".
///
/// `expiry_date` is provider-issued epoch milliseconds; an absent value means the
/// access token never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_date: Option<i64>,
}

impl TokenSet {
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|v| !v.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|v| !v.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.access_token().is_some()
    }

    /// Strict comparison, no skew buffer.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry < now_ms)
    }
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_key(user_id: i64, provider: &str) -> AppResult<()> {
    if user_id <= 0 {
        return Err(format!("VALIDATION: invalid user id={user_id}").into());
    }
    if provider.trim().is_empty() {
        return Err("VALIDATION: provider is required".into());
    }
    Ok(())
}

pub(crate) fn load(conn: &Connection, user_id: i64, provider: &str) -> AppResult<TokenSet> {
    validate_key(user_id, provider)?;
    let row = conn
        .query_row(
            r#"
SELECT access_token, refresh_token, expiry_date
FROM provider_tokens
WHERE user_id = ?1 AND provider = ?2
"#,
            params![user_id, provider],
            |row| {
                Ok(TokenSet {
                    access_token: row.get(0)?,
                    refresh_token: row.get(1)?,
                    expiry_date: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| db_err!("failed to load token set: {e}"))?;
    Ok(row.unwrap_or_default())
}

/// Saves the result of an authorization-code exchange. A missing refresh token keeps
/// the stored one; re-consent with account selection usually omits it.
pub(crate) fn store_exchanged(
    conn: &Connection,
    user_id: i64,
    provider: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expiry_date: Option<i64>,
) -> AppResult<TokenSet> {
    validate_key(user_id, provider)?;
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err("VALIDATION: access_token is required".into());
    }
    let refresh_token = normalize_optional_text(refresh_token);

    conn.execute(
        r#"
INSERT INTO provider_tokens(user_id, provider, access_token, refresh_token, expiry_date, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(user_id, provider) DO UPDATE SET
  access_token = excluded.access_token,
  refresh_token = COALESCE(excluded.refresh_token, provider_tokens.refresh_token),
  expiry_date = excluded.expiry_date,
  updated_at = excluded.updated_at
"#,
        params![
            user_id,
            provider,
            access_token,
            refresh_token,
            expiry_date,
            now_unix_seconds()
        ],
    )
    .map_err(|e| db_err!("failed to store token set: {e}"))?;

    load(conn, user_id, provider)
}

/// Write-through after a successful refresh. `access_token` and `expiry_date` are always
/// overwritten, `refresh_token` only when the provider reissued one.
pub(crate) fn apply_refresh(
    conn: &Connection,
    user_id: i64,
    provider: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expiry_date: Option<i64>,
) -> AppResult<TokenSet> {
    validate_key(user_id, provider)?;
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err("VALIDATION: access_token is required".into());
    }
    let refresh_token = normalize_optional_text(refresh_token);

    let affected = conn
        .execute(
            r#"
UPDATE provider_tokens
SET
  access_token = ?1,
  expiry_date = ?2,
  refresh_token = COALESCE(?3, refresh_token),
  updated_at = ?4
WHERE user_id = ?5 AND provider = ?6
"#,
            params![
                access_token,
                expiry_date,
                refresh_token,
                now_unix_seconds(),
                user_id,
                provider
            ],
        )
        .map_err(|e| db_err!("failed to update refreshed tokens: {e}"))?;
    if affected == 0 {
        return Err("DB_NOT_FOUND: token set not found".into());
    }

    load(conn, user_id, provider)
}

/// Resets to "not connected". Returns whether a row existed.
pub(crate) fn clear(conn: &Connection, user_id: i64, provider: &str) -> AppResult<bool> {
    validate_key(user_id, provider)?;
    let affected = conn
        .execute(
            "DELETE FROM provider_tokens WHERE user_id = ?1 AND provider = ?2",
            params![user_id, provider],
        )
        .map_err(|e| db_err!("failed to clear token set: {e}"))?;
    Ok(affected > 0)
}
