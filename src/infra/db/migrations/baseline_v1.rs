//! Usage: Baseline schema (version 1) for fresh installs.

use crate::shared::time::now_unix_seconds;
use rusqlite::Connection;

pub(super) fn create_baseline_v1(conn: &mut Connection) -> Result<(), String> {
    let tx = conn
        .transaction()
        .map_err(|e| format!("DB_ERROR: failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  email TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE(email)
);

CREATE TABLE IF NOT EXISTS user_sessions (
  token_hash TEXT PRIMARY KEY,
  user_id INTEGER NOT NULL,
  created_at INTEGER NOT NULL,
  expires_at INTEGER NOT NULL,
  FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_user_sessions_user_id ON user_sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_user_sessions_expires_at ON user_sessions(expires_at);

CREATE TABLE IF NOT EXISTS provider_tokens (
  user_id INTEGER NOT NULL,
  provider TEXT NOT NULL,
  access_token TEXT,
  refresh_token TEXT,
  expiry_date INTEGER,
  updated_at INTEGER NOT NULL,
  PRIMARY KEY(user_id, provider),
  FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#,
    )
    .map_err(|e| format!("DB_ERROR: failed to create baseline schema: {e}"))?;

    tx.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        (1i64, now_unix_seconds()),
    )
    .map_err(|e| format!("DB_ERROR: failed to record baseline migration: {e}"))?;

    super::set_user_version(&tx, 1)?;

    tx.commit()
        .map_err(|e| format!("DB_ERROR: failed to commit baseline migration: {e}"))?;

    Ok(())
}
