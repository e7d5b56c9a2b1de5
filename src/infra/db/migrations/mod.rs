//! Usage: SQLite schema migrations (user_version + incremental upgrades).

mod baseline_v1;

use rusqlite::Connection;

const LATEST_SCHEMA_VERSION: i64 = 1;

pub(super) fn apply_migrations(conn: &mut Connection) -> crate::shared::error::AppResult<()> {
    let mut user_version = read_user_version(conn)?;

    if user_version < 0 || user_version > LATEST_SCHEMA_VERSION {
        return Err(format!(
            "unsupported sqlite schema version: user_version={user_version} (expected 0..={LATEST_SCHEMA_VERSION})"
        )
        .into());
    }

    let start_version = user_version;

    if user_version == 0 {
        baseline_v1::create_baseline_v1(conn)?;
        user_version = read_user_version(conn)?;
        tracing::info!(to_version = user_version, "sqlite baseline schema created");
    }

    if user_version != LATEST_SCHEMA_VERSION {
        tracing::error!(
            version = user_version,
            "unsupported sqlite schema version during migration"
        );
        return Err(format!(
            "unsupported sqlite schema version: user_version={user_version} (expected 0..={LATEST_SCHEMA_VERSION})"
        )
        .into());
    }

    if start_version < user_version {
        tracing::info!(
            from_version = start_version,
            to_version = user_version,
            "sqlite migrations completed"
        );
    }

    Ok(())
}

fn read_user_version(conn: &Connection) -> crate::shared::error::AppResult<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| format!("DB_ERROR: failed to read sqlite user_version: {e}").into())
}

pub(super) fn set_user_version(
    tx: &rusqlite::Transaction<'_>,
    version: i64,
) -> Result<(), String> {
    tx.pragma_update(None, "user_version", version)
        .map_err(|e| format!("DB_ERROR: failed to update sqlite user_version: {e}"))
}
