//! Usage: Application user records (created by the external login flow).

use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 120;
const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

fn normalize_name(input: &str) -> AppResult<String> {
    let name = input.trim();
    if name.is_empty() {
        return Err("VALIDATION: name is required".into());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("VALIDATION: name is too long (max {MAX_NAME_LEN})").into());
    }
    Ok(name.to_string())
}

fn normalize_email(input: &str) -> AppResult<String> {
    let email = input.trim().to_ascii_lowercase();
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') || email.starts_with('@') {
        return Err(format!("VALIDATION: invalid email={email}").into());
    }
    Ok(email)
}

pub fn create(conn: &Connection, name: &str, email: &str) -> AppResult<User> {
    let name = normalize_name(name)?;
    let email = normalize_email(email)?;
    let now = now_unix_seconds();

    conn.execute(
        "INSERT INTO users(name, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![name, email, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            crate::shared::error::AppError::new(
                "VALIDATION",
                format!("email already registered: {email}"),
            )
        }
        other => db_err!("failed to insert user: {other}"),
    })?;

    Ok(User {
        id: conn.last_insert_rowid(),
        name,
        email,
    })
}

pub fn get_by_id(conn: &Connection, id: i64) -> AppResult<User> {
    conn.query_row(
        "SELECT id, name, email FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| db_err!("failed to query user: {e}"))?
    .ok_or_else(|| format!("DB_NOT_FOUND: user not found: id={id}").into())
}
