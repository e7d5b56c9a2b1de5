//! Usage: Helpers for the integration tests under `tests/`. Hidden from docs; not a stable API.

use crate::domain::{sessions, token_store, users};
use crate::infra::config::AppConfig;
use crate::infra::db;
use crate::shared::error::AppResult;
use std::path::{Path, PathBuf};

pub const TEST_SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";
pub const TEST_FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Config bound to an ephemeral local port with every provider endpoint under `provider_base_url`.
pub fn test_config(database_path: &Path, provider_base_url: &str) -> AppConfig {
    let base = provider_base_url.trim_end_matches('/');
    let mut config = AppConfig {
        listen_address: "127.0.0.1:0".to_string(),
        database_path: PathBuf::from(database_path),
        frontend_origin: TEST_FRONTEND_ORIGIN.to_string(),
        session_secret: TEST_SESSION_SECRET.to_string(),
        ..AppConfig::default()
    };
    config.youtube.client_id = "test-client-id".to_string();
    config.youtube.client_secret = "test-client-secret".to_string();
    config.youtube.redirect_uri = format!("{TEST_FRONTEND_ORIGIN}/youtube/return");
    config.youtube.auth_url = format!("{base}/o/oauth2/v2/auth");
    config.youtube.token_url = format!("{base}/token");
    config.youtube.data_api_url = format!("{base}/youtube/v3");
    config.youtube.analytics_api_url = format!("{base}/v2");
    config
}

pub fn init_db(database_path: &Path) -> AppResult<()> {
    db::init_at(database_path).map(|_| ())
}

pub fn create_user(database_path: &Path, name: &str, email: &str) -> AppResult<i64> {
    let db = db::init_at(database_path)?;
    let conn = db.open_connection()?;
    users::create(&conn, name, email).map(|user| user.id)
}

/// Returns the raw bearer token for `user_id`.
pub fn issue_session(database_path: &Path, user_id: i64) -> AppResult<String> {
    let db = db::init_at(database_path)?;
    let conn = db.open_connection()?;
    sessions::issue(&conn, user_id, 3600).map(|session| session.token)
}

pub fn seed_youtube_tokens(
    database_path: &Path,
    user_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    expiry_date: Option<i64>,
) -> AppResult<()> {
    let db = db::init_at(database_path)?;
    let conn = db.open_connection()?;
    token_store::store_exchanged(
        &conn,
        user_id,
        token_store::PROVIDER_YOUTUBE,
        access_token,
        refresh_token,
        expiry_date,
    )
    .map(|_| ())
}

pub fn read_youtube_tokens(database_path: &Path, user_id: i64) -> AppResult<token_store::TokenSet> {
    let db = db::init_at(database_path)?;
    let conn = db.open_connection()?;
    token_store::load(&conn, user_id, token_store::PROVIDER_YOUTUBE)
}
