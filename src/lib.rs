//! Delegated YouTube access: consent, token storage, refresh guard and the client-side
//! consent broker / connection state machine.

mod app;
pub mod client;
pub mod domain;
pub mod gateway;
pub mod infra;
mod shared;
#[doc(hidden)]
pub mod test_support;

pub use app::logging;
pub use gateway::{ServerManager, ServerStatus};
pub use infra::config::AppConfig;
pub use shared::error::{AppError, AppResult, CredentialFailure};

use app::app_state::AppState;

/// Opens the database and starts the HTTP server described by `config`.
pub async fn start_server(config: AppConfig) -> AppResult<ServerManager> {
    let db_path = config.database_path.clone();
    let db = shared::blocking::run("db_init", move || infra::db::init_at(&db_path)).await?;

    let purge_db = db.clone();
    match shared::blocking::run("session_purge", move || {
        let conn = purge_db.open_connection()?;
        domain::sessions::purge_expired(&conn)
    })
    .await
    {
        Ok(purged) if purged > 0 => tracing::info!(purged, "expired sessions removed"),
        Ok(_) => {}
        Err(err) => tracing::warn!("expired session cleanup failed: {}", err),
    }

    let state = AppState::new(config, db)?;
    let mut manager = ServerManager::default();
    manager.start(state).await?;
    Ok(manager)
}
