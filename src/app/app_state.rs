//! Usage: Shared server state handed to every axum handler.

use crate::gateway::oauth::consent::ConsentStateSigner;
use crate::gateway::oauth::google::GoogleOAuthProvider;
use crate::gateway::oauth::provider_trait::TokenProvider;
use crate::gateway::oauth::refresh::RefreshGuard;
use crate::gateway::oauth::single_flight::RefreshFlights;
use crate::infra::config::AppConfig;
use crate::infra::db::Db;
use crate::shared::error::AppResult;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) db: Db,
    pub(crate) guard: RefreshGuard,
    pub(crate) state_signer: ConsentStateSigner,
}

pub(crate) fn build_http_client(config: &AppConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("creator-link/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(config.http_connect_timeout_secs))
        .timeout(Duration::from_secs(config.http_request_timeout_secs))
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: http client init failed: {e}").into())
}

impl AppState {
    pub(crate) fn new(config: AppConfig, db: Db) -> AppResult<Self> {
        let http = build_http_client(&config)?;
        let provider: Arc<dyn TokenProvider> = Arc::new(GoogleOAuthProvider::new(
            http.clone(),
            config.youtube.clone(),
        ));
        Ok(Self::with_provider(config, db, http, provider))
    }

    pub(crate) fn with_provider(
        config: AppConfig,
        db: Db,
        http: reqwest::Client,
        provider: Arc<dyn TokenProvider>,
    ) -> Self {
        let guard = RefreshGuard::new(db.clone(), provider, Arc::new(RefreshFlights::new()), http);
        let state_signer = ConsentStateSigner::new(config.session_secret.clone());
        Self {
            config: Arc::new(config),
            db,
            guard,
            state_signer,
        }
    }

    pub(crate) fn provider(&self) -> &dyn TokenProvider {
        self.guard.provider()
    }
}
