//! Usage: Refresh guard. Turns a user's stored token set into a usable authorized client,
//! refreshing (single-flight, write-through) when the access token has expired.

use crate::domain::token_store::{self, TokenSet};
use crate::gateway::oauth::provider_trait::TokenProvider;
use crate::gateway::oauth::single_flight::RefreshFlights;
use crate::infra::db::Db;
use crate::shared::blocking;
use crate::shared::error::{AppResult, CredentialFailure};
use crate::shared::time::now_unix_millis;
use std::sync::Arc;

/// Outbound client bound to one user's current access token.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    user_id: i64,
    tokens: TokenSet,
    refreshed: bool,
}

impl AuthorizedClient {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Whether this call performed the refresh grant.
    pub fn refreshed(&self) -> bool {
        self.refreshed
    }

    pub fn access_token(&self) -> &str {
        self.tokens.access_token().unwrap_or_default()
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(self.access_token())
    }
}

#[derive(Clone)]
pub(crate) struct RefreshGuard {
    db: Db,
    provider: Arc<dyn TokenProvider>,
    flights: Arc<RefreshFlights>,
    http: reqwest::Client,
}

enum Decision {
    Ready(TokenSet),
    Refresh(String),
}

fn decide(tokens: TokenSet, now_ms: i64) -> AppResult<Decision> {
    if !tokens.is_connected() {
        return Err(CredentialFailure::NotConnected.into_error("no stored access token"));
    }
    if !tokens.is_expired_at(now_ms) {
        return Ok(Decision::Ready(tokens));
    }
    match tokens.refresh_token() {
        Some(refresh_token) => Ok(Decision::Refresh(refresh_token.to_string())),
        None => Err(CredentialFailure::NoRefreshToken
            .into_error("access token expired and no refresh token is stored")),
    }
}

impl RefreshGuard {
    pub(crate) fn new(
        db: Db,
        provider: Arc<dyn TokenProvider>,
        flights: Arc<RefreshFlights>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            db,
            provider,
            flights,
            http,
        }
    }

    pub(crate) fn provider(&self) -> &dyn TokenProvider {
        self.provider.as_ref()
    }

    async fn load(&self, user_id: i64) -> AppResult<TokenSet> {
        let db = self.db.clone();
        let provider = self.provider.provider_key();
        blocking::run("token_store_load", move || {
            let conn = db.open_connection()?;
            token_store::load(&conn, user_id, provider)
        })
        .await
    }

    fn client(&self, user_id: i64, tokens: TokenSet, refreshed: bool) -> AuthorizedClient {
        AuthorizedClient {
            http: self.http.clone(),
            user_id,
            tokens,
            refreshed,
        }
    }

    pub(crate) async fn ensure_valid_client(&self, user_id: i64) -> AppResult<AuthorizedClient> {
        self.ensure_valid_client_at(user_id, now_unix_millis()).await
    }

    pub(crate) async fn ensure_valid_client_at(
        &self,
        user_id: i64,
        now_ms: i64,
    ) -> AppResult<AuthorizedClient> {
        let provider_key = self.provider.provider_key();

        if let Decision::Ready(tokens) = decide(self.load(user_id).await?, now_ms)? {
            return Ok(self.client(user_id, tokens, false));
        }

        let _flight = self.flights.acquire(user_id, provider_key).await;

        // A previous holder may have refreshed while this call waited.
        let refresh_token = match decide(self.load(user_id).await?, now_ms)? {
            Decision::Ready(tokens) => {
                tracing::debug!(user_id, provider = provider_key, "token refreshed by concurrent request");
                return Ok(self.client(user_id, tokens, false));
            }
            Decision::Refresh(refresh_token) => refresh_token,
        };

        let fresh = match self.provider.refresh(&refresh_token).await {
            Ok(fresh) => fresh,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    provider = provider_key,
                    "oauth refresh failed: {}",
                    err
                );
                return Err(CredentialFailure::RefreshFailed.into_error(err.message().to_string()));
            }
        };

        let db = self.db.clone();
        let stored = blocking::run("token_store_apply_refresh", move || {
            let conn = db.open_connection()?;
            token_store::apply_refresh(
                &conn,
                user_id,
                provider_key,
                &fresh.access_token,
                fresh.refresh_token.as_deref(),
                fresh.expiry_date,
            )
        })
        .await
        .map_err(|err| {
            if err.code() == crate::shared::error::CODE_DB_NOT_FOUND {
                CredentialFailure::NotConnected.into_error("token set removed during refresh")
            } else {
                err
            }
        })?;

        tracing::info!(
            user_id,
            provider = provider_key,
            expiry_date = stored.expiry_date,
            "oauth access token refreshed"
        );
        Ok(self.client(user_id, stored, true))
    }
}
