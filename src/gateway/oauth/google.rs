//! Usage: Google OAuth 2.0 implementation of `TokenProvider` for YouTube access.

use crate::domain::token_store::PROVIDER_YOUTUBE;
use crate::gateway::oauth::consent::build_consent_url;
use crate::gateway::oauth::provider_trait::{
    ConsentPrompt, ProviderFuture, ProviderTokens, TokenProvider,
};
use crate::gateway::oauth::token_exchange::{
    exchange_authorization_code, refresh_access_token, TokenExchangeRequest, TokenRefreshRequest,
};
use crate::infra::config::YouTubeConfig;
use crate::shared::error::AppResult;

pub(crate) struct GoogleOAuthProvider {
    client: reqwest::Client,
    config: YouTubeConfig,
}

impl GoogleOAuthProvider {
    pub(crate) fn new(client: reqwest::Client, config: YouTubeConfig) -> Self {
        Self { client, config }
    }
}

impl TokenProvider for GoogleOAuthProvider {
    fn provider_key(&self) -> &'static str {
        PROVIDER_YOUTUBE
    }

    fn consent_url(&self, state: &str, prompt: ConsentPrompt) -> AppResult<String> {
        build_consent_url(&self.config, state, prompt)
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, ProviderTokens> {
        Box::pin(async move {
            let request = TokenExchangeRequest {
                token_uri: self.config.token_url.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                code: code.to_string(),
                redirect_uri: self.config.redirect_uri.clone(),
            };
            exchange_authorization_code(&self.client, &request).await
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, ProviderTokens> {
        Box::pin(async move {
            let request = TokenRefreshRequest {
                token_uri: self.config.token_url.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                refresh_token: refresh_token.to_string(),
            };
            refresh_access_token(&self.client, &request).await
        })
    }
}
