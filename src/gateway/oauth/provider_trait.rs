//! Usage: `TokenProvider` trait, the seam between the refresh guard / code exchange and
//! the OAuth authorization server.

use crate::shared::error::AppResult;
use std::future::Future;
use std::pin::Pin;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Token material returned by a code exchange or refresh grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTokens {
    pub access_token: String,
    /// Present only when the provider (re)issued one.
    pub refresh_token: Option<String>,
    /// Epoch milliseconds; `None` when the provider did not send `expires_in`.
    pub expiry_date: Option<i64>,
}

/// Whether the consent screen must be shown again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPrompt {
    /// No refresh token stored yet: force the consent screen so one is issued.
    Consent,
    SelectAccount,
}

impl ConsentPrompt {
    pub fn for_stored_refresh_token(has_refresh_token: bool) -> Self {
        if has_refresh_token {
            Self::SelectAccount
        } else {
            Self::Consent
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

/// Object-safe so the server can hold an `Arc<dyn TokenProvider>` and tests can
/// substitute a counting fake.
pub trait TokenProvider: Send + Sync {
    /// Key under which token sets are stored (e.g. "youtube").
    fn provider_key(&self) -> &'static str;

    fn consent_url(&self, state: &str, prompt: ConsentPrompt) -> AppResult<String>;

    fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, ProviderTokens>;

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, ProviderTokens>;
}
