//! Usage: Consent URL construction and the signed, stateless `state` parameter.

use crate::gateway::oauth::provider_trait::ConsentPrompt;
use crate::infra::config::YouTubeConfig;
use crate::shared::error::AppResult;
use crate::shared::security::{constant_time_eq, random_token};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

const STATE_NONCE_BYTES: usize = 16;

pub(crate) fn build_consent_url(
    cfg: &YouTubeConfig,
    state: &str,
    prompt: ConsentPrompt,
) -> AppResult<String> {
    let mut url = reqwest::Url::parse(cfg.auth_url.trim())
        .map_err(|e| format!("SYSTEM_ERROR: invalid oauth auth url: {e}"))?;
    {
        let scope = cfg
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", cfg.client_id.trim());
        query.append_pair("redirect_uri", cfg.redirect_uri.trim());
        query.append_pair("scope", &scope);
        query.append_pair("access_type", "offline");
        query.append_pair("include_granted_scopes", "true");
        query.append_pair("prompt", prompt.as_str());
        query.append_pair("state", state);
    }
    Ok(url.to_string())
}

/// Issues and verifies `nonce.signature` values bound to one user.
#[derive(Clone)]
pub(crate) struct ConsentStateSigner {
    secret: String,
}

impl std::fmt::Debug for ConsentStateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentStateSigner").finish_non_exhaustive()
    }
}

impl ConsentStateSigner {
    pub(crate) fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Every field is length-prefixed so no two `(user_id, nonce)` pairs share a digest input.
    fn sign(&self, user_id: i64, nonce: &str) -> String {
        let mut hasher = Sha256::new();
        for field in [self.secret.as_str(), user_id.to_string().as_str(), nonce] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    pub(crate) fn issue(&self, user_id: i64) -> String {
        let nonce = random_token(STATE_NONCE_BYTES);
        let signature = self.sign(user_id, &nonce);
        format!("{nonce}.{signature}")
    }

    pub(crate) fn verify(&self, user_id: i64, state: &str) -> bool {
        let Some((nonce, signature)) = state.trim().split_once('.') else {
            return false;
        };
        if nonce.is_empty() || signature.is_empty() {
            return false;
        }
        let expected = self.sign(user_id, nonce);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}
