//! Usage: `GET /api/auth/me`, the identity endpoint the connection state machine reconciles with.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::app::app_state::AppState;
use crate::domain::token_store::{self, TokenSet};
use crate::domain::users;
use crate::gateway::auth::AuthUser;
use crate::gateway::errors::ApiError;
use crate::shared::blocking;
use crate::shared::security::mask_token;

#[derive(Debug, Serialize)]
pub(crate) struct MaskedTokenSet {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiry_date: Option<i64>,
}

impl From<&TokenSet> for MaskedTokenSet {
    fn from(tokens: &TokenSet) -> Self {
        Self {
            access_token: tokens.access_token().map(mask_token),
            refresh_token: tokens.refresh_token().map(mask_token),
            expiry_date: tokens.expiry_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SocialTokens {
    youtube: MaskedTokenSet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityUser {
    id: i64,
    name: String,
    email: String,
    social_tokens: SocialTokens,
}

#[derive(Debug, Serialize)]
pub(crate) struct IdentityResponse {
    msg: &'static str,
    user: IdentityUser,
}

pub(crate) async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<IdentityResponse>, ApiError> {
    let db = state.db.clone();
    let provider = state.provider().provider_key();
    let (user, tokens) = blocking::run("identity_load", move || {
        let conn = db.open_connection()?;
        let user = users::get_by_id(&conn, auth.user_id)?;
        let tokens = token_store::load(&conn, auth.user_id, provider)?;
        Ok::<_, crate::shared::error::AppError>((user, tokens))
    })
    .await?;

    Ok(Json(IdentityResponse {
        msg: "You are authenticated",
        user: IdentityUser {
            id: user.id,
            name: user.name,
            email: user.email,
            social_tokens: SocialTokens {
                youtube: MaskedTokenSet::from(&tokens),
            },
        },
    }))
}
