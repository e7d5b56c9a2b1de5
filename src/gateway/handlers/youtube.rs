//! Usage: YouTube consent, code exchange and data-fetch handlers.

use axum::{
    extract::{Query, State},
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::app_state::AppState;
use crate::domain::token_store;
use crate::gateway::auth::AuthUser;
use crate::gateway::errors::ApiError;
use crate::gateway::oauth::provider_trait::ConsentPrompt;
use crate::gateway::oauth::refresh::AuthorizedClient;
use crate::gateway::oauth::return_page::{self, ReturnQuery};
use crate::gateway::youtube_api::{
    self, ChannelStats, TimelinePoint, DEFAULT_TIMELINE_DAYS, MAX_TIMELINE_DAYS, MIN_TIMELINE_DAYS,
};
use crate::shared::blocking;
use crate::shared::error::{AppError, CODE_DB_NOT_FOUND, CODE_UPSTREAM_NOT_FOUND, CODE_VALIDATION};

#[derive(Debug, Serialize)]
pub(crate) struct ConsentUrlResponse {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CallbackBody {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    msg: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TimelineQuery {
    range: Option<String>,
}

fn validation(message: &str) -> ApiError {
    AppError::new(CODE_VALIDATION, message).into()
}

/// Runs the refresh guard. Any credential failure wipes the stored token set so the
/// user is prompted to connect again.
async fn authorized_client(state: &AppState, user_id: i64) -> Result<AuthorizedClient, ApiError> {
    let err = match state.guard.ensure_valid_client(user_id).await {
        Ok(client) => {
            if client.refreshed() {
                tracing::debug!(user_id = client.user_id(), "youtube access token refreshed");
            }
            return Ok(client);
        }
        Err(err) => err,
    };

    if let Some(kind) = err.credential_failure() {
        tracing::warn!(
            user_id,
            kind = kind.as_str(),
            "clearing unusable youtube credentials"
        );
        let db = state.db.clone();
        let provider = state.provider().provider_key();
        let cleared = blocking::run("token_store_clear", move || {
            let conn = db.open_connection()?;
            token_store::clear(&conn, user_id, provider)
        })
        .await;
        if let Err(clear_err) = cleared {
            tracing::error!(user_id, "failed to clear youtube credentials: {}", clear_err);
        }
    }

    Err(err.into())
}

pub(crate) async fn consent_url(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ConsentUrlResponse>, ApiError> {
    let db = state.db.clone();
    let provider = state.provider().provider_key();
    let tokens = blocking::run("token_store_load", move || {
        let conn = db.open_connection()?;
        token_store::load(&conn, auth.user_id, provider)
    })
    .await
    .map_err(|e| ApiError::with_msg(e, "Failed to generate auth URL"))?;

    let prompt = ConsentPrompt::for_stored_refresh_token(tokens.refresh_token().is_some());
    let consent_state = state.state_signer.issue(auth.user_id);
    let url = state
        .provider()
        .consent_url(&consent_state, prompt)
        .map_err(|e| ApiError::with_msg(e, "Failed to generate auth URL"))?;

    Ok(Json(ConsentUrlResponse { url }))
}

pub(crate) async fn exchange_code(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<Json<CallbackBody>>,
) -> Result<Json<MessageResponse>, ApiError> {
    // An absent or unparseable body is treated like one without a code.
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let code = body
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| validation("Missing authorization code"))?
        .to_string();

    if let Some(consent_state) = body.state.as_deref().filter(|s| !s.trim().is_empty()) {
        if !state.state_signer.verify(auth.user_id, consent_state) {
            tracing::warn!(user_id = auth.user_id, "consent state mismatch");
            return Err(validation("Invalid consent state"));
        }
    }

    let fresh = state
        .provider()
        .exchange_code(&code)
        .await
        .map_err(|e| ApiError::with_msg(e, "YouTube connection failed"))?;

    let db = state.db.clone();
    let provider = state.provider().provider_key();
    let user_id = auth.user_id;
    blocking::run("token_store_exchange", move || {
        let conn = db.open_connection()?;
        crate::domain::users::get_by_id(&conn, user_id)?;
        token_store::store_exchanged(
            &conn,
            user_id,
            provider,
            &fresh.access_token,
            fresh.refresh_token.as_deref(),
            fresh.expiry_date,
        )
    })
    .await
    .map_err(|e| {
        if e.code() == CODE_DB_NOT_FOUND {
            ApiError::from(AppError::new(CODE_DB_NOT_FOUND, "User not found"))
        } else {
            ApiError::with_msg(e, "YouTube connection failed")
        }
    })?;

    tracing::info!(user_id, "youtube connected");
    Ok(Json(MessageResponse {
        msg: "YouTube connected successfully",
    }))
}

pub(crate) async fn analytics(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ChannelStats>, ApiError> {
    let client = authorized_client(&state, auth.user_id).await?;
    youtube_api::fetch_channel_stats(&client, &state.config.youtube.data_api_url)
        .await
        .map(Json)
        .map_err(|e| {
            if e.code() == CODE_UPSTREAM_NOT_FOUND {
                ApiError::from(e)
            } else {
                ApiError::with_msg(e, "Failed to fetch analytics")
            }
        })
}

fn parse_range(raw: Option<&str>) -> Result<u32, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_TIMELINE_DAYS);
    };
    raw.parse::<u32>()
        .ok()
        .filter(|v| (MIN_TIMELINE_DAYS..=MAX_TIMELINE_DAYS).contains(v))
        .ok_or_else(|| {
            validation(&format!(
                "range must be an integer within [{MIN_TIMELINE_DAYS}, {MAX_TIMELINE_DAYS}]"
            ))
        })
}

pub(crate) async fn timeline(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<TimelinePoint>>, ApiError> {
    let range = parse_range(query.range.as_deref())?;
    let client = authorized_client(&state, auth.user_id).await?;
    let today = chrono::Utc::now().date_naive();
    youtube_api::fetch_views_timeline(
        &client,
        &state.config.youtube.analytics_api_url,
        today,
        range,
    )
    .await
    .map(Json)
    .map_err(|e| ApiError::with_msg(e, "Failed to fetch timeline"))
}

/// Redirect target of the consent popup; relays the code to the opener.
pub(crate) async fn consent_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Html<String> {
    if let Some(error) = query.error.as_deref() {
        tracing::info!(error, "consent returned without a code");
    }
    Html(return_page::render(query, &state.config.frontend_origin))
}
