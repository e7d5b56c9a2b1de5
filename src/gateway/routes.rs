//! Usage: Router assembly (API routes + CORS / COOP / trace layers).

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{identity, youtube};
use crate::app::app_state::AppState;
use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;

pub(crate) const CONSENT_RETURN_PATH: &str = "/oauth/youtube/return";

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    version: &'static str,
    ts: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "creator-link",
        version: env!("CARGO_PKG_VERSION"),
        ts: now_unix_seconds(),
    })
}

async fn root() -> &'static str {
    "creator-link API is running"
}

fn cors_layer(frontend_origin: &str) -> AppResult<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_origin.trim().trim_end_matches('/'))
        .map_err(|e| format!("CONFIG_INVALID: frontend_origin is not a valid header value: {e}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-auth-token"),
        ]))
}

pub(crate) fn build_router(state: AppState) -> AppResult<Router> {
    let cors = cors_layer(&state.config.frontend_origin)?;

    let api = Router::new()
        .route("/api/auth/me", get(identity::me))
        .route("/api/youtube/auth-url", get(youtube::consent_url))
        .route("/api/youtube/callback", post(youtube::exchange_code))
        .route("/api/youtube/analytics", get(youtube::analytics))
        .route("/api/youtube/analytics/timeline", get(youtube::timeline))
        .route(CONSENT_RETURN_PATH, get(youtube::consent_return));

    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(api)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
