//! Usage: Bearer-session extractor for authenticated API routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app::app_state::AppState;
use crate::domain::sessions;
use crate::gateway::errors::ApiError;
use crate::shared::blocking;
use crate::shared::error::{AppError, CODE_UNAUTHENTICATED};

const LEGACY_TOKEN_HEADER: &str = "x-auth-token";

/// The user owning the request's bearer session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthUser {
    pub(crate) user_id: i64,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_authorization = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());

    from_authorization
        .or_else(|| {
            parts
                .headers
                .get(LEGACY_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_string)
}

fn unauthenticated(message: &str) -> ApiError {
    AppError::new(CODE_UNAUTHENTICATED, message).into()
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts).ok_or_else(|| unauthenticated("No token, authorization denied"))?;

        let db = state.db.clone();
        let user_id = blocking::run("session_resolve", move || {
            let conn = db.open_connection()?;
            sessions::resolve(&conn, &token)
        })
        .await?;

        match user_id {
            Some(user_id) => Ok(AuthUser { user_id }),
            None => Err(unauthenticated("Token is not valid")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: (&str, &str)) -> Parts {
        let (parts, _) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    #[test]
    fn bearer_token_reads_authorization_and_legacy_header() {
        assert_eq!(
            bearer_token(&parts(("authorization", "Bearer abc"))).as_deref(),
            Some("abc")
        );
        assert_eq!(
            bearer_token(&parts(("authorization", "bearer  xyz "))).as_deref(),
            Some("xyz")
        );
        assert_eq!(
            bearer_token(&parts(("x-auth-token", "legacy"))).as_deref(),
            Some("legacy")
        );
        assert_eq!(bearer_token(&parts(("authorization", "Basic abc"))), None);
        assert_eq!(bearer_token(&parts(("authorization", "Bearer "))), None);
    }
}
