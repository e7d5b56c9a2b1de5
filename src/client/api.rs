//! Usage: Client for the service API (consent URL, code exchange, identity, data fetch).

use crate::shared::error::{
    AppError, AppResult, CODE_AUTH_EXPIRED, CODE_UNAUTHENTICATED, CODE_UPSTREAM_ERROR,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Presence of a (masked) access token; no expiry check happens client-side.
    pub youtube_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel_title: String,
    pub channel_id: String,
    pub subscribers: Option<String>,
    pub views: Option<String>,
    pub video_count: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimelineEntry {
    pub date: String,
    pub views: i64,
}

/// The service endpoints the consent broker and connection state machine depend on.
pub trait ServiceApi: Send + Sync {
    fn consent_url(&self) -> ApiFuture<'_, String>;

    fn exchange_code<'a>(&'a self, code: &'a str, state: Option<&'a str>) -> ApiFuture<'a, ()>;

    fn identity(&self) -> ApiFuture<'_, Identity>;

    /// A 401 surfaces as `AUTH_EXPIRED`.
    fn channel_stats(&self) -> ApiFuture<'_, ChannelSummary>;

    /// A 401 surfaces as `AUTH_EXPIRED`.
    fn timeline(&self, range_days: u32) -> ApiFuture<'_, Vec<TimelineEntry>>;
}

#[derive(Debug, Clone)]
pub struct HttpServiceApi {
    client: reqwest::Client,
    base_url: String,
    bearer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnauthorizedAs {
    Unauthenticated,
    AuthExpired,
}

fn error_from_body(status: reqwest::StatusCode, body: &str, unauthorized: UnauthorizedAs) -> AppError {
    let value = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status={}", status.as_u16()));

    if status == reqwest::StatusCode::UNAUTHORIZED {
        let code = match unauthorized {
            UnauthorizedAs::AuthExpired => CODE_AUTH_EXPIRED,
            UnauthorizedAs::Unauthenticated => CODE_UNAUTHENTICATED,
        };
        return AppError::new(code, msg);
    }

    let code = value
        .get("error_code")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .unwrap_or(CODE_UPSTREAM_ERROR);
    AppError::new(code.to_string(), msg)
}

impl HttpServiceApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            bearer: bearer.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        unauthorized: UnauthorizedAs,
    ) -> AppResult<T> {
        let response = request
            .bearer_auth(&self.bearer)
            .send()
            .await
            .map_err(|e| format!("UPSTREAM_ERROR: service request failed: {e}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("UPSTREAM_ERROR: service response read failed: {e}"))?;

        if !status.is_success() {
            return Err(error_from_body(status, &body, unauthorized));
        }
        serde_json::from_str(&body)
            .map_err(|e| format!("UPSTREAM_ERROR: service response json invalid: {e}").into())
    }
}

fn parse_identity(value: &Value) -> AppResult<Identity> {
    let user = value
        .get("user")
        .ok_or_else(|| AppError::new(CODE_UPSTREAM_ERROR, "identity response missing user"))?;
    let youtube_connected = user
        .pointer("/socialTokens/youtube/access_token")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    Ok(Identity {
        id: user.get("id").and_then(Value::as_i64).unwrap_or_default(),
        name: user
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        email: user
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        youtube_connected,
    })
}

impl ServiceApi for HttpServiceApi {
    fn consent_url(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let value: Value = self
                .send(
                    self.client.get(self.url("/api/youtube/auth-url")),
                    UnauthorizedAs::Unauthenticated,
                )
                .await?;
            value
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .ok_or_else(|| AppError::new(CODE_UPSTREAM_ERROR, "consent url missing"))
        })
    }

    fn exchange_code<'a>(&'a self, code: &'a str, state: Option<&'a str>) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let body = serde_json::json!({ "code": code, "state": state });
            let _: Value = self
                .send(
                    self.client
                        .post(self.url("/api/youtube/callback"))
                        .header(reqwest::header::CONTENT_TYPE, "application/json")
                        .body(body.to_string()),
                    UnauthorizedAs::Unauthenticated,
                )
                .await?;
            Ok(())
        })
    }

    fn identity(&self) -> ApiFuture<'_, Identity> {
        Box::pin(async move {
            let value: Value = self
                .send(
                    self.client.get(self.url("/api/auth/me")),
                    UnauthorizedAs::Unauthenticated,
                )
                .await?;
            parse_identity(&value)
        })
    }

    fn channel_stats(&self) -> ApiFuture<'_, ChannelSummary> {
        Box::pin(async move {
            self.send(
                self.client.get(self.url("/api/youtube/analytics")),
                UnauthorizedAs::AuthExpired,
            )
            .await
        })
    }

    fn timeline(&self, range_days: u32) -> ApiFuture<'_, Vec<TimelineEntry>> {
        Box::pin(async move {
            self.send(
                self.client
                    .get(self.url("/api/youtube/analytics/timeline"))
                    .query(&[("range", range_days)]),
                UnauthorizedAs::AuthExpired,
            )
            .await
        })
    }
}
