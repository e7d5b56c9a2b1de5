//! Usage: OAuth token endpoint helpers (authorization_code + refresh_token grants).

use crate::gateway::oauth::provider_trait::ProviderTokens;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use serde_json::Value;
use std::collections::HashMap;

const ERROR_SNIPPET_MAX_CHARS: usize = 500;
const ERROR_DETAIL_MAX_CHARS: usize = 240;

#[derive(Debug, Clone)]
pub(crate) struct TokenExchangeRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) code: String,
    pub(crate) redirect_uri: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenRefreshRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) refresh_token: String,
}

pub(crate) async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest,
) -> AppResult<ProviderTokens> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "authorization_code".to_string());
    form.insert("code", req.code.trim().to_string());
    form.insert("redirect_uri", req.redirect_uri.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    form.insert("client_secret", req.client_secret.trim().to_string());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| format!("UPSTREAM_ERROR: oauth token exchange request failed: {e}"))?;

    parse_token_response(response, crate::shared::time::now_unix_millis()).await
}

pub(crate) async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AppResult<ProviderTokens> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", req.refresh_token.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    form.insert("client_secret", req.client_secret.trim().to_string());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| format!("UPSTREAM_ERROR: oauth refresh request failed: {e}"))?;

    parse_token_response(response, crate::shared::time::now_unix_millis()).await
}

async fn parse_token_response(
    response: reqwest::Response,
    now_ms: i64,
) -> AppResult<ProviderTokens> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("UPSTREAM_ERROR: oauth token response read failed: {e}"))?;

    if !status.is_success() {
        let (error_code, error_message) = parse_oauth_error_details(&body);
        let snippet = sanitize_oauth_error_body_snippet(&body);
        tracing::warn!(
            status = status.as_u16(),
            error_code = error_code.as_deref().unwrap_or(""),
            body = %snippet,
            "oauth token endpoint rejected request"
        );

        let mut msg = format!(
            "UPSTREAM_ERROR: oauth token endpoint returned status={}",
            status.as_u16()
        );
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(
                detail
                    .chars()
                    .take(ERROR_DETAIL_MAX_CHARS)
                    .collect::<String>()
                    .as_str(),
            );
        }
        return Err(msg.into());
    }

    parse_token_body(&body, now_ms)
}

fn parse_token_body(body: &str, now_ms: i64) -> AppResult<ProviderTokens> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| format!("UPSTREAM_ERROR: oauth token response json invalid: {e}"))?;

    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "UPSTREAM_ERROR: oauth token response missing access_token".to_string())?
        .to_string();

    let refresh_token = value
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    // `expires_in` is relative seconds; stored expiry is absolute epoch milliseconds.
    let expiry_date = value
        .get("expires_in")
        .and_then(parse_i64_lossy)
        .filter(|v| *v > 0)
        .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)));

    Ok(ProviderTokens {
        access_token,
        refresh_token,
        expiry_date,
    })
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc == "code"
        || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

pub(crate) fn sanitize_oauth_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(ERROR_SNIPPET_MAX_CHARS).collect();
        }
    }
    body.chars().take(ERROR_SNIPPET_MAX_CHARS).collect()
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let mut code = None;
    let mut message = value
        .get("error_description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match value.get("error") {
        Some(Value::String(err)) => {
            code = Some(err.trim().to_string()).filter(|v| !v.is_empty());
        }
        Some(Value::Object(err_obj)) => {
            code = err_obj
                .get("status")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if message.is_none() {
                message = err_obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
            }
        }
        _ => {}
    }

    (code, message)
}
