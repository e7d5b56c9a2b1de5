mod support;

use serde_json::{json, Value};
use support::{now_ms, query_param, TestService};
use wiremock::matchers::{body_string_contains, header, method, path, query_param as mock_query};
use wiremock::{Mock, ResponseTemplate};

async fn get_json(svc: &TestService, path: &str) -> (u16, Value) {
    let resp = svc
        .http()
        .get(svc.url(path))
        .bearer_auth(&svc.bearer)
        .send()
        .await
        .expect("send");
    let status = resp.status().as_u16();
    let text = resp.text().await.expect("body");
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

async fn post_callback(svc: &TestService, body: Value) -> (u16, Value) {
    post_callback_raw(svc, Some("application/json"), body.to_string()).await
}

async fn post_callback_raw(
    svc: &TestService,
    content_type: Option<&str>,
    body: String,
) -> (u16, Value) {
    let mut req = svc
        .http()
        .post(svc.url("/api/youtube/callback"))
        .bearer_auth(&svc.bearer);
    if let Some(content_type) = content_type {
        req = req.header("content-type", content_type);
    }
    let resp = req.body(body).send().await.expect("send");
    let status = resp.status().as_u16();
    let text = resp.text().await.expect("body");
    (status, serde_json::from_str(&text).unwrap_or(Value::Null))
}

fn channel_body() -> Value {
    json!({
        "items": [{
            "id": "UC123",
            "snippet": { "title": "Ada Builds" },
            "statistics": { "subscriberCount": "42", "viewCount": "1000", "videoCount": "7" }
        }]
    })
}

#[tokio::test]
async fn consent_url_prompt_depends_on_stored_refresh_token() {
    let svc = TestService::start().await;

    let (status, body) = get_json(&svc, "/api/youtube/auth-url").await;
    assert_eq!(status, 200);
    let url = body["url"].as_str().expect("url").to_string();
    assert!(url.starts_with(&format!("{}/o/oauth2/v2/auth", svc.provider.uri())));
    assert_eq!(query_param(&url, "prompt").as_deref(), Some("consent"));
    assert_eq!(query_param(&url, "access_type").as_deref(), Some("offline"));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert!(query_param(&url, "scope")
        .expect("scope")
        .contains("youtube.readonly"));
    assert!(query_param(&url, "state").is_some());

    svc.seed_tokens("access-token-1", Some("refresh-token-1"), None);
    let (_, body) = get_json(&svc, "/api/youtube/auth-url").await;
    let url = body["url"].as_str().expect("url");
    assert_eq!(query_param(url, "prompt").as_deref(), Some("select_account"));

    svc.shutdown().await;
}

#[tokio::test]
async fn callback_stores_tokens_and_keeps_refresh_token_on_reconsent() {
    let svc = TestService::start().await;
    svc.seed_tokens("old-access-token", Some("refresh-token-1"), Some(now_ms() - 1000));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=XYZ"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "new-access-token", "expires_in": 3600 })),
        )
        .expect(1)
        .mount(&svc.provider)
        .await;

    let (_, body) = get_json(&svc, "/api/youtube/auth-url").await;
    let state = query_param(body["url"].as_str().expect("url"), "state").expect("state");

    let before = now_ms();
    let (status, body) = post_callback(&svc, json!({ "code": "XYZ", "state": state })).await;
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["msg"], "YouTube connected successfully");

    let tokens = svc.tokens();
    assert_eq!(tokens.access_token(), Some("new-access-token"));
    assert_eq!(tokens.refresh_token(), Some("refresh-token-1"));
    let expiry = tokens.expiry_date.expect("expiry");
    assert!(expiry >= before + 3_600_000);

    svc.shutdown().await;
}

#[tokio::test]
async fn callback_rejects_missing_code_and_forged_state() {
    let svc = TestService::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&svc.provider)
        .await;

    let (status, body) = post_callback(&svc, json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Missing authorization code");
    assert_eq!(body["error_code"], "VALIDATION");

    // No body at all, then an empty JSON body: both answer with the same JSON error.
    for (content_type, raw) in [(None, ""), (Some("application/json"), "")] {
        let (status, body) = post_callback_raw(&svc, content_type, raw.to_string()).await;
        assert_eq!(status, 400, "content type {content_type:?}");
        assert_eq!(body["msg"], "Missing authorization code");
        assert_eq!(body["error_code"], "VALIDATION");
    }

    let (status, body) = post_callback(&svc, json!({ "code": "XYZ", "state": "forged.sig" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Invalid consent state");

    assert!(!svc.tokens().is_connected());
    svc.shutdown().await;
}

#[tokio::test]
async fn callback_exchange_failure_is_500_without_tokens() {
    let svc = TestService::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .expect(1)
        .mount(&svc.provider)
        .await;

    let (status, body) = post_callback(&svc, json!({ "code": "stale" })).await;
    assert_eq!(status, 500);
    assert_eq!(body["msg"], "YouTube connection failed");
    assert!(!svc.tokens().is_connected());

    svc.shutdown().await;
}

#[tokio::test]
async fn analytics_refreshes_expired_token_before_fetch() {
    let svc = TestService::start().await;
    svc.seed_tokens("access-token-a1", Some("refresh-token-r1"), Some(now_ms() - 1000));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-token-r1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "access-token-a2", "expires_in": 3600 })),
        )
        .expect(1)
        .mount(&svc.provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .and(mock_query("mine", "true"))
        .and(header("authorization", "Bearer access-token-a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body()))
        .expect(2)
        .mount(&svc.provider)
        .await;

    let (status, body) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 200, "body: {body}");
    assert_eq!(body["channelTitle"], "Ada Builds");
    assert_eq!(body["channelId"], "UC123");
    assert_eq!(body["subscribers"], "42");
    assert_eq!(body["views"], "1000");
    assert_eq!(body["videoCount"], "7");

    let tokens = svc.tokens();
    assert_eq!(tokens.access_token(), Some("access-token-a2"));
    assert_eq!(tokens.refresh_token(), Some("refresh-token-r1"));
    assert!(!tokens.is_expired_at(now_ms()));

    // Fresh token now; no second refresh.
    let (status, _) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 200);

    svc.shutdown().await;
}

#[tokio::test]
async fn concurrent_fetches_share_one_refresh() {
    let svc = TestService::start().await;
    svc.seed_tokens("access-token-a1", Some("refresh-token-r1"), Some(now_ms() - 1000));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(200))
                .set_body_json(json!({ "access_token": "access-token-a2", "expires_in": 3600 })),
        )
        .expect(1)
        .mount(&svc.provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body()))
        .mount(&svc.provider)
        .await;

    let (a, b, c) = tokio::join!(
        get_json(&svc, "/api/youtube/analytics"),
        get_json(&svc, "/api/youtube/analytics"),
        get_json(&svc, "/api/youtube/analytics"),
    );
    assert_eq!((a.0, b.0, c.0), (200, 200, 200));

    svc.shutdown().await;
}

#[tokio::test]
async fn credential_failures_clear_tokens_and_return_uniform_401() {
    let svc = TestService::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .expect(1)
        .mount(&svc.provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body()))
        .expect(0)
        .mount(&svc.provider)
        .await;

    // Not connected.
    let (status, body) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 401);
    assert_eq!(body["msg"], "Session expired. Please reconnect YouTube.");
    assert_eq!(body["error_code"], "AUTH_EXPIRED");

    // Expired without a refresh token: no network call.
    svc.seed_tokens("access-token-a1", None, Some(now_ms() - 1000));
    let (status, body) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 401);
    assert_eq!(body["error_code"], "AUTH_EXPIRED");
    assert!(!svc.tokens().is_connected());

    // Provider rejects the refresh token.
    svc.seed_tokens("access-token-a1", Some("revoked-refresh"), Some(now_ms() - 1000));
    let (status, body) = get_json(&svc, "/api/youtube/analytics/timeline").await;
    assert_eq!(status, 401);
    assert_eq!(body["msg"], "Session expired. Please reconnect YouTube.");
    let tokens = svc.tokens();
    assert!(!tokens.is_connected());
    assert_eq!(tokens.refresh_token(), None);

    svc.shutdown().await;
}

#[tokio::test]
async fn missing_channel_is_404_and_upstream_errors_keep_tokens() {
    let svc = TestService::start().await;
    svc.seed_tokens("access-token-a1", Some("refresh-token-r1"), None);

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .up_to_n_times(1)
        .mount(&svc.provider)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": { "code": 401 } })))
        .mount(&svc.provider)
        .await;

    let (status, body) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 404);
    assert_eq!(body["error_code"], "UPSTREAM_NOT_FOUND");

    let (status, body) = get_json(&svc, "/api/youtube/analytics").await;
    assert_eq!(status, 500);
    assert_eq!(body["msg"], "Failed to fetch analytics");
    assert!(svc.tokens().is_connected());

    svc.shutdown().await;
}

#[tokio::test]
async fn timeline_validates_range_and_fills_missing_days() {
    let svc = TestService::start().await;
    svc.seed_tokens("access-token-a1", Some("refresh-token-r1"), None);

    let today = chrono::Utc::now().date_naive();
    let yesterday = today - chrono::Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/v2/reports"))
        .and(mock_query("metrics", "views"))
        .and(mock_query("dimensions", "day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [[yesterday.format("%Y-%m-%d").to_string(), 12]]
        })))
        .mount(&svc.provider)
        .await;

    for bad in ["0", "366", "abc"] {
        let (status, body) =
            get_json(&svc, &format!("/api/youtube/analytics/timeline?range={bad}")).await;
        assert_eq!(status, 400, "range={bad}");
        assert_eq!(body["error_code"], "VALIDATION");
    }

    let (status, body) = get_json(&svc, "/api/youtube/analytics/timeline?range=3").await;
    assert_eq!(status, 200, "body: {body}");
    let points = body.as_array().expect("array");
    assert_eq!(points.len(), 3);
    assert_eq!(points[1]["date"], yesterday.format("%Y-%m-%d").to_string());
    assert_eq!(points[1]["views"], 12);
    assert_eq!(points[2]["views"], 0);

    let (status, body) = get_json(&svc, "/api/youtube/analytics/timeline").await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().expect("array").len(), 30);

    svc.shutdown().await;
}

#[tokio::test]
async fn identity_masks_tokens_and_requires_session() {
    let svc = TestService::start().await;
    svc.seed_tokens("ya29.access-token-value", Some("1//refresh-token-value"), Some(123));

    let (status, body) = get_json(&svc, "/api/auth/me").await;
    assert_eq!(status, 200);
    assert_eq!(body["msg"], "You are authenticated");
    assert_eq!(body["user"]["id"], svc.user_id);
    assert_eq!(body["user"]["email"], support::TEST_USER_EMAIL);
    let youtube = &body["user"]["socialTokens"]["youtube"];
    let access = youtube["access_token"].as_str().expect("masked access");
    assert!(access.contains("..."));
    assert_ne!(access, "ya29.access-token-value");
    assert_eq!(youtube["expiry_date"], 123);

    let resp = svc
        .http()
        .get(svc.url("/api/auth/me"))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = serde_json::from_str(&resp.text().await.expect("body")).expect("json");
    assert_eq!(body["error_code"], "UNAUTHENTICATED");

    let resp = svc
        .http()
        .get(svc.url("/api/auth/me"))
        .bearer_auth("not-a-session")
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 401);

    svc.shutdown().await;
}

#[tokio::test]
async fn return_page_relays_code_and_responses_allow_popups() {
    let svc = TestService::start().await;

    let resp = svc
        .http()
        .get(svc.url("/oauth/youtube/return?code=XYZ&state=n.s"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers()
            .get("cross-origin-opener-policy")
            .and_then(|v| v.to_str().ok()),
        Some("same-origin-allow-popups")
    );
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
    let html = resp.text().await.expect("body");
    assert!(html.contains("creator-link:youtube-consent"));
    assert!(html.contains("\"XYZ\""));
    assert!(html.contains("postMessage"));

    let resp = svc.http().get(svc.url("/health")).send().await.expect("send");
    assert_eq!(resp.status().as_u16(), 200);

    svc.shutdown().await;
}
