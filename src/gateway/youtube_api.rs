//! Usage: YouTube Data / Analytics API reads performed with an authorized client.

use crate::gateway::oauth::refresh::AuthorizedClient;
use crate::gateway::oauth::token_exchange::sanitize_oauth_error_body_snippet;
use crate::shared::error::{AppError, AppResult, CODE_UPSTREAM_NOT_FOUND};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub(crate) const MIN_TIMELINE_DAYS: u32 = 1;
pub(crate) const MAX_TIMELINE_DAYS: u32 = 365;
pub(crate) const DEFAULT_TIMELINE_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelStats {
    pub channel_title: String,
    pub channel_id: String,
    /// `None` when the channel hides its subscriber count.
    pub subscribers: Option<String>,
    pub views: Option<String>,
    pub video_count: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct TimelinePoint {
    pub date: String,
    pub views: i64,
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Counts arrive as JSON strings; numbers are accepted too.
fn count_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn get_json(request: reqwest::RequestBuilder, what: &str) -> AppResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| format!("UPSTREAM_ERROR: {what} request failed: {e}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("UPSTREAM_ERROR: {what} response read failed: {e}"))?;

    if !status.is_success() {
        let snippet = sanitize_oauth_error_body_snippet(&body);
        tracing::warn!(
            status = status.as_u16(),
            body = %snippet,
            "{what} request rejected"
        );
        return Err(format!(
            "UPSTREAM_ERROR: {what} returned status={}",
            status.as_u16()
        )
        .into());
    }

    serde_json::from_str(&body)
        .map_err(|e| format!("UPSTREAM_ERROR: {what} response json invalid: {e}").into())
}

pub(crate) async fn fetch_channel_stats(
    client: &AuthorizedClient,
    data_api_url: &str,
) -> AppResult<ChannelStats> {
    let url = format!("{}/channels", trim_base(data_api_url));
    let value = get_json(
        client
            .get(&url)
            .query(&[("part", "snippet,statistics"), ("mine", "true")]),
        "youtube channels",
    )
    .await?;
    parse_channel_stats(&value)
}

fn parse_channel_stats(value: &Value) -> AppResult<ChannelStats> {
    let channel = value
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .ok_or_else(|| AppError::new(CODE_UPSTREAM_NOT_FOUND, "No YouTube channel data found"))?;

    let snippet = channel.get("snippet");
    let stats = channel.get("statistics");
    Ok(ChannelStats {
        channel_title: snippet
            .and_then(|s| s.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        channel_id: channel
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        subscribers: count_text(stats.and_then(|s| s.get("subscriberCount"))),
        views: count_text(stats.and_then(|s| s.get("viewCount"))),
        video_count: count_text(stats.and_then(|s| s.get("videoCount"))),
    })
}

/// Daily views for the `range_days` days ending at `end` (inclusive). Days the report
/// omits are returned with zero views so the series is always contiguous.
pub(crate) async fn fetch_views_timeline(
    client: &AuthorizedClient,
    analytics_api_url: &str,
    end: NaiveDate,
    range_days: u32,
) -> AppResult<Vec<TimelinePoint>> {
    let range_days = range_days.clamp(MIN_TIMELINE_DAYS, MAX_TIMELINE_DAYS);
    let start = end - Duration::days(i64::from(range_days) - 1);
    let url = format!("{}/reports", trim_base(analytics_api_url));
    let start_text = start.format("%Y-%m-%d").to_string();
    let end_text = end.format("%Y-%m-%d").to_string();

    let value = get_json(
        client.get(&url).query(&[
            ("ids", "channel==MINE"),
            ("startDate", start_text.as_str()),
            ("endDate", end_text.as_str()),
            ("metrics", "views"),
            ("dimensions", "day"),
            ("sort", "day"),
        ]),
        "youtube analytics report",
    )
    .await?;

    Ok(fill_timeline(&value, start, range_days))
}

fn fill_timeline(report: &Value, start: NaiveDate, range_days: u32) -> Vec<TimelinePoint> {
    let by_day: HashMap<String, i64> = report
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let day = row.get(0)?.as_str()?.to_string();
                    let views = row.get(1).and_then(|v| {
                        v.as_i64()
                            .or_else(|| v.as_f64().map(|f| f as i64))
                            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                    })?;
                    Some((day, views))
                })
                .collect()
        })
        .unwrap_or_default();

    (0..i64::from(range_days))
        .map(|offset| {
            let date = (start + Duration::days(offset))
                .format("%Y-%m-%d")
                .to_string();
            let views = by_day.get(&date).copied().unwrap_or(0);
            TimelinePoint { date, views }
        })
        .collect()
}
