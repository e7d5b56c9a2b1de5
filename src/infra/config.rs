//! Usage: Service configuration (TOML file + environment overrides + validation).

use crate::shared::error::{AppError, AppResult};
use crate::shared::security::random_token;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "CREATOR_LINK_CONFIG";
const DEFAULT_CONFIG_FILE_NAME: &str = "creator-link.toml";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:5000";
const DEFAULT_DB_FILE_NAME: &str = "creator-link.db";
const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FILE_PREFIX: &str = "creator-link.log";
const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_HTTP_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const MIN_SESSION_SECRET_LEN: usize = 16;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const YOUTUBE_DATA_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const YOUTUBE_ANALYTICS_API_URL: &str = "https://youtubeanalytics.googleapis.com/v2";
pub const SCOPE_YOUTUBE_READONLY: &str = "https://www.googleapis.com/auth/youtube.readonly";
pub const SCOPE_YT_ANALYTICS_READONLY: &str =
    "https://www.googleapis.com/auth/yt-analytics.readonly";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Enables daily-rolling file output when set.
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the browser after consent. Normally this service's
    /// `/oauth/youtube/return` page or the frontend origin.
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub data_api_url: String,
    pub analytics_api_url: String,
    pub scopes: Vec<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            data_api_url: YOUTUBE_DATA_API_URL.to_string(),
            analytics_api_url: YOUTUBE_ANALYTICS_API_URL.to_string(),
            scopes: vec![
                SCOPE_YOUTUBE_READONLY.to_string(),
                SCOPE_YT_ANALYTICS_READONLY.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub listen_address: String,
    pub database_path: PathBuf,
    pub frontend_origin: String,
    /// Key for signing consent `state` values. Generated per process when empty.
    pub session_secret: String,
    pub session_ttl_secs: i64,
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub log: LogConfig,
    pub youtube: YouTubeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            database_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            frontend_origin: DEFAULT_FRONTEND_ORIGIN.to_string(),
            session_secret: String::new(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            http_connect_timeout_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
            http_request_timeout_secs: DEFAULT_HTTP_REQUEST_TIMEOUT_SECS,
            log: LogConfig::default(),
            youtube: YouTubeConfig::default(),
        }
    }
}

fn config_err(message: impl Into<String>) -> AppError {
    AppError::new("CONFIG_INVALID", message)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_u64_trimmed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn parse_i64_trimmed(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Replaces the port of a `host:port` / `[v6]:port` / `host` listen address.
fn with_port(listen_address: &str, port: u16) -> String {
    let raw = listen_address.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or("127.0.0.1").to_string()
    } else {
        raw.split(':').next().unwrap_or("127.0.0.1").to_string()
    };
    let host = if host.is_empty() {
        "127.0.0.1".to_string()
    } else {
        host
    };
    crate::gateway::listen::format_host_port(&host, port)
}

impl AppConfig {
    /// Reads the optional TOML file, applies environment overrides and validates.
    pub fn load() -> AppResult<Self> {
        let explicit = non_empty(env::var(CONFIG_PATH_ENV).ok()).map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME));

        let mut config = if path.exists() {
            Self::from_toml_file(&path)?
        } else if explicit.is_some() {
            return Err(config_err(format!(
                "config file not found: {}",
                path.display()
            )));
        } else {
            Self::default()
        };

        config.apply_env_get(|key| env::var(key).ok());
        config.finalize()
    }

    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| config_err(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> AppResult<Self> {
        toml::from_str(raw).map_err(|e| config_err(format!("invalid config toml: {e}")))
    }

    /// Environment overrides; the getter is injectable so parsing stays testable.
    pub fn apply_env_get(&mut self, mut get: impl FnMut(&str) -> Option<String>) {
        if let Some(v) = non_empty(get("CREATOR_LINK_LISTEN")) {
            self.listen_address = v;
        }
        if let Some(port) = get("PORT")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .and_then(|v| u16::try_from(v).ok())
        {
            self.listen_address = with_port(&self.listen_address, port);
        }
        if let Some(v) = non_empty(get("CREATOR_LINK_DB_PATH")) {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(get("CREATOR_LINK_FRONTEND_ORIGIN")) {
            self.frontend_origin = v;
        }
        if let Some(v) = non_empty(get("CREATOR_LINK_SESSION_SECRET")) {
            self.session_secret = v;
        }
        if let Some(v) = get("CREATOR_LINK_SESSION_TTL_SECS")
            .as_deref()
            .and_then(parse_i64_trimmed)
            .filter(|v| *v > 0)
        {
            self.session_ttl_secs = v;
        }
        if let Some(v) = get("CREATOR_LINK_HTTP_CONNECT_TIMEOUT_SECS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
        {
            self.http_connect_timeout_secs = v;
        }
        if let Some(v) = get("CREATOR_LINK_HTTP_REQUEST_TIMEOUT_SECS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
        {
            self.http_request_timeout_secs = v;
        }
        if let Some(v) = non_empty(get("CREATOR_LINK_LOG_LEVEL")) {
            self.log.level = v;
        }
        if let Some(v) = non_empty(get("CREATOR_LINK_LOG_DIR")) {
            self.log.dir = Some(PathBuf::from(v));
        }

        if let Some(v) = non_empty(get("YOUTUBE_CLIENT_ID")) {
            self.youtube.client_id = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_CLIENT_SECRET")) {
            self.youtube.client_secret = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_REDIRECT_URI")) {
            self.youtube.redirect_uri = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_AUTH_URL")) {
            self.youtube.auth_url = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_TOKEN_URL")) {
            self.youtube.token_url = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_DATA_API_URL")) {
            self.youtube.data_api_url = v;
        }
        if let Some(v) = non_empty(get("YOUTUBE_ANALYTICS_API_URL")) {
            self.youtube.analytics_api_url = v;
        }
    }

    /// Validates and fills generated defaults.
    pub fn finalize(mut self) -> AppResult<Self> {
        self.validate()?;
        if self.session_secret.trim().is_empty() {
            tracing::warn!(
                "session_secret not configured; consent state values will not survive a restart"
            );
            self.session_secret = random_token(32);
        }
        Ok(self)
    }

    pub fn validate(&self) -> AppResult<()> {
        crate::gateway::listen::parse_listen_address(&self.listen_address)
            .map_err(|e| config_err(format!("listen_address: {e}")))?;

        if self.database_path.as_os_str().is_empty() {
            return Err(config_err("database_path is required"));
        }

        reqwest::Url::parse(self.frontend_origin.trim())
            .map_err(|e| config_err(format!("frontend_origin is not a valid url: {e}")))?;

        let secret = self.session_secret.trim();
        if !secret.is_empty() && secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(config_err(format!(
                "session_secret must be at least {MIN_SESSION_SECRET_LEN} chars"
            )));
        }
        if self.session_ttl_secs <= 0 {
            return Err(config_err("session_ttl_secs must be > 0"));
        }

        for (name, value) in [
            ("http_connect_timeout_secs", self.http_connect_timeout_secs),
            ("http_request_timeout_secs", self.http_request_timeout_secs),
        ] {
            if value == 0 || value > MAX_HTTP_TIMEOUT_SECS {
                return Err(config_err(format!(
                    "{name} must be within [1, {MAX_HTTP_TIMEOUT_SECS}]"
                )));
            }
        }

        let yt = &self.youtube;
        if yt.client_id.trim().is_empty() {
            return Err(config_err("youtube.client_id (YOUTUBE_CLIENT_ID) is required"));
        }
        if yt.client_secret.trim().is_empty() {
            return Err(config_err(
                "youtube.client_secret (YOUTUBE_CLIENT_SECRET) is required",
            ));
        }
        for (name, value) in [
            ("youtube.redirect_uri", &yt.redirect_uri),
            ("youtube.auth_url", &yt.auth_url),
            ("youtube.token_url", &yt.token_url),
            ("youtube.data_api_url", &yt.data_api_url),
            ("youtube.analytics_api_url", &yt.analytics_api_url),
        ] {
            reqwest::Url::parse(value.trim())
                .map_err(|e| config_err(format!("{name} is not a valid url: {e}")))?;
        }
        if yt.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(config_err("youtube.scopes must not be empty"));
        }

        Ok(())
    }
}
