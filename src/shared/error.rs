//! Usage: Unified application error model (maps internal failures to `CODE: message` strings).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

pub const CODE_NOT_CONNECTED: &str = "NOT_CONNECTED";
pub const CODE_NO_REFRESH_TOKEN: &str = "NO_REFRESH_TOKEN";
pub const CODE_REFRESH_FAILED: &str = "REFRESH_FAILED";
pub const CODE_VALIDATION: &str = "VALIDATION";
pub const CODE_UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
pub const CODE_UPSTREAM_NOT_FOUND: &str = "UPSTREAM_NOT_FOUND";
pub const CODE_UNAUTHENTICATED: &str = "UNAUTHENTICATED";
pub const CODE_AUTH_EXPIRED: &str = "AUTH_EXPIRED";
pub const CODE_DB_ERROR: &str = "DB_ERROR";
pub const CODE_DB_NOT_FOUND: &str = "DB_NOT_FOUND";
pub const CODE_SYSTEM_ERROR: &str = "SYSTEM_ERROR";

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Classifies the error as one of the delegated-credential lifecycle failures.
    pub fn credential_failure(&self) -> Option<CredentialFailure> {
        CredentialFailure::parse(&self.code)
    }
}

/// Failure kinds of the refresh guard. All three are resolved the same way: the stored
/// token set is cleared and the user has to grant consent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    NotConnected,
    NoRefreshToken,
    RefreshFailed,
}

impl CredentialFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConnected => CODE_NOT_CONNECTED,
            Self::NoRefreshToken => CODE_NO_REFRESH_TOKEN,
            Self::RefreshFailed => CODE_REFRESH_FAILED,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            CODE_NOT_CONNECTED => Some(Self::NotConnected),
            CODE_NO_REFRESH_TOKEN => Some(Self::NoRefreshToken),
            CODE_REFRESH_FAILED => Some(Self::RefreshFailed),
            _ => None,
        }
    }

    pub fn into_error(self, message: impl Into<String>) -> AppError {
        AppError::new(self.as_str(), message)
    }
}

macro_rules! db_err {
    ($($arg:tt)*) => {
        $crate::shared::error::AppError::new(
            $crate::shared::error::CODE_DB_ERROR,
            format!($($arg)*),
        )
    };
}
pub(crate) use db_err;

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::new(CODE_SYSTEM_ERROR, value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_with_code_prefix_is_split() {
        let err = AppError::from("VALIDATION: code is required".to_string());
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(err.message(), "code is required");
        assert_eq!(err.to_string(), "VALIDATION: code is required");
    }

    #[test]
    fn string_without_code_becomes_system_error() {
        let err = AppError::from("something broke: badly".to_string());
        assert_eq!(err.code(), CODE_SYSTEM_ERROR);
        assert_eq!(err.message(), "something broke: badly");
    }

    #[test]
    fn credential_failures_round_trip_through_codes() {
        for kind in [
            CredentialFailure::NotConnected,
            CredentialFailure::NoRefreshToken,
            CredentialFailure::RefreshFailed,
        ] {
            let err = kind.into_error("boom");
            assert_eq!(err.credential_failure(), Some(kind));
        }
        assert_eq!(
            AppError::new(CODE_UPSTREAM_ERROR, "x").credential_failure(),
            None
        );
    }
}
