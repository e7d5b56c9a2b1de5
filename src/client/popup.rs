//! Usage: Popup window seam for the consent flow (the host supplies a browser-backed impl).

use reqwest::Url;

/// Reading another origin's location fails until the popup is back on our origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("popup location is cross-origin")]
pub struct CrossOrigin;

pub trait PopupWindow: Send {
    fn is_closed(&self) -> bool;

    fn read_location(&self) -> Result<Url, CrossOrigin>;

    /// Must be idempotent; closing an already closed popup is a no-op.
    fn close(&mut self);
}

pub trait PopupLauncher: Send + Sync {
    /// `None` when the popup could not be created (e.g. blocked).
    fn open(&self, url: &str) -> Option<Box<dyn PopupWindow>>;
}

/// `code` / `state` read from a popup location's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedCode {
    pub code: String,
    pub state: Option<String>,
}

pub fn returned_code(url: &Url) -> Option<ReturnedCode> {
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.trim().is_empty() => code = Some(value.trim().to_string()),
            "state" if !value.trim().is_empty() => state = Some(value.trim().to_string()),
            _ => {}
        }
    }
    code.map(|code| ReturnedCode { code, state })
}
