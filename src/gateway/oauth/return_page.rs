//! Usage: Same-origin return page for the consent redirect. Posts the authorization code to
//! the opener window and closes itself.

use serde::{Deserialize, Serialize};

pub const RETURN_MESSAGE_TYPE: &str = "creator-link:youtube-consent";

/// Query string the provider appends to the redirect URI.
#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct ReturnQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl From<ReturnQuery> for ReturnMessage {
    fn from(query: ReturnQuery) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            kind: RETURN_MESSAGE_TYPE.to_string(),
            code: clean(query.code),
            state: clean(query.state),
            error: clean(query.error),
        }
    }
}

/// JSON safe for embedding inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

pub(crate) fn render(query: ReturnQuery, target_origin: &str) -> String {
    let message = ReturnMessage::from(query);
    let status = if message.code.is_some() {
        "Connecting your YouTube account..."
    } else {
        "YouTube connection was not completed. You can close this window."
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>YouTube</title></head>
<body>
<p>{status}</p>
<script>
(function () {{
  var message = {message};
  var targetOrigin = {origin};
  try {{
    if (window.opener && !window.opener.closed) {{
      window.opener.postMessage(message, targetOrigin);
    }}
  }} finally {{
    window.close();
  }}
}})();
</script>
</body>
</html>
"#,
        status = status,
        message = script_json(&message),
        origin = script_json(&target_origin.trim_end_matches('/')),
    )
}
