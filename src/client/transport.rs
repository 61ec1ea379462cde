//! The network half of a chat turn.
//!
//! A turn is one `POST /chat` with a form-encoded `query` parameter, answered
//! by a JSON object whose `answer` field becomes the bot bubble.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::error::{ClientError, Result};

/// Path of the chat endpoint, resolved against the base URL.
pub const CHAT_PATH: &str = "/chat";

/// Longest slice of an error body kept in [`ClientError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Sends a query and returns the server's answer.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Perform one request/response exchange.
    async fn ask(&self, query: &str) -> Result<Answer>;
}

/// Text extracted from a response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Text to render in the bot bubble.
    pub text: String,
}

impl Answer {
    /// Wrap already-extracted text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Extract the `answer` field from a decoded payload.
    ///
    /// The value is rendered the way a page would stringify it: a missing
    /// field becomes `undefined`, `null` becomes empty text, and non-string
    /// values get their display form.
    #[must_use]
    pub fn from_json(payload: &Value) -> Self {
        let text = match payload.get("answer") {
            Some(value) => display_text(value),
            None => "undefined".to_string(),
        };
        Self { text }
    }

    /// Decode a raw response.
    ///
    /// The body is parsed as JSON whatever the status is. Only when that
    /// fails does the status decide between [`ClientError::Decode`] and
    /// [`ClientError::Status`].
    pub fn from_body(status: StatusCode, body: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => Ok(Self::from_json(&payload)),
            Err(e) if status.is_success() => Err(ClientError::Decode(e)),
            Err(_) => Err(ClientError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            }),
        }
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), number_text),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// A number as a page prints it: every JSON number is a double, shown in
/// plain decimal for magnitudes in `[1e-6, 1e21)` and in exponent form
/// (`1e+21`, `1.5e-7`) otherwise.
fn number_text(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return f.to_string();
    }
    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

/// [`ChatTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Transport posting to `<base_url>/chat`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Transport whose requests give up after `timeout`.
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, http)
    }

    /// Transport using a caller-provided reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let endpoint = Url::parse(base_url.as_ref())?.join(CHAT_PATH)?;
        Ok(Self { endpoint, http })
    }

    /// Fully resolved chat endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn ask(&self, query: &str) -> Result<Answer> {
        tracing::debug!(name: "chat.request.sent", endpoint = %self.endpoint, "Sending chat query");

        let response = self
            .http
            .post(self.endpoint.clone())
            .form(&[("query", query)])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        Answer::from_body(status, &body)
    }
}
