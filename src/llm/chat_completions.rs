//! OpenAI Chat Completions API answerer.
//!
//! Sends each query as a single non-streaming completion request and returns
//! the first choice's message content.

use serde_json::{Value, json};

use super::{Answerer, LlmSettings};

/// [`Answerer`] backed by an OpenAI-compatible `/v1/chat/completions` API.
#[derive(Clone)]
pub struct ChatCompletionsAnswerer {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsAnswerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsAnswerer")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsAnswerer {
    /// Create an answerer with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self::with_client(settings, reqwest::Client::new())
    }

    /// Create an answerer using a caller-provided reqwest client.
    #[must_use]
    pub fn with_client(settings: LlmSettings, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    /// The settings this answerer talks to.
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn request_body(&self, query: &str) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = &self.settings.system_prompt {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        messages.push(json!({ "role": "user", "content": query }));

        json!({
            "model": self.settings.model,
            "stream": false,
            "messages": messages,
        })
    }
}

/// Pull `choices[0].message.content` out of a completion response.
fn extract_content(response: &Value) -> anyhow::Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| anyhow::anyhow!("model response had no message content"))
}

#[async_trait::async_trait]
impl Answerer for ChatCompletionsAnswerer {
    async fn answer(&self, query: &str) -> anyhow::Result<String> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let mut rb = self.http.post(&url).json(&self.request_body(query));
        if let Some(key) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", key)
            } else {
                rb.bearer_auth(key)
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("model request failed with status {status}: {body}");
        }

        let v: Value = resp.json().await?;
        let content = extract_content(&v)?;

        tracing::debug!(
            name: "llm.answer.received",
            model = %self.settings.model,
            content_length = content.len(),
            "Model answered"
        );

        Ok(content)
    }
}
