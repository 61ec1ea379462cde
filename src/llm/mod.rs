//! Answer sources for the `/chat` endpoint.
//!
//! The server hands every non-empty query to an [`Answerer`]. The production
//! implementation is [`ChatCompletionsAnswerer`], which relays the query to
//! any OpenAI-compatible Chat Completions API (`OpenAI`, Azure, `OpenRouter`,
//! Groq, a local Ollama, ...).
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat::llm::{Answerer, ChatCompletionsAnswerer, LlmSettings, Provider};
//!
//! let settings = LlmSettings::new("http://localhost:11434", "llama2");
//! let answerer = ChatCompletionsAnswerer::new(settings);
//! let answer = answerer.answer("What is in my documents?").await?;
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsAnswerer;
pub use provider::Provider;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`, `llama2`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Optional system prompt sent ahead of every query.
    pub system_prompt: Option<String>,
}

impl LlmSettings {
    /// Settings for `model` at `base_url`, provider detected from the URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            provider: Provider::detect_from_url(&base_url),
            base_url,
            api_key: None,
            model: model.into(),
            system_prompt: None,
        }
    }
}

/// Produces the answer text for a query.
#[async_trait::async_trait]
pub trait Answerer: Send + Sync {
    /// Answer one query.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer could be produced; the server reports
    /// it to the user inside the `answer` field.
    async fn answer(&self, query: &str) -> anyhow::Result<String>;
}

/// Answerer used when no model is configured. Every query fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAnswerer;

#[async_trait::async_trait]
impl Answerer for UnconfiguredAnswerer {
    async fn answer(&self, _query: &str) -> anyhow::Result<String> {
        anyhow::bail!("no language model configured")
    }
}
