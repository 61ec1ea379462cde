//! DocChat
//!
//! A chat form wired to a question-answering endpoint: each submission shows
//! the user's message, relays it to `POST /chat`, and shows the reply.
//!
//! # Architecture
//!
//! - **Client**: [`client::ChatFormController`] binds a form surface to an
//!   HTTP transport and renders bubbles as turns complete
//! - **Server**: Axum router serving the chat page and the `/chat` endpoint
//! - **Answers**: OpenAI-compatible Chat Completions (Ollama included),
//!   grounded on chunks of uploaded documents
//!
//! # Modules
//!
//! - [`bubble`]: Message bubble model
//! - [`client`]: Controller, surfaces and transport
//! - [`llm`]: Answer sources for the server
//! - [`rag`]: Document chunking, embedding and retrieval
//! - [`server`]: HTTP routes and middleware
//! - [`page`]: Server-rendered HTML

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod bubble;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod page;
pub mod rag;
pub mod server;
pub mod telemetry;

use crate::config::AppConfig;

use llm::Answerer;
use rag::RagPipeline;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Produces the answer for each query.
    pub answerer: Arc<dyn Answerer>,
    /// Uploaded documents and retrieval.
    pub rag: Arc<RagPipeline>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// State with an empty document index built from `config`.
    ///
    /// # Errors
    ///
    /// Fails on invalid `rag` settings.
    pub fn new(answerer: Arc<dyn Answerer>, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let rag = Arc::new(RagPipeline::from_config(&config)?);
        Ok(Self {
            answerer,
            rag,
            config,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("rag", &self.rag)
            .field("config", &self.config)
            .finish()
    }
}
