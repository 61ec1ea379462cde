//! Document question answering.
//!
//! Uploaded documents are cleaned, chunked, embedded and kept in an
//! in-memory [`VectorStore`]. A query retrieves its nearest chunks and the
//! answerer is asked the question with those chunks as context. Nothing is
//! written to disk; a restart starts from an empty index.

pub mod chunking;
pub mod embedding;
pub mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AppConfig;
use crate::llm::Answerer;

pub use chunking::Chunker;
pub use embedding::{Embedder, HashingEmbedder, HttpEmbedder};
pub use store::{ChunkMetadata, Retrieved, VectorStore};

use store::StoredChunk;

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Sequence number assigned to the document.
    pub document_id: u64,
    /// Chunks added to the index.
    pub num_chunks: usize,
}

/// An answer and the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub retrieved: Vec<Retrieved>,
}

/// Chunker, embedder and index behind `/upload` and `/chat`.
pub struct RagPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    top_k: usize,
    next_document: AtomicU64,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("chunker", &self.chunker)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl RagPipeline {
    /// Pipeline retrieving up to `top_k` chunks per query.
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            chunker,
            embedder,
            store: VectorStore::new(),
            top_k,
            next_document: AtomicU64::new(1),
        }
    }

    /// Pipeline configured from the `rag` section. Uses the remote embedding
    /// model when one is configured, the local hashing embedder otherwise.
    ///
    /// # Errors
    ///
    /// Fails on invalid chunk settings.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let chunker = Chunker::new(config.rag.chunk_size, config.rag.chunk_overlap)?;
        let embedder: Arc<dyn Embedder> = match config.embedding_settings() {
            Some(settings) => {
                tracing::info!(name: "rag.embedder.remote", model = %settings.model, "Using remote embedding model");
                Arc::new(HttpEmbedder::new(settings))
            }
            None => Arc::new(HashingEmbedder::new(config.rag.vector_dim)),
        };
        Ok(Self::new(chunker, embedder, config.rag.top_k))
    }

    /// Chunk, embed and index `text` under the name `source`.
    ///
    /// # Errors
    ///
    /// Fails if embedding fails or the embeddings don't fit the index.
    pub async fn ingest(&self, source: &str, text: &str) -> anyhow::Result<IngestReport> {
        let document_id = self.next_document.fetch_add(1, Ordering::Relaxed);
        let chunks = self.chunker.chunk(text);

        if chunks.is_empty() {
            tracing::warn!(name: "rag.ingest.empty", source, "Document has no text");
            return Ok(IngestReport {
                document_id,
                num_chunks: 0,
            });
        }

        let embeddings = self.embedder.embed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let num_chunks = chunks.len();
        let stored = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| StoredChunk {
                id: format!("{document_id}-{chunk_index}"),
                embedding,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index,
                },
                content,
            })
            .collect();
        self.store.add(stored).await?;

        tracing::info!(name: "rag.ingest.completed", source, document_id, num_chunks, "Document ingested");
        Ok(IngestReport {
            document_id,
            num_chunks,
        })
    }

    /// Chunks nearest to `query`. Empty when nothing has been ingested.
    ///
    /// # Errors
    ///
    /// Fails if the query cannot be embedded.
    pub async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<Retrieved>> {
        if self.store.is_empty().await {
            return Ok(Vec::new());
        }
        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))?;
        Ok(self.store.search(&query_embedding, self.top_k).await)
    }

    /// Answer `query`, grounding the question on retrieved chunks when any
    /// exist. With an empty index the question goes to `answerer` as is.
    ///
    /// # Errors
    ///
    /// Fails if retrieval or the answerer fails.
    pub async fn answer(&self, answerer: &dyn Answerer, query: &str) -> anyhow::Result<RagAnswer> {
        let retrieved = self.retrieve(query).await?;
        let context: Vec<&str> = retrieved
            .iter()
            .map(|r| r.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        let answer = if context.is_empty() {
            answerer.answer(query).await?
        } else {
            tracing::debug!(name: "rag.query.context", chunks = context.len(), "Answering with context");
            answerer.answer(&build_prompt(&context, query)).await?
        };

        Ok(RagAnswer { answer, retrieved })
    }

    /// Number of indexed chunks.
    pub async fn chunk_count(&self) -> usize {
        self.store.len().await
    }
}

/// Prompt asking `query` against `context` chunks.
pub fn build_prompt(context: &[&str], query: &str) -> String {
    format!(
        "You are an assistant. Use the following context to answer the question.\n\n\
         Context:\n{}\n\nQuestion: {query}",
        context.join("\n---\n")
    )
}
