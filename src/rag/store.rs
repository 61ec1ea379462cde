//! In-memory vector index with exact L2 search.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Uploaded file name.
    pub source: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

/// One indexed chunk.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub content: String,
}

/// A search hit. `distance` is the squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieved {
    pub id: String,
    pub distance: f32,
    pub metadata: ChunkMetadata,
    pub content: String,
}

/// Flat index: every search compares the query against every chunk.
#[derive(Debug, Default)]
pub struct VectorStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add chunks. Every embedding must have the length of those already
    /// stored.
    ///
    /// # Errors
    ///
    /// Fails without storing anything on a length mismatch.
    pub async fn add(&self, new_chunks: Vec<StoredChunk>) -> anyhow::Result<()> {
        let mut chunks = self.chunks.write().await;
        let dim = chunks
            .first()
            .or_else(|| new_chunks.first())
            .map(|c| c.embedding.len());

        if let Some(dim) = dim {
            if let Some(bad) = new_chunks.iter().find(|c| c.embedding.len() != dim) {
                anyhow::bail!(
                    "embedding for {} has {} dimensions, index has {dim}",
                    bad.id,
                    bad.embedding.len()
                );
            }
        }

        chunks.extend(new_chunks);
        Ok(())
    }

    /// The `top_k` chunks closest to `query`, nearest first.
    pub async fn search(&self, query: &[f32], top_k: usize) -> Vec<Retrieved> {
        let chunks = self.chunks.read().await;

        let mut hits: Vec<(f32, &StoredChunk)> = chunks
            .iter()
            .filter(|c| c.embedding.len() == query.len())
            .map(|c| (squared_l2(query, &c.embedding), c))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));

        hits.into_iter()
            .take(top_k)
            .map(|(distance, c)| Retrieved {
                id: c.id.clone(),
                distance,
                metadata: c.metadata.clone(),
                content: c.content.clone(),
            })
            .collect()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
