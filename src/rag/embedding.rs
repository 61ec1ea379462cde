//! Text embedders for document retrieval.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::{Value, json};

use crate::llm::LlmSettings;

/// Turns texts into vectors. All vectors from one embedder share a length.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, one vector per text, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding backend fails.
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Local bag-of-words embedder: lowercased alphanumeric terms hashed into a
/// fixed number of buckets, then L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    /// Embedder producing `dim`-length vectors (at least 1).
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Vector length.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dim];
        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            term.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dim as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait::async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` API.
#[derive(Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl HttpEmbedder {
    /// Embedder calling the embeddings endpoint described by `settings`;
    /// `settings.model` names the embedding model.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

/// Pull `data[*].embedding` out of an embeddings response, ordered by `index`.
fn extract_embeddings(response: &Value, expected: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = response["data"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("embedding response had no data"))?;

    let mut rows = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item["index"]
                .as_u64()
                .map_or(pos, |i| usize::try_from(i).unwrap_or(pos));
            let vector = item["embedding"]
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("embedding {pos} is not an array"))?
                .iter()
                .map(|x| x.as_f64().map(|x| x as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| anyhow::anyhow!("embedding {pos} has a non-numeric value"))?;
            Ok((index, vector))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if rows.len() != expected {
        anyhow::bail!("expected {expected} embeddings, got {}", rows.len());
    }
    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self
            .settings
            .provider
            .build_embeddings_url(&self.settings.base_url);
        let body = json!({ "model": self.settings.model, "input": texts });

        let mut rb = self.http.post(&url).json(&body);
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
            anyhow::bail!("embedding request failed with status {status}: {body}");
        }

        let v: Value = resp.json().await?;
        extract_embeddings(&v, texts.len())
    }
}
