use anyhow::{Context, Result};
use rig::client::EmbeddingsClient;
use rig::embeddings::{Embedding, EmbeddingModel};
use rig::providers::openai;
use tracing::debug;

/// Texts sent per embedding request.
pub const EMBED_BATCH_SIZE: usize = 256;

/// OpenAI embedding model wrapper. Vectors come back as `f32`, which is
/// what Qdrant stores.
#[derive(Clone)]
pub struct Embedder {
    model: openai::EmbeddingModel<reqwest::Client>,
    model_name: String,
}

impl Embedder {
    pub fn new(client: &openai::Client<reqwest::Client>, model_name: &str) -> Self {
        Self {
            model: client.embedding_model(model_name),
            model_name: model_name.to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embeds a single query string.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = self
            .model
            .embed_text(query)
            .await
            .with_context(|| format!("Failed to embed query with '{}'", self.model_name))?;
        Ok(to_f32(embedding))
    }

    /// Embeds documents in batches of [`EMBED_BATCH_SIZE`], keeping input order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            debug!(batch = i, size = batch.len(), "Embedding batch");
            let embeddings: Vec<Embedding> = self
                .model
                .embed_texts(batch.to_vec())
                .await
                .with_context(|| format!("Failed to embed batch {} of documents", i))?;
            vectors.extend(embeddings.into_iter().map(to_f32));
        }

        Ok(vectors)
    }
}

fn to_f32(embedding: Embedding) -> Vec<f32> {
    embedding.vec.into_iter().map(|v| v as f32).collect()
}
