use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PayloadIncludeSelector, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::document::{Chunk, ScoredChunk};
use crate::embeddings::{Embedder, EMBED_BATCH_SIZE};
use crate::sources::{ScrollPage, SourceScroll};

/// Embedded once to learn the vector size when the collection is created.
const DIMENSION_SAMPLE: &str = "qdrant-collection-dimension-probe";

/// Payload path read when scanning for sources.
const SOURCE_FIELD: &str = "metadata.source";

/// A Qdrant collection of chunks plus the embedder that fills it.
pub struct VectorDb {
    client: Qdrant,
    collection: String,
    embedder: Embedder,
}

impl VectorDb {
    /// Connects to Qdrant and makes sure the configured collection exists.
    pub async fn connect(settings: &Settings, embedder: Embedder) -> Result<Self> {
        let client = Qdrant::from_url(&settings.qdrant_url)
            .api_key(settings.qdrant_api_key.clone())
            .build()
            .context("Failed to connect to Qdrant")?;

        let db = Self {
            client,
            collection: settings.collection.clone(),
            embedder,
        };
        db.ensure_collection().await?;
        Ok(db)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Creates the collection if missing, sized by embedding a fixed sample string.
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .with_context(|| format!("Failed to look up collection '{}'", self.collection))?;

        if exists {
            debug!(collection = %self.collection, "Collection already exists");
            return Ok(());
        }

        let sample = self.embedder.embed_query(DIMENSION_SAMPLE).await?;
        if sample.is_empty() {
            bail!(
                "Embedding model '{}' returned an empty vector; cannot size collection '{}'",
                self.embedder.model_name(),
                self.collection
            );
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(sample.len() as u64, Distance::Cosine)),
            )
            .await
            .with_context(|| format!("Failed to create collection '{}'", self.collection))?;

        info!(
            "Created collection '{}' (dim={})",
            self.collection,
            sample.len()
        );
        Ok(())
    }

    /// Embeds and stores chunks, returning how many were written.
    ///
    /// Every chunk must name its source; nothing is written otherwise.
    pub async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if let Some(pos) = chunks.iter().position(|c| c.source().is_empty()) {
            bail!("Chunk {} has no metadata.source; refusing to store it", pos);
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "Embedding returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let points = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| -> Result<PointStruct> {
                let payload = Payload::try_from(serde_json::to_value(chunk)?)?;
                Ok(PointStruct::new(Uuid::new_v4().to_string(), vector, payload))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        let count = points.len();
        for (i, batch) in into_batches(points, EMBED_BATCH_SIZE).into_iter().enumerate() {
            debug!(batch = i, size = batch.len(), "Upserting points");
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, batch).wait(true))
                .await
                .with_context(|| format!("Failed to upsert batch {} into Qdrant", i))?;
        }

        Ok(count)
    }

    /// Top-`k` chunks for `query`, most similar first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let hits = self.similarity_search_with_score(query, k).await?;
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }

    /// Like [`similarity_search`](Self::similarity_search) but keeps the
    /// cosine score of each hit.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_query(query).await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, k as u64).with_payload(true),
            )
            .await
            .context("Failed to search Qdrant")?;

        response
            .result
            .into_iter()
            .map(|point| -> Result<ScoredChunk> {
                let chunk = chunk_from_payload(point.payload)?;
                Ok(ScoredChunk {
                    chunk,
                    score: point.score,
                })
            })
            .collect()
    }

    /// A fixed-`k` view of this store for the two-step flow.
    pub fn as_retriever(&self, k: usize) -> Retriever<'_> {
        Retriever { db: self, k }
    }
}

/// Retrieves a fixed number of chunks per query.
#[derive(Clone, Copy)]
pub struct Retriever<'a> {
    db: &'a VectorDb,
    k: usize,
}

impl Retriever<'_> {
    pub fn k(&self) -> usize {
        self.k
    }

    pub async fn invoke(&self, query: &str) -> Result<Vec<Chunk>> {
        self.db.similarity_search(query, self.k).await
    }
}

impl SourceScroll for VectorDb {
    type Cursor = PointId;

    async fn scroll_sources(
        &self,
        cursor: Option<PointId>,
        limit: u32,
    ) -> Result<ScrollPage<PointId>> {
        let mut request = ScrollPointsBuilder::new(&self.collection)
            .limit(limit)
            .with_payload(PayloadIncludeSelector::new(vec![SOURCE_FIELD.to_string()]))
            .with_vectors(false);
        if let Some(offset) = cursor {
            request = request.offset(offset);
        }

        let response = self
            .client
            .scroll(request)
            .await
            .with_context(|| format!("Failed to scroll collection '{}'", self.collection))?;

        let sources = response
            .result
            .into_iter()
            .map(|point| source_from_payload(point.payload))
            .collect();

        Ok(ScrollPage {
            sources,
            next: response.next_page_offset,
        })
    }
}

/// Splits `items` into consecutive runs of at most `size`, keeping order.
fn into_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn payload_to_json(payload: HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, value.into_json()))
            .collect(),
    )
}

fn chunk_from_payload(payload: HashMap<String, Value>) -> Result<Chunk> {
    serde_json::from_value(payload_to_json(payload))
        .context("Stored point has an unexpected payload layout")
}

fn source_from_payload(payload: HashMap<String, Value>) -> Option<String> {
    payload_to_json(payload)
        .pointer("/metadata/source")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offline_db() -> VectorDb {
        let settings = Settings::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        let client = crate::llm::create_client(&settings).unwrap();
        VectorDb {
            client: Qdrant::from_url(&settings.qdrant_url)
                .skip_compatibility_check()
                .build()
                .unwrap(),
            collection: settings.collection.clone(),
            embedder: Embedder::new(&client, &settings.embedding_model),
        }
    }

    #[tokio::test]
    async fn test_chunk_without_source_is_rejected() {
        let db = offline_db();
        let chunks = vec![Chunk::new("fine", "a.pdf", 1), Chunk::new("x", "", 1)];

        let err = db.add_chunks(&chunks).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Chunk 1 has no metadata.source; refusing to store it"
        );
    }

    #[tokio::test]
    async fn test_no_chunks_is_a_no_op() {
        assert_eq!(offline_db().add_chunks(&[]).await.unwrap(), 0);
    }

    #[test]
    fn test_into_batches() {
        let batches = into_batches((0..7).collect::<Vec<u32>>(), 3);
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);

        let exact = into_batches((0..6).collect::<Vec<u32>>(), 3);
        assert_eq!(exact.len(), 2);

        assert!(into_batches(Vec::<u32>::new(), 3).is_empty());
    }

    #[test]
    fn test_upsert_batches_cover_every_point() {
        let n = EMBED_BATCH_SIZE * 2 + 5;
        let batches = into_batches((0..n).collect::<Vec<usize>>(), EMBED_BATCH_SIZE);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= EMBED_BATCH_SIZE));
        assert_eq!(batches.concat(), (0..n).collect::<Vec<_>>());
    }

    fn qdrant_payload(value: serde_json::Value) -> HashMap<String, Value> {
        Payload::try_from(value).unwrap().into()
    }

    #[test]
    fn test_chunk_round_trips_through_payload() {
        let chunk = Chunk::new("Rust has no garbage collector.", "docs/rust.pdf", 4);
        let payload = qdrant_payload(serde_json::to_value(&chunk).unwrap());
        assert_eq!(chunk_from_payload(payload).unwrap(), chunk);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let payload = qdrant_payload(json!({"text": "legacy layout"}));
        assert!(chunk_from_payload(payload).is_err());
    }

    #[test]
    fn test_source_from_partial_payload() {
        let payload = qdrant_payload(json!({"metadata": {"source": "a.pdf"}}));
        assert_eq!(source_from_payload(payload), Some("a.pdf".to_string()));

        let payload = qdrant_payload(json!({"metadata": {"page": 1}}));
        assert_eq!(source_from_payload(payload), None);
    }
}
