use serde::{Deserialize, Serialize};

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the document the chunk was extracted from.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
}

/// A span of extracted document text plus its provenance.
///
/// Serializes to the payload layout stored in Qdrant:
/// `{"page_content": "...", "metadata": {"source": "...", "page": 1}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub page_content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                page,
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn page(&self) -> u32 {
        self.metadata.page
    }
}

/// A retrieved chunk and its similarity score (cosine, higher is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Joins chunk texts with blank lines, the format used for model context.
pub fn format_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_layout() {
        let chunk = Chunk::new("hello", "docs/a.pdf", 3);
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            value,
            json!({
                "page_content": "hello",
                "metadata": { "source": "docs/a.pdf", "page": 3 }
            })
        );

        let back: Chunk = serde_json::from_value(value).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_format_chunks() {
        let chunks = vec![Chunk::new("one", "a.pdf", 1), Chunk::new("two", "a.pdf", 2)];
        assert_eq!(format_chunks(&chunks), "one\n\ntwo");
        assert_eq!(format_chunks(&[]), "");
    }
}
