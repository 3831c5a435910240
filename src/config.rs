use anyhow::{bail, Result};
use tracing::warn;

use crate::ingestion::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-5-nano";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_AGENT_MAX_TURNS: usize = 5;

/// Runtime settings, read from the environment (and `.env`, loaded by `main`).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Qdrant collection holding the chunks (`QDRANT_COLLECTION`).
    pub collection: String,
    /// OpenAI embedding model (`OPENAI_EMBEDDING_MODEL`).
    pub embedding_model: String,
    /// OpenAI chat model (`OPENAI_CHAT_MODEL`).
    pub chat_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    /// Qdrant gRPC endpoint (`QDRANT_URL`).
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tool round-trips the agent may make per prompt (`AGENT_MAX_TURNS`).
    pub agent_max_turns: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let usize_or = |key: &str, default: usize| match get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid {}={:?}; using {}", key, raw, default);
                default
            }),
            None => default,
        };

        let settings = Settings {
            collection: string_or("QDRANT_COLLECTION", DEFAULT_COLLECTION),
            embedding_model: string_or("OPENAI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            chat_model: string_or("OPENAI_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            qdrant_url: string_or("QDRANT_URL", DEFAULT_QDRANT_URL),
            qdrant_api_key: get("QDRANT_API_KEY"),
            chunk_size: usize_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            chunk_overlap: usize_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP),
            agent_max_turns: usize_or("AGENT_MAX_TURNS", DEFAULT_AGENT_MAX_TURNS),
        };

        if settings.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if settings.chunk_overlap >= settings.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                settings.chunk_overlap,
                settings.chunk_size
            );
        }

        Ok(settings)
    }
}
