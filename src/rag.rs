use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rig::streaming::StreamingChat;
use tracing::info;

use crate::agent;
use crate::chat::{ChatBackend, History};
use crate::db::{Retriever, VectorDb};
use crate::document::{self, ScoredChunk};
use crate::ingestion::Ingestion;
use crate::llm::{self, Llm};
use crate::stream;

/// Longest content preview printed by `--search-only`, in characters.
const PREVIEW_CHARS: usize = 160;

/// Loads a document and stores its chunks. Returns the number stored.
pub async fn ingest_document<I>(db: &VectorDb, ingestion: &I, path: &Path) -> Result<usize>
where
    I: Ingestion + ?Sized,
{
    info!("Ingesting {}", path.display());
    let chunks = ingestion.load(path)?;

    let stored = db
        .add_chunks(&chunks)
        .await
        .with_context(|| format!("Failed to store chunks from {}", path.display()))?;
    info!("Stored {} chunks from {}", stored, path.display());
    Ok(stored)
}

/// System prompt for the two-step flow.
pub fn build_system_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant.\n\
         Answer using ONLY the following context.\n\
         If the context is insufficient, say you don't know.\n\n\
         Context: {}",
        context
    )
}

/// Two-step RAG: retrieve once, then stream a grounded answer to stdout.
pub async fn stream_rag_answer(
    llm: &Llm,
    retriever: Retriever<'_>,
    prompt: &str,
    history: &History,
    show_header: bool,
) -> Result<String> {
    let chunks = retriever.invoke(prompt).await?;
    info!(
        "Retrieved {} chunks (k={}) for the prompt",
        chunks.len(),
        retriever.k()
    );

    let system_prompt = build_system_prompt(&document::format_chunks(&chunks));
    let agent = llm.agent().preamble(&system_prompt).build();
    let response = agent.stream_chat(prompt, history.to_messages()).await;

    if show_header {
        println!("Answer:");
    }
    let mut stdout = std::io::stdout();
    stream::reassemble(llm::text_fragments(response), &mut stdout).await
}

/// `[i] score=0.8123 source=a.pdf page=3`
pub fn format_source_line(index: usize, hit: &ScoredChunk) -> String {
    format!(
        "[{}] score={:.4} source={} page={}",
        index,
        hit.score,
        hit.chunk.source(),
        hit.chunk.page()
    )
}

/// The `Sources:` block printed after an answer.
pub fn format_sources(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return "\nSources:\n(no matches)".to_string();
    }
    let lines: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format_source_line(i + 1, hit))
        .collect();
    format!("\nSources:\n{}", lines.join("\n"))
}

pub async fn print_sources(db: &VectorDb, query: &str, k: usize) -> Result<()> {
    info!("Printing sources for query: `{}`", query);
    let hits = db.similarity_search_with_score(query, k).await?;
    println!("{}", format_sources(&hits));
    Ok(())
}

/// Single-line, length-capped view of a chunk's text.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Ranked hits with previews; the LLM is not involved.
pub fn format_search_results(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return "(no matches)".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}\n    {}",
                format_source_line(i + 1, hit),
                preview(&hit.chunk.page_content)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn search_only(db: &VectorDb, query: &str, k: usize) -> Result<()> {
    let hits = db.similarity_search_with_score(query, k).await?;
    println!("{}", format_search_results(&hits));
    Ok(())
}

/// Which RAG flow answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Retrieve once, then generate.
    TwoStep,
    /// Let the model call the retrieval tool.
    Agentic,
}

/// Everything needed to answer prompts against the knowledge base.
pub struct RagPipeline {
    llm: Llm,
    db: Arc<VectorDb>,
    flow: Flow,
    top_k: usize,
    agent_max_turns: usize,
}

impl RagPipeline {
    pub fn new(llm: Llm, db: Arc<VectorDb>, flow: Flow, top_k: usize, agent_max_turns: usize) -> Self {
        Self {
            llm,
            db,
            flow,
            top_k,
            agent_max_turns,
        }
    }

    pub async fn answer(&self, prompt: &str, history: &History, show_header: bool) -> Result<String> {
        match self.flow {
            Flow::TwoStep => {
                let retriever = self.db.as_retriever(self.top_k);
                stream_rag_answer(&self.llm, retriever, prompt, history, show_header).await
            }
            Flow::Agentic => {
                agent::stream_rag_agent_answer(
                    &self.llm,
                    Arc::clone(&self.db),
                    self.top_k,
                    self.agent_max_turns,
                    prompt,
                    history,
                    show_header,
                )
                .await
            }
        }
    }

    pub async fn print_sources(&self, query: &str) -> Result<()> {
        print_sources(&self.db, query, self.top_k).await
    }
}

impl ChatBackend for RagPipeline {
    async fn respond(&self, prompt: &str, history: &History) -> Result<String> {
        self.answer(prompt, history, false).await
    }

    async fn after_turn(&self, prompt: &str) -> Result<()> {
        self.print_sources(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn hit(text: &str, source: &str, page: u32, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(text, source, page),
            score,
        }
    }

    #[test]
    fn test_system_prompt() {
        let prompt = build_system_prompt("chunk one\n\nchunk two");
        assert_eq!(
            prompt,
            "You are a helpful assistant.\n\
             Answer using ONLY the following context.\n\
             If the context is insufficient, say you don't know.\n\n\
             Context: chunk one\n\nchunk two"
        );
    }

    #[test]
    fn test_system_prompt_without_context() {
        assert!(build_system_prompt("").ends_with("Context: "));
    }

    #[test]
    fn test_format_sources() {
        let hits = vec![
            hit("a", "docs/a.pdf", 3, 0.81234),
            hit("b", "docs/b.pdf", 1, 0.5),
        ];
        assert_eq!(
            format_sources(&hits),
            "\nSources:\n[1] score=0.8123 source=docs/a.pdf page=3\n[2] score=0.5000 source=docs/b.pdf page=1"
        );
    }

    #[test]
    fn test_format_sources_empty() {
        assert_eq!(format_sources(&[]), "\nSources:\n(no matches)");
    }

    #[test]
    fn test_search_results_include_preview() {
        let hits = vec![hit("Line one\n  line two", "a.pdf", 2, 0.9)];
        assert_eq!(
            format_search_results(&hits),
            "[1] score=0.9000 source=a.pdf page=2\n    Line one line two"
        );
        assert_eq!(format_search_results(&[]), "(no matches)");
    }

    #[test]
    fn test_preview_is_capped() {
        let long = "word ".repeat(100);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.chars().count() <= PREVIEW_CHARS + 3);
    }
}
