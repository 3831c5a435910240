//! Agentic flow: the model decides when to look things up.

use std::sync::Arc;

use anyhow::Result;
use rig::agent::{HookAction, StreamingPromptHook, ToolCallHookAction};
use rig::completion::{CompletionModel, ToolDefinition};
use rig::streaming::StreamingChat;
use rig::tool::Tool;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::chat::History;
use crate::db::VectorDb;
use crate::document::Chunk;
use crate::llm::{self, Llm};
use crate::stream;

pub const AGENT_SYSTEM_PROMPT: &str = "You have access to a tool that retrieves context from a \
knowledge base. Use the tool to help answer user queries. Indicate in the response on the sources";

#[derive(Debug, Error)]
#[error("Context retrieval failed: {0}")]
pub struct RetrievalError(String);

#[derive(Debug, Deserialize)]
pub struct RetrieveArgs {
    pub query: String,
}

/// `retrieve_context(query)`: similarity search over the knowledge base.
#[derive(Clone)]
pub struct RetrieveContext {
    db: Arc<VectorDb>,
    k: usize,
}

impl RetrieveContext {
    pub fn new(db: Arc<VectorDb>, k: usize) -> Self {
        Self { db, k }
    }
}

impl Tool for RetrieveContext {
    const NAME: &'static str = "retrieve_context";

    type Error = RetrievalError;
    type Args = RetrieveArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Retrieve information to help answer a query.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search the knowledge base for"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        match self.db.similarity_search(&args.query, self.k).await {
            Ok(chunks) => Ok(format_tool_output(&chunks)),
            Err(e) => {
                error!(error = %format!("{:#}", e), query = %args.query, "retrieve_context failed");
                Err(RetrievalError(format!("{:#}", e)))
            }
        }
    }
}

/// Serializes retrieved chunks for the model, one block per chunk.
pub fn format_tool_output(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            format!(
                "Source: {} (page {})\nContent: {}",
                c.source(),
                c.page(),
                c.page_content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Logs tool invocations as the agent makes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCallLogger;

impl<M: CompletionModel> StreamingPromptHook<M> for ToolCallLogger {
    async fn on_tool_call(
        &self,
        tool_name: &str,
        tool_call_id: Option<String>,
        internal_call_id: &str,
        args: &str,
    ) -> ToolCallHookAction {
        info!(
            tool = tool_name,
            tool_call_id = tool_call_id.as_deref().unwrap_or("-"),
            internal_call_id,
            input_chars = args.chars().count(),
            "Tool call start"
        );
        ToolCallHookAction::cont()
    }

    async fn on_tool_result(
        &self,
        tool_name: &str,
        tool_call_id: Option<String>,
        internal_call_id: &str,
        _args: &str,
        result: &str,
    ) -> HookAction {
        info!(
            tool = tool_name,
            tool_call_id = tool_call_id.as_deref().unwrap_or("-"),
            internal_call_id,
            output_chars = result.chars().count(),
            "Tool call end"
        );
        HookAction::cont()
    }
}

/// Answers `prompt` with a tool-using agent, streaming the reply to stdout.
///
/// The agent may call `retrieve_context` up to `max_turns` times.
pub async fn stream_rag_agent_answer(
    llm: &Llm,
    db: Arc<VectorDb>,
    k: usize,
    max_turns: usize,
    prompt: &str,
    history: &History,
    show_header: bool,
) -> Result<String> {
    let agent = llm
        .agent()
        .preamble(AGENT_SYSTEM_PROMPT)
        .tool(RetrieveContext::new(db, k))
        .default_max_turns(max_turns)
        .build();

    let response = agent
        .stream_chat(prompt, history.to_messages())
        .multi_turn(max_turns)
        .with_hook(ToolCallLogger)
        .await;

    if show_header {
        println!("Answer:");
    }
    let mut stdout = std::io::stdout();
    stream::reassemble(llm::text_fragments(response), &mut stdout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tool_output() {
        let chunks = vec![
            Chunk::new("Ownership rules.", "book.pdf", 4),
            Chunk::new("Borrowing rules.", "book.pdf", 5),
        ];
        assert_eq!(
            format_tool_output(&chunks),
            "Source: book.pdf (page 4)\nContent: Ownership rules.\n\n\
             Source: book.pdf (page 5)\nContent: Borrowing rules."
        );
    }

    #[test]
    fn test_format_tool_output_empty() {
        assert_eq!(format_tool_output(&[]), "");
    }

    #[test]
    fn test_args_deserialize() {
        let args: RetrieveArgs = serde_json::from_str(r#"{"query": "lifetimes"}"#).unwrap();
        assert_eq!(args.query, "lifetimes");
    }

    #[test]
    fn test_retrieval_error_message() {
        let err = RetrievalError("qdrant down".into());
        assert_eq!(err.to_string(), "Context retrieval failed: qdrant down");
    }
}
