use anyhow::{anyhow, Context, Result};
use futures::{Stream, StreamExt};
use rig::agent::{AgentBuilder, MultiTurnStreamItem, StreamingResult};
use rig::client::CompletionClient;
use rig::providers::openai;
use rig::providers::openai::responses_api::ResponsesCompletionModel;
use rig::streaming::StreamedAssistantContent;
use tracing::debug;

use crate::config::Settings;

/// Completion model behind every agent this crate builds.
pub type ChatModel = ResponsesCompletionModel<reqwest::Client>;

/// Creates an OpenAI client from the settings.
///
/// Fails when no API key is configured; `OPENAI_BASE_URL` overrides the
/// endpoint for OpenAI-compatible servers.
pub fn create_client(settings: &Settings) -> Result<openai::Client<reqwest::Client>> {
    let api_key = settings
        .openai_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set (export it or add it to .env)"))?;

    let mut builder = openai::Client::<reqwest::Client>::builder().api_key(api_key);
    if let Some(base_url) = settings.openai_base_url.as_deref() {
        debug!(base_url, "Using custom OpenAI base URL");
        builder = builder.base_url(base_url);
    }

    builder.build().context("Failed to build OpenAI client")
}

/// The chat side of the OpenAI client: hands out agent builders for the
/// configured model.
#[derive(Clone)]
pub struct Llm {
    client: openai::Client<reqwest::Client>,
    model: String,
}

impl Llm {
    pub fn new(client: openai::Client<reqwest::Client>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn agent(&self) -> AgentBuilder<ChatModel> {
        self.client.agent(&self.model)
    }
}

/// Narrows a rig multi-turn stream to its assistant text fragments.
///
/// Tool calls and tool results are dropped (the agent loop handles them).
/// The final aggregated response is not re-emitted, only its token usage is
/// logged.
pub fn text_fragments<R>(stream: StreamingResult<R>) -> impl Stream<Item = Result<String>> {
    stream.filter_map(|item| async move {
        match item {
            Ok(MultiTurnStreamItem::StreamAssistantItem(StreamedAssistantContent::Text(text))) => {
                Some(Ok(text.text))
            }
            Ok(MultiTurnStreamItem::FinalResponse(res)) => {
                let usage = res.usage();
                debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Completion finished"
                );
                None
            }
            Ok(_) => None,
            Err(e) => Some(Err(anyhow::Error::new(e).context("LLM stream failed"))),
        }
    })
}
