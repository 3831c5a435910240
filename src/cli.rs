use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// learning-rag: store PDFs in Qdrant and ask questions about them.
///
/// Answers come from OpenAI, either retrieve-then-generate or with an agent
/// that calls a retrieval tool on its own.
#[derive(Debug, Parser)]
#[command(name = "learning-rag", version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(false)
        .args(["store", "prompt", "interactive", "search_only", "list_sources"])
))]
pub struct Cli {
    /// Ingest a PDF into the knowledge base
    #[arg(long, value_name = "PDF_PATH")]
    pub store: Option<PathBuf>,

    /// Answer a single prompt
    #[arg(long, value_name = "TEXT", alias = "promtp")]
    pub prompt: Option<String>,

    /// Chat in a loop, keeping conversation history
    #[arg(long)]
    pub interactive: bool,

    /// Print the most similar chunks without calling the LLM
    #[arg(long, value_name = "QUERY")]
    pub search_only: Option<String>,

    /// List stored sources and their chunk counts
    #[arg(long)]
    pub list_sources: bool,

    /// Chunks retrieved per query
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub top_k: u32,

    /// Let the model decide when to retrieve
    #[arg(long)]
    pub agent: bool,

    /// Local store path (unused by the Qdrant server backend)
    #[arg(long, value_name = "PATH", default_value = "qdrant_data")]
    pub db_path: PathBuf,
}

/// The one thing a run does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Store(PathBuf),
    Prompt(String),
    Interactive,
    SearchOnly(String),
    ListSources,
}

impl Cli {
    pub fn action(&self) -> Action {
        if let Some(path) = &self.store {
            Action::Store(path.clone())
        } else if let Some(prompt) = &self.prompt {
            Action::Prompt(prompt.clone())
        } else if let Some(query) = &self.search_only {
            Action::SearchOnly(query.clone())
        } else if self.list_sources {
            Action::ListSources
        } else {
            Action::Interactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("learning-rag").chain(args.iter().copied()))
    }

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--prompt", "What is RAG?"]).unwrap();
        assert_eq!(cli.action(), Action::Prompt("What is RAG?".into()));
        assert_eq!(cli.top_k, 5);
        assert!(!cli.agent);
        assert_eq!(cli.db_path, PathBuf::from("qdrant_data"));
    }

    #[test]
    fn test_each_action() {
        assert_eq!(
            parse(&["--store", "paper.pdf"]).unwrap().action(),
            Action::Store(PathBuf::from("paper.pdf"))
        );
        assert_eq!(
            parse(&["--interactive", "--agent"]).unwrap().action(),
            Action::Interactive
        );
        assert_eq!(
            parse(&["--search-only", "tokio"]).unwrap().action(),
            Action::SearchOnly("tokio".into())
        );
        assert_eq!(parse(&["--list-sources"]).unwrap().action(), Action::ListSources);
    }

    #[test]
    fn test_promtp_alias() {
        let cli = parse(&["--promtp", "hi"]).unwrap();
        assert_eq!(cli.action(), Action::Prompt("hi".into()));
    }

    #[test]
    fn test_two_actions_conflict() {
        let err = parse(&["--store", "a.pdf", "--prompt", "hi"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_action_required() {
        let err = parse(&["--top-k", "3"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_top_k_must_be_positive() {
        let err = parse(&["--prompt", "hi", "--top-k", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
