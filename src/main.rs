use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use learning_rag::chat::{self, History};
use learning_rag::cli::{Action, Cli};
use learning_rag::config::Settings;
use learning_rag::db::VectorDb;
use learning_rag::embeddings::Embedder;
use learning_rag::ingestion::PdfIngestion;
use learning_rag::llm::{self, Llm};
use learning_rag::logging;
use learning_rag::rag::{self, Flow, RagPipeline};
use learning_rag::sources::{self, ScanBounds};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Usage errors exit here, before .env or the network are touched.
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    logging::init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?;
    debug!(
        db_path = %cli.db_path.display(),
        "Ignoring --db-path; using Qdrant at {}",
        settings.qdrant_url
    );

    let client = llm::create_client(&settings)?;
    let embedder = Embedder::new(&client, &settings.embedding_model);
    let db = Arc::new(VectorDb::connect(&settings, embedder).await?);

    let flow = if cli.agent { Flow::Agentic } else { Flow::TwoStep };
    let top_k = cli.top_k as usize;

    match cli.action() {
        Action::Store(path) => {
            let ingestion = PdfIngestion::new(settings.chunk_size, settings.chunk_overlap);
            let stored = rag::ingest_document(&db, &ingestion, &path).await?;
            println!(
                "Stored {} chunks into collection '{}'.",
                stored,
                db.collection()
            );
        }
        Action::SearchOnly(query) => rag::search_only(&db, &query, top_k).await?,
        Action::ListSources => {
            for line in sources::list_sources(db.as_ref(), &ScanBounds::default()).await {
                println!("{}", line);
            }
        }
        Action::Prompt(prompt) => {
            let pipeline = build_pipeline(&settings, client, db, flow, top_k);
            pipeline.answer(&prompt, &History::new(), true).await?;
            pipeline.print_sources(&prompt).await?;
        }
        Action::Interactive => {
            let pipeline = build_pipeline(&settings, client, db, flow, top_k);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            chat::interactive_chat(&pipeline, stdin, &mut stdout).await?;
        }
    }

    Ok(())
}

fn build_pipeline(
    settings: &Settings,
    client: rig::providers::openai::Client<reqwest::Client>,
    db: Arc<VectorDb>,
    flow: Flow,
    top_k: usize,
) -> RagPipeline {
    let llm = Llm::new(client, &settings.chat_model);
    RagPipeline::new(llm, db, flow, top_k, settings.agent_max_turns)
}
