use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use common::{types::Document, utils::config::get_config};
use rag_pipeline::{
    generator::{AnswerGenerator, OpenAiGenerator, RetryPolicy},
    repository::InMemoryRepository,
    RagPipeline,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "studyrag", about = "Question answering over a document corpus")]
struct Cli {
    /// Path to a JSON file containing the document corpus.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question from the corpus and print the sources used.
    Query { question: String },
    /// Generate a multiple-choice quiz for one document in the corpus.
    Quiz { document_id: String },
    /// Build the index and print pipeline status.
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let documents = load_corpus(cli.corpus.as_deref())?;
    info!(documents = documents.len(), "Corpus loaded");

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let service = Arc::new(OpenAiGenerator::new(openai_client, &config.query_model));
    let generator = AnswerGenerator::new(
        service,
        Duration::from_secs(config.generation_timeout_secs),
        RetryPolicy {
            max_attempts: config.generation_max_attempts,
            base_delay: Duration::from_millis(config.generation_retry_base_delay_ms),
        },
    );

    let pipeline = RagPipeline::new(
        Arc::new(InMemoryRepository::new(documents.clone())),
        generator,
    );

    match cli.command {
        Command::Query { question } => {
            let outcome = pipeline.query(&question, None).await?;
            println!("{}", outcome.response);
            if !outcome.sources.is_empty() {
                println!("\nSources:");
                for source in &outcome.sources {
                    println!(
                        "  - {} ({}) similarity={:.3} rerank={:.3}",
                        source.title, source.subject, source.similarity_score, source.rerank_score
                    );
                }
            }
        }
        Command::Quiz { document_id } => {
            let document = documents
                .iter()
                .find(|d| d.id == document_id)
                .ok_or_else(|| format!("no document with id {document_id}"))?;
            let questions = pipeline.generate_quiz(document).await;
            println!("{}", serde_json::to_string_pretty(&questions)?);
        }
        Command::Status => {
            pipeline.initialize(None).await?;
            let status = pipeline.status().await;
            println!("ready:       {}", status.ready);
            println!("chunks:      {}", status.chunk_count);
            println!(
                "fingerprint: {}",
                status.fingerprint.as_deref().unwrap_or("-")
            );
            if let Some(built) = status.last_build_time {
                println!("built at:    {}", built.to_rfc3339());
            }
        }
    }

    Ok(())
}

fn load_corpus(
    path: Option<&std::path::Path>,
) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(Vec::new()),
    }
}
