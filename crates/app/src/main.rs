mod server;

use askdoc_core::{
    discover_documents, DisabledWebSearch, DocumentStore, ExtractiveAnswerer, HttpRemoteIndex,
    IndexingOptions, SearchOrchestrator, SearchTuning,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "askdoc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of a remote index node; local scoring is used when unset.
    #[arg(long, env = "ASKDOC_REMOTE_INDEX_URL")]
    remote_index_url: Option<String>,

    /// Remove source files after extraction.
    #[arg(long, default_value_t = false)]
    cleanup_source: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve {
        /// Bind address for the HTTP listener.
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,
    },
    /// Index every supported document under a folder.
    Ingest {
        /// Folder scanned recursively for txt, md, pdf and docx files.
        #[arg(long)]
        folder: String,
    },
    /// Index a folder, then score one query against it.
    Search {
        /// Folder scanned recursively before searching.
        #[arg(long)]
        folder: String,
        /// Search query
        #[arg(long)]
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = Arc::new(DocumentStore::new(IndexingOptions {
        cleanup_source: cli.cleanup_source,
        ..IndexingOptions::default()
    }));
    let remote = match &cli.remote_index_url {
        Some(url) => Some(
            HttpRemoteIndex::new(url).map_err(|error| anyhow::anyhow!(error.to_string()))?,
        ),
        None => None,
    };
    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::clone(&store),
        remote,
        SearchTuning::default(),
    ));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "askdoc boot"
    );

    match cli.command {
        Command::Serve { bind } => {
            let state = server::AppState {
                store,
                orchestrator,
                web: Arc::new(DisabledWebSearch),
                generator: Arc::new(ExtractiveAnswerer),
            };
            server::run_server(&bind, state).await?;
        }
        Command::Ingest { folder } => {
            let outcome = ingest_folder(&store, &folder).await?;
            println!(
                "{} of {} documents indexed at {}",
                outcome.summary.successful,
                outcome.summary.total,
                Utc::now().to_rfc3339()
            );
            for error in outcome.errors {
                println!("failed: {} ({})", error.document_id, error.error);
            }
        }
        Command::Search { folder, query } => {
            let outcome = ingest_folder(&store, &folder).await?;
            if outcome.summary.successful == 0 {
                println!("no documents indexed, nothing to search");
                return Ok(());
            }

            let results = orchestrator
                .search(&query, None)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            if results.is_empty() {
                println!("no relevant documents");
            }
            for result in results {
                println!(
                    "score={} document={} ({})",
                    result.total_relevance_score, result.document_id, result.document_name
                );
                for chunk in result.chunks {
                    println!(
                        "  [score={} words {}..{}] {}",
                        chunk.relevance_score,
                        chunk.start_word,
                        chunk.end_word,
                        preview(&chunk.content)
                    );
                }
            }
        }
    }

    Ok(())
}

async fn ingest_folder(
    store: &Arc<DocumentStore>,
    folder: &str,
) -> anyhow::Result<askdoc_core::BatchOutcome> {
    let requests = discover_documents(Path::new(folder))
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    if requests.is_empty() {
        anyhow::bail!("no supported documents under {folder}");
    }
    info!(folder, documents = requests.len(), "ingesting folder");
    Ok(store.process_batch(requests).await)
}

fn preview(content: &str) -> String {
    const PREVIEW_CHARS: usize = 120;
    if content.len() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let cut = content
        .char_indices()
        .map(|(offset, _)| offset)
        .take_while(|offset| *offset <= PREVIEW_CHARS)
        .last()
        .unwrap_or(0);
    format!("{}...", &content[..cut])
}
