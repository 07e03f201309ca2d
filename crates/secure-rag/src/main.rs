//! # Secure RAG CLI (`secure-rag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `secure-rag init` | Create the database schema and the configured collection |
//! | `secure-rag serve` | Start the HTTP API |
//! | `secure-rag ingest <FILE>...` | Ingest local PDF / TXT / MD files |
//! | `secure-rag search "<query>"` | Print the retrieved context for a query |
//!
//! ## Examples
//!
//! ```bash
//! secure-rag --config ./config/secure-rag.toml init
//! secure-rag ingest ./docs/handbook.pdf ./docs/security.md
//! RAG_LLM__BASE_URL=http://vllm:8000/v1 secure-rag serve
//! secure-rag search "remote access policy" --top-k 3
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use secure_rag::config::{load_config, Config};
use secure_rag::embedding::create_embedder;
use secure_rag::index::VectorIndex;
use secure_rag::ingest::IngestionService;
use secure_rag::sqlite_store::SqliteVectorStore;
use secure_rag::{logging, server};
use secure_rag_core::store::VectorStore;

/// Secure RAG: document ingestion and grounded, streaming chat over an
/// OpenAI-compatible API.
#[derive(Parser)]
#[command(name = "secure-rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Missing files are skipped;
    /// `RAG_*` environment variables override file values.
    #[arg(long, global = true, default_value = "./config/secure-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and the configured collection.
    ///
    /// Idempotent; fails if the collection exists with other dimensions.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Ingest local files into the configured collection.
    Ingest {
        /// Files to ingest (.pdf, .txt, .md).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run hybrid retrieval and print the ranked chunks.
    Search {
        /// The search query.
        query: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.config))?;
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteVectorStore::open(&config.store).await?;
            store
                .ensure_collection(&config.store.collection, config.store.dims)
                .await?;
            println!(
                "Database initialized at {} (collection '{}', {} dims)",
                config.store.path.display(),
                config.store.collection,
                config.store.dims
            );
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::Ingest { files } => {
            let index = open_index(&config).await?;
            let service = IngestionService::new(index);
            let mut failed = 0usize;

            for path in &files {
                match service.ingest_path(path).await {
                    Ok(doc) => println!("{}: {} chunks", doc.filename, doc.chunks.len()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", path.display(), e);
                    }
                }
            }

            let total = service.index().count().await?;
            println!("Collection '{}' holds {} chunks", service.index().collection(), total);

            if failed > 0 {
                bail!("{} of {} files failed to ingest", failed, files.len());
            }
        }
        Commands::Search { query, top_k } => {
            let index = open_index(&config).await?;
            let top_k = top_k.unwrap_or_else(|| index.default_top_k());
            let context = index.retrieve(&query, top_k).await?;

            if context.is_empty() {
                println!("No results.");
            }
            for (rank, chunk) in context.iter().enumerate() {
                let snippet: String = chunk.content.chars().take(200).collect();
                println!(
                    "{}. [{:.4}] {} #{}\n   {}",
                    rank + 1,
                    chunk.score.unwrap_or_default(),
                    chunk.metadata.source_label(),
                    chunk.chunk_index,
                    snippet.replace('\n', " ")
                );
            }
        }
    }

    Ok(())
}

async fn open_index(config: &Config) -> Result<VectorIndex> {
    let store = SqliteVectorStore::open(&config.store).await?;
    let embedder = create_embedder(&config.embedding, config.store.dims)?;
    Ok(VectorIndex::new(Arc::new(store), embedder, config))
}
