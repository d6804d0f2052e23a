mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use ragserve_core::{
    digest_file, discover_document_files, ensure_collection, DistanceMetric, DocumentParser,
    Embedder, FileParser, GenerationEvent, GenerationOrchestrator, IngestionOptions,
    IngestionPipeline, OllamaEmbedder, OllamaGenerator, QdrantStore, RetrievalService,
};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragserve", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Vector collection name
    #[arg(long, env = "COLLECTION", default_value = "tenant_docs_v1")]
    collection: String,

    /// Ollama base URL (embeddings and generation)
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding model identifier
    #[arg(long, env = "EMBED_MODEL", default_value = "all-minilm")]
    embed_model: String,

    /// Output dimensionality of the embedding model
    #[arg(long, env = "EMBED_DIM", default_value_t = 384)]
    embed_dim: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a folder of documents for a tenant.
    Ingest {
        /// Folder scanned recursively for pdf/txt/md files.
        #[arg(long)]
        folder: String,
        /// Tenant the ingested chunks belong to.
        #[arg(long, default_value = "demo")]
        tenant: String,
        /// Token budget per chunk.
        #[arg(long, default_value_t = 400)]
        target_tokens: usize,
        /// Sentences of overlap carried across chunk boundaries.
        #[arg(long, default_value_t = 2)]
        overlap_sentences: usize,
    },
    /// Ask a question and stream the grounded answer to stdout.
    Ask {
        /// The question to answer from ingested context.
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "demo")]
        tenant: String,
        /// Number of chunks retrieved into the context.
        #[arg(long, default_value_t = 8)]
        top_k: usize,
        /// Generation model identifier.
        #[arg(long, default_value = "llama3.2:1b")]
        model: String,
    },
    /// Serve the streaming query endpoint over HTTP.
    Serve {
        /// Address to bind (host:port).
        #[arg(long, env = "RAGSERVE_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        #[arg(long, default_value = "llama3.2:1b")]
        model: String,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = OllamaEmbedder::new(&cli.ollama_url, &cli.embed_model, cli.embed_dim);
    let store = QdrantStore::new(&cli.qdrant_url, cli.embed_dim);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "ragserve boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            tenant,
            target_tokens,
            overlap_sentences,
        } => {
            ensure_collection(
                &store,
                &cli.collection,
                embedder.dimensions(),
                DistanceMetric::Cosine,
            )
            .await?;

            let files = discover_document_files(Path::new(&folder));
            if files.is_empty() {
                anyhow::bail!("no ingestable documents found in {folder}");
            }

            let parser = FileParser;
            let mut sources = Vec::new();
            let mut skipped_files = 0usize;

            for path in &files {
                match parser.parse(path) {
                    Ok(fragments) => {
                        let checksum = digest_file(path)?;
                        info!(
                            path = %path.display(),
                            checksum = %checksum,
                            fragments = fragments.len(),
                            "parsed document"
                        );
                        sources.extend(fragments);
                    }
                    Err(error) => {
                        warn!(path = %path.display(), reason = %error, "skipped document");
                        skipped_files += 1;
                    }
                }
            }

            let options = IngestionOptions {
                target_tokens,
                overlap_sentences,
            };
            let pipeline = IngestionPipeline::new(embedder, store, &cli.collection, options);
            let report = pipeline.ingest(&sources, &tenant).await?;

            for skipped in &report.skipped {
                warn!(source = %skipped.label, reason = %skipped.reason, "source yielded no chunks");
            }

            println!(
                "{} chunks ingested for tenant '{}' ({} of {} files skipped) at {}",
                report.inserted,
                tenant,
                skipped_files,
                files.len(),
                report.completed_at.to_rfc3339()
            );
        }
        Command::Ask {
            question,
            tenant,
            top_k,
            model,
        } => {
            let retrieval = RetrievalService::new(embedder, store, &cli.collection);
            let context = retrieval.retrieve(&question, &tenant, top_k).await?;
            info!(
                tenant = %tenant,
                hit_count = context.hits.len(),
                embed_ms = context.timings.embed.as_millis() as u64,
                search_ms = context.timings.search.as_millis() as u64,
                "context assembled"
            );

            let orchestrator = GenerationOrchestrator::new(OllamaGenerator::new(&cli.ollama_url));
            let mut events = orchestrator
                .generate(&context.context_text(), &question, &model)
                .await;

            let mut stdout = std::io::stdout();
            while let Some(event) = events.recv().await {
                match event {
                    GenerationEvent::Fragment(text) => {
                        stdout.write_all(text.as_bytes())?;
                        stdout.flush()?;
                    }
                    GenerationEvent::Done => {
                        writeln!(stdout)?;
                        break;
                    }
                    GenerationEvent::Error(message) => {
                        writeln!(stdout)?;
                        anyhow::bail!(message);
                    }
                }
            }
        }
        Command::Serve { bind, model, top_k } => {
            let state = server::AppState {
                retrieval: RetrievalService::new(embedder, store, &cli.collection),
                orchestrator: GenerationOrchestrator::new(OllamaGenerator::new(&cli.ollama_url)),
                model,
                top_k,
            };
            server::serve(&bind, state)
                .await
                .context("server shutdown")?;
        }
    }

    Ok(())
}
