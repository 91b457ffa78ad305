//! ragdb: index a folder of `.txt` files and search or chat over it.

mod extractive;
mod ingest;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ragdb_assistant::{AssistantOrchestrator, TurnArchive};
use ragdb_core::config::{BackendKind, Config, Settings};
use ragdb_core::traits::{Embedder, KeywordBackend, VectorBackend};
use ragdb_core::types::ScoredDocument;
use ragdb_embed::{CachingEmbedder, HashEmbedder};
use ragdb_hybrid::{DocumentIndex, HybridRetriever};
use ragdb_memory::{ConversationMemory, InMemoryChatStore};
use ragdb_text::{TantivyKeywordIndex, TermIndex};
use ragdb_vector::{FlatVectorIndex, LanceVectorIndex};

use crate::extractive::ExtractiveCompletion;
use crate::ingest::{index_chunks, Chunker};

const EMBED_CACHE_ENTRIES: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "ragdb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the files under --data and print the best matches for a query.
    Search {
        #[arg(long)]
        data: PathBuf,
        #[arg(short, long)]
        k: Option<usize>,
        query: String,
    },
    /// Index the files under --data and chat over them.
    Chat {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "cli")]
        session: String,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Config::load()?.settings()?;

    match cli.command {
        Commands::Search { data, k, query } => search(&settings, &data, k, &query).await,
        Commands::Chat { data, session } => chat(&settings, &data, &session).await,
    }
}

fn embedder(settings: &Settings) -> Arc<dyn Embedder> {
    let hashing = Arc::new(HashEmbedder::new(settings.index.dimension));
    Arc::new(CachingEmbedder::new(hashing, EMBED_CACHE_ENTRIES))
}

async fn open_index(settings: &Settings, name: &str, backend: BackendKind) -> Result<Arc<DocumentIndex>> {
    let dim = settings.index.dimension;
    let vector: Arc<dyn VectorBackend>;
    let keyword: Arc<dyn KeywordBackend>;
    match backend {
        BackendKind::Memory => {
            vector = Arc::new(FlatVectorIndex::new());
            keyword = Arc::new(TermIndex::new());
        }
        BackendKind::Embedded => {
            let dir = settings.data_dir(&std::env::current_dir()?).join(name);
            tracing::info!(dir = %dir.display(), "opening embedded backends");
            keyword = Arc::new(TantivyKeywordIndex::open_or_create(&dir.join("tantivy"))?);
            vector = Arc::new(LanceVectorIndex::open(&dir.join("lancedb"), "documents", dim).await?);
        }
    }
    Ok(Arc::new(DocumentIndex::new(dim, vector, keyword)))
}

async fn build_retriever(settings: &Settings, data: &Path, embedder: Arc<dyn Embedder>) -> Result<HybridRetriever> {
    let index = open_index(settings, "documents", settings.index.backend).await?;
    let chunks = Chunker::new(&settings.ingest).process_directory(data)?;
    let indexed = index_chunks(&index, embedder.as_ref(), chunks).await?;
    tracing::info!(indexed, "corpus ready");
    Ok(HybridRetriever::new(index, embedder, settings.retrieval.clone())?)
}

fn print_hits(hits: &[ScoredDocument]) {
    for (rank, hit) in hits.iter().enumerate() {
        let fmt = |s: Option<f32>| s.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
        println!(
            "{:>2}. {:<32} fused {:.3}  vector {}  keyword {}",
            rank + 1,
            hit.id(),
            hit.fused_score,
            fmt(hit.vector_score),
            fmt(hit.keyword_score)
        );
        let preview: String = hit.document.text.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " "));
    }
}

async fn search(settings: &Settings, data: &Path, k: Option<usize>, query: &str) -> Result<()> {
    let retriever = build_retriever(settings, data, embedder(settings)).await?;
    let hits = retriever.retrieve(query, k.unwrap_or(settings.retrieval.top_k)).await?;
    if hits.is_empty() {
        println!("No results.");
    }
    print_hits(&hits);
    Ok(())
}

async fn chat(settings: &Settings, data: &Path, session: &str) -> Result<()> {
    let embedder = embedder(settings);
    let retriever = build_retriever(settings, data, embedder.clone()).await?;
    let memory = Arc::new(ConversationMemory::new(Arc::new(InMemoryChatStore::new()), &settings.memory)?);
    let sweeper = memory.ttl().map(|ttl| memory.spawn_sweeper(ttl.min(Duration::from_secs(60))));

    let mut assistant = AssistantOrchestrator::new(memory, Arc::new(retriever), Arc::new(ExtractiveCompletion), settings);
    if settings.assistant.archive_turns {
        // the archive lives as long as the process, like the short-term store
        let archive_index = open_index(settings, "archive", BackendKind::Memory).await?;
        let archive_retriever = HybridRetriever::new(archive_index, embedder, settings.retrieval.clone())?;
        assistant = assistant.with_archive(Arc::new(TurnArchive::new(archive_retriever, settings.assistant.archive_top_k)));
    }

    println!("Chatting as session '{session}'. Commands: /forget, /quit");
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/forget" => {
                assistant.forget(session).await?;
                println!("(history cleared)");
            }
            query => match assistant.handle(session, query).await {
                Ok(reply) => {
                    println!("{}", reply.text);
                    let sources: Vec<&str> = reply.sources.iter().map(ScoredDocument::id).collect();
                    if !sources.is_empty() {
                        println!("  sources: {}", sources.join(", "));
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}
