//! conexus CLI — a thin harness for manually exercising the index/query
//! pipeline. Not a product surface: one subcommand per top-level request
//! (`Index`/`IndexIncremental`, `Query`), graceful shutdown on SIGINT/SIGTERM
//! via a bounded `Stop()` deadline, same as this codebase's existing binary.

use clap::{Parser, Subcommand};
use conexus_core::cache::{Cache, NullSharedCache};
use conexus_core::config::ConexusConfig;
use conexus_core::controller::IndexController;
use conexus_core::engine::QueryEngine;
use conexus_core::error::ConexusError;
use conexus_core::indexer::{Indexer, NullInvalidator};
use conexus_core::store::{HashEmbedder, MemoryInvertedIndex, MemoryVectorStore};
use conexus_core::tokenizer::create_tokenizer;
use conexus_core::traits::{Embedder, InvertedIndex, VectorStore};
use conexus_core::types::now_unix;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Bounded deadline `Stop()` is given to finish before the process exits anyway.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "conexus", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index (or incrementally re-index) a repository
    Index {
        /// Repository root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Discard any previously persisted Merkle state and do a full pass
        #[arg(long)]
        force: bool,
    },
    /// Reindex only the given repo-relative paths, rather than a full scan
    ReindexPaths {
        /// Repo-relative paths to reindex
        paths: Vec<String>,

        /// Repository root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Index a repository, then run one query against the resulting in-process store
    Query {
        /// Query text
        text: String,

        /// Repository root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Token budget for the assembled context (0 = configured default)
        #[arg(long, default_value = "0")]
        budget: usize,
    },
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
        .canonicalize()
        .expect("path not found")
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, stopping..."),
            _ = sigterm.recv() => info!("received SIGTERM, stopping..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl-c");
        info!("received ctrl-c, stopping...");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("conexus=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Index { root, force } => run_index(resolve_root(root), force, cli.json).await,
        Commands::ReindexPaths { paths, root } => run_reindex_paths(resolve_root(root), paths, cli.json).await,
        Commands::Query { text, root, budget } => run_query(resolve_root(root), text, budget, cli.json).await,
    };

    std::process::exit(exit_code);
}

async fn run_index(root: PathBuf, force: bool, json: bool) -> i32 {
    let cfg = ConexusConfig::load(root.clone()).unwrap_or_else(|_| ConexusConfig::new(root.clone()));
    let vector_store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let inverted_index: Arc<dyn InvertedIndex> = Arc::new(MemoryInvertedIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    let indexer = Indexer::with_store_batch_size(
        Some(embedder),
        vector_store,
        inverted_index,
        Arc::new(NullInvalidator),
        cfg.embed_batch_size,
        cfg.store_batch_size,
    );
    let controller = Arc::new(IndexController::new(indexer, &root.join(".conexus/state.json")));

    let run_controller = controller.clone();
    let run_cfg = cfg.clone();
    let handle = tokio::task::spawn_blocking(move || {
        if force {
            run_controller.force_reindex(&run_cfg)
        } else {
            run_controller.start(&run_cfg)
        }
    });

    tokio::pin!(handle);
    let result = tokio::select! {
        result = &mut handle => result.expect("index task panicked"),
        _ = shutdown_signal() => {
            controller.stop();
            match tokio::time::timeout(SHUTDOWN_DEADLINE, handle).await {
                Ok(result) => result.expect("index task panicked"),
                Err(_) => {
                    error!("index pass did not stop within the shutdown deadline");
                    return 1;
                }
            }
        }
    };
    // (the timeout branch above re-polls the same pinned `handle`, which is why
    // it's taken by `&mut` in both select arms rather than consumed)

    match result {
        Ok(status) => {
            print_status(&status, json);
            0
        }
        Err(e) => {
            error!(error = %e, "index pass failed");
            1
        }
    }
}

fn print_status(status: &conexus_core::controller::Status, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "phase": format!("{:?}", status.phase),
                "files_processed": status.files_processed,
                "files_total": status.files_total,
                "chunks_created": status.chunks_created,
                "progress_pct": status.progress_pct,
            })
        );
    } else {
        println!("phase:          {:?}", status.phase);
        println!("files indexed:  {} / {}", status.files_processed, status.files_total);
        println!("chunks emitted: {}", status.chunks_created);
    }
}

async fn run_reindex_paths(root: PathBuf, paths: Vec<String>, json: bool) -> i32 {
    let cfg = ConexusConfig::load(root.clone()).unwrap_or_else(|_| ConexusConfig::new(root.clone()));
    let vector_store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let inverted_index: Arc<dyn InvertedIndex> = Arc::new(MemoryInvertedIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    let indexer = Indexer::with_store_batch_size(
        Some(embedder),
        vector_store,
        inverted_index,
        Arc::new(NullInvalidator),
        cfg.embed_batch_size,
        cfg.store_batch_size,
    );
    let controller = Arc::new(IndexController::new(indexer, &root.join(".conexus/state.json")));

    // ReindexPaths only makes sense against an already-persisted state; run a
    // full pass first so there's something for the per-path loop to replace.
    let seed_controller = controller.clone();
    let seed_cfg = cfg.clone();
    if let Err(e) =
        tokio::task::spawn_blocking(move || seed_controller.start(&seed_cfg)).await.expect("index task panicked")
    {
        error!(error = %e, "initial index pass failed");
        return 1;
    }

    let run_controller = controller.clone();
    let run_cfg = cfg.clone();
    let handle = tokio::task::spawn_blocking(move || run_controller.reindex_paths(&run_cfg, &paths));

    tokio::pin!(handle);
    let result = tokio::select! {
        result = &mut handle => result.expect("reindex task panicked"),
        _ = shutdown_signal() => {
            controller.stop();
            match tokio::time::timeout(SHUTDOWN_DEADLINE, handle).await {
                Ok(result) => result.expect("reindex task panicked"),
                Err(_) => {
                    error!("reindex pass did not stop within the shutdown deadline");
                    return 1;
                }
            }
        }
    };

    match result {
        Ok(status) => {
            print_status(&status, json);
            0
        }
        Err(e) => {
            error!(error = %e, "reindex pass failed");
            1
        }
    }
}

async fn run_query(root: PathBuf, text: String, budget: usize, json: bool) -> i32 {
    let cfg = ConexusConfig::load(root.clone()).unwrap_or_else(|_| ConexusConfig::new(root.clone()));
    let vector_store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let inverted_index: Arc<dyn InvertedIndex> = Arc::new(MemoryInvertedIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    let cache = Arc::new(Cache::new(
        cfg.cache_t1_capacity,
        cfg.cache_t1_ttl_secs,
        Box::new(NullSharedCache),
        cfg.cache_t2_ttl_secs,
        None,
        cfg.cache_t3_ttl_secs,
    ));

    let indexer = Indexer::with_store_batch_size(
        Some(embedder.clone()),
        vector_store.clone(),
        inverted_index.clone(),
        Arc::new(NullInvalidator),
        cfg.embed_batch_size,
        cfg.store_batch_size,
    );
    let controller = IndexController::new(indexer, &root.join(".conexus/state.json"));

    let index_cfg = cfg.clone();
    let indexed = tokio::task::spawn_blocking(move || controller.start(&index_cfg))
        .await
        .expect("index task panicked");
    if let Err(e) = indexed {
        error!(error = %e, "indexing failed before query could run");
        return 1;
    }

    let engine = QueryEngine::new(embedder, vector_store, inverted_index, cache, create_tokenizer("bytes-estimate"), cfg);

    let query_text = text.clone();
    let result = tokio::task::spawn_blocking(move || engine.query(&query_text, budget, now_unix()))
        .await
        .expect("query task panicked");

    match result {
        Ok(assembled) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&assembled).unwrap());
            } else {
                println!(
                    "{} chunk(s), {} tokens, coherence {:.2}",
                    assembled.chunks.len(),
                    assembled.total_tokens,
                    assembled.coherence_score
                );
                if let Some(reason) = assembled.degraded {
                    println!("(degraded: {reason})");
                }
                for chunk in &assembled.chunks {
                    println!("\n--- {} ({}:{}) ---", chunk.file_path, chunk.start_line, chunk.end_line);
                    println!("{}", chunk.content);
                }
            }
            0
        }
        Err(ConexusError::RetrievalUnavailable) => {
            error!("both retrieval arms failed");
            1
        }
        Err(e) => {
            error!(error = %e, "query failed");
            1
        }
    }
}
