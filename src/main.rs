//! # Study Harness CLI (`study`)
//!
//! ## Usage
//!
//! ```bash
//! study --config ./config/study.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `study serve` | Start the HTTP API server |
//! | `study ingest <user>` | Bring a user's vector index up to date with their files |
//! | `study files <user>` | List a user's stored documents |
//! | `study clear <user>` | Delete everything stored for a user |
//! | `study sweep` | Remove expired cache entries |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use study_harness::cache::ContentCache;
use study_harness::chunk::Splitter;
use study_harness::config::{self, Config};
use study_harness::embedding::create_embedder;
use study_harness::pipeline::{DocumentPipeline, IndexStatus};
use study_harness::server;
use study_harness::workspace::WorkspaceManager;

/// Study Harness CLI: quizzes and notes from lecture documents and videos.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/study.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "study", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used when it does not exist.
    #[arg(long, global = true, default_value = "./config/study.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Ingest new or changed documents for a user.
    ///
    /// Only files whose modification time changed since the last run are
    /// extracted and embedded; removed files are dropped from the index.
    Ingest {
        /// User id (letters, digits, `_` and `-`).
        user: String,
    },

    /// List a user's stored documents.
    Files { user: String },

    /// Delete a user's documents, index, and ledger.
    Clear { user: String },

    /// Remove expired and corrupt cache entries.
    Sweep,
}

fn pipeline_for(cfg: &Config) -> anyhow::Result<DocumentPipeline> {
    Ok(DocumentPipeline::new(
        WorkspaceManager::new(&cfg.storage.base_dir),
        create_embedder(&cfg.embedding)?,
        Splitter::from_config(&cfg.chunking),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { user } => {
            let summary = pipeline_for(&cfg)?.ingest(&user).await?;
            println!("ingest {}", user);
            println!("  new/updated: {}", summary.delta.new_or_updated.len());
            println!("  removed: {}", summary.delta.removed.len());
            match summary.status {
                IndexStatus::NoDocuments => println!("  index: removed (no documents)"),
                IndexStatus::Unchanged => println!("  index: unchanged"),
                IndexStatus::Updated => println!("  index: updated"),
            }
            println!("  chunks added: {}", summary.chunks_added);
            println!("  chunks total: {}", summary.chunks_total);
        }
        Commands::Files { user } => {
            let files = WorkspaceManager::new(&cfg.storage.base_dir).list_documents(&user)?;
            println!("files {}", user);
            for f in &files {
                if let Some(name) = f.file_name() {
                    println!("  {}", name.to_string_lossy());
                }
            }
            println!("  count: {}", files.len());
        }
        Commands::Clear { user } => {
            WorkspaceManager::new(&cfg.storage.base_dir).destroy(&user)?;
            println!("All data cleared for user {}", user);
        }
        Commands::Sweep => {
            let cache = ContentCache::new(&cfg.storage.cache_dir, cfg.cache.ttl_secs)?;
            let removed = cache.sweep()?;
            println!("sweep");
            println!("  removed: {}", removed);
        }
    }

    Ok(())
}
