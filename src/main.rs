//! # docshelf CLI
//!
//! The `docshelf` binary manages a local document library: ingest files,
//! search them with parent/child retrieval (falling back to web search when
//! local context is weak), and maintain the catalog.
//!
//! ## Usage
//!
//! ```bash
//! docshelf --config ./config/docshelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docshelf init` | Create the SQLite database and schema |
//! | `docshelf ingest <path>` | Ingest a file or directory |
//! | `docshelf search "<query>"` | Ranked context for a query |
//! | `docshelf list` | List documents |
//! | `docshelf delete <name>` | Delete a document and its chunks |
//! | `docshelf stats` | Document, chunk, and index counts |
//! | `docshelf check-duplicates` | Documents sharing content (or file name) |
//! | `docshelf get-source <name>` | Raw parent/child chunk dump |
//! | `docshelf toc <name>` | Show or recompute a table of contents |
//! | `docshelf reindex` | Re-embed every chunk with the current provider |
//!
//! ## Examples
//!
//! ```bash
//! docshelf init
//! docshelf ingest ./handbook
//! docshelf ingest ./handbook/onboarding.md --force
//! docshelf search "how do I rotate credentials" --top-k 3
//! docshelf search "release checklist" --local-only --json
//! docshelf delete onboarding.md --force
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docshelf::search::SearchOptions;
use docshelf::{catalog, config, get, ingest, logging, migrate, search, stats};

/// docshelf: a local document library with parent/child retrieval and
/// web-search fallback.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docshelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docshelf",
    about = "docshelf: a local document library with parent/child retrieval and web-search fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables. Idempotent.
    Init,

    /// Ingest a file or every matching file under a directory.
    ///
    /// Content already in the library is skipped unless `--force` is given.
    /// A file at a path that already holds a document replaces it.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Replace documents with identical content instead of skipping.
        #[arg(long)]
        force: bool,
    },

    /// Retrieve ranked context for a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Skip relevance grading and web fallback.
        #[arg(long)]
        local_only: bool,

        /// Print the full result (hits, state trace, completeness) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List documents in the library.
    List {
        /// Show hashes, chunk counts, and TOC sizes.
        #[arg(long)]
        detailed: bool,
    },

    /// Delete a document with its chunks and index entries.
    ///
    /// `<name>` is an id, an id prefix, a source path, a file name, or a title.
    Delete {
        name: String,

        /// Do not ask for confirmation.
        #[arg(long)]
        force: bool,
    },

    /// Show document, chunk, and index counts.
    Stats,

    /// Report groups of documents with identical content.
    CheckDuplicates {
        /// Also group documents sharing a file name across directories.
        #[arg(long)]
        by_name: bool,
    },

    /// Dump a document's parent and child chunks.
    GetSource {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Show a document's table of contents.
    Toc {
        name: String,

        /// Recompute through outline, heading, and model tiers.
        #[arg(long)]
        refresh: bool,
    },

    /// Re-embed every chunk with the configured provider.
    ///
    /// Run after switching embedding provider, model, or dimensions.
    Reindex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { path, force } => {
            ingest::run_ingest(&cfg, &path, force).await?;
        }
        Commands::Search {
            query,
            top_k,
            local_only,
            json,
        } => {
            let opts = SearchOptions {
                top_k,
                local_only,
                json,
            };
            search::run_search(&cfg, &query, &opts).await?;
        }
        Commands::List { detailed } => {
            catalog::run_list(&cfg, detailed).await?;
        }
        Commands::Delete { name, force } => {
            catalog::run_delete(&cfg, &name, force).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::CheckDuplicates { by_name } => {
            catalog::run_check_duplicates(&cfg, by_name).await?;
        }
        Commands::GetSource { name, json } => {
            get::run_get_source(&cfg, &name, json).await?;
        }
        Commands::Toc { name, refresh } => {
            catalog::run_toc(&cfg, &name, refresh).await?;
        }
        Commands::Reindex => {
            catalog::run_reindex(&cfg).await?;
        }
    }

    Ok(())
}
