//! # Sentiment Harness CLI (`senti`)
//!
//! The `senti` binary is the operational interface for Sentiment Harness.
//! It provides commands for database initialization, scope (scenario)
//! management, running analysis batches, cache inspection, and starting the
//! HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! senti --config ./config/senti.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `senti init` | Create the SQLite database and run schema migrations |
//! | `senti scope add` | Register a scope (scenario) with an owner |
//! | `senti scope list` | List registered scopes |
//! | `senti scope clear <id>` | Delete a scope's cached items and analyses |
//! | `senti analyze` | Analyze a batch of texts under a scope |
//! | `senti cache stats` | Show cache row counts |
//! | `senti serve` | Start the HTTP API server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use sentiment_harness::analyzer::create_analyzer;
use sentiment_harness::config::{load_config, Config};
use sentiment_harness::db::StoreHandle;
use sentiment_harness::engine::AnalysisEngine;
use sentiment_harness::executor::QueryExecutor;
use sentiment_harness::{migrate, server, store};

/// Sentiment Harness CLI — a cached batch sentiment analysis engine for
/// free-text feedback.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/senti.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "senti",
    about = "Sentiment Harness — a cached batch sentiment analysis engine for free-text feedback",
    version,
    long_about = "Sentiment Harness fingerprints free-text items, serves previously computed LLM \
    analyses out of a content-addressed SQLite cache, calls the external analyzer only for the \
    misses, and reports per-item results in input order with aggregate sentiment statistics."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/senti.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (scopes,
    /// items, analyses). This command is idempotent — running it multiple
    /// times is safe.
    Init,

    /// Manage scopes (scenarios).
    ///
    /// A scope partitions the analysis cache and is owned by one principal;
    /// every analysis request is checked against that ownership.
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },

    /// Analyze a batch of texts.
    ///
    /// Texts come from positional arguments or, with `--file`, one per line
    /// from a file. Cached items are served without an analyzer call; only
    /// the misses are submitted, in one batched request.
    Analyze {
        /// Scope id under which to analyze.
        #[arg(long)]
        scope: String,

        /// Principal performing the request (must own the scope).
        #[arg(long)]
        principal: String,

        /// Texts to analyze.
        texts: Vec<String>,

        /// Read texts from a file, one per line (blank lines skipped).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Inspect the analysis cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `POST /analyze` and `GET /health`.
    Serve,
}

/// Scope management subcommands.
#[derive(Subcommand)]
enum ScopeAction {
    /// Register a new scope.
    Add {
        /// Human-readable scope name.
        #[arg(long)]
        name: String,
        /// Owning principal.
        #[arg(long)]
        owner: String,
    },
    /// List all registered scopes.
    List,
    /// Delete a scope's cached items and analyses.
    ///
    /// This is the only deletion path over the cache tables; normal
    /// operation never removes rows.
    Clear {
        /// Scope id to clear.
        id: String,
    },
}

/// Cache inspection subcommands.
#[derive(Subcommand)]
enum CacheAction {
    /// Show item and analysis row counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = StoreHandle::connect(&cfg.db).await?;
            migrate::run_migrations(&store).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Scope { action } => {
            let executor = connect_executor(&cfg).await?;
            match action {
                ScopeAction::Add { name, owner } => {
                    let scope = store::insert_scope(&executor, &name, &owner).await?;
                    println!("scope {}", scope.id);
                    println!("  name:  {}", scope.name);
                    println!("  owner: {}", scope.owner);
                }
                ScopeAction::List => {
                    let scopes = store::list_scopes(&executor).await?;
                    if scopes.is_empty() {
                        println!("No scopes registered.");
                    }
                    for scope in scopes {
                        println!("{}  {} (owner: {})", scope.id, scope.name, scope.owner);
                    }
                }
                ScopeAction::Clear { id } => {
                    let (analyses, items) = store::clear_scope(&executor, &id).await?;
                    println!("cleared scope {}", id);
                    println!("  analyses deleted: {}", analyses);
                    println!("  items deleted:    {}", items);
                }
            }
            executor.store().close().await;
        }
        Commands::Analyze {
            scope,
            principal,
            texts,
            file,
        } => {
            let mut batch = texts;
            if let Some(path) = file {
                let content = std::fs::read_to_string(&path)?;
                batch.extend(
                    content
                        .lines()
                        .filter(|line| !line.trim().is_empty())
                        .map(|line| line.to_string()),
                );
            }
            if batch.is_empty() {
                anyhow::bail!("No texts to analyze. Pass texts as arguments or use --file.");
            }

            let engine = build_engine(&cfg).await?;
            let result = engine.analyze_batch(&scope, &principal, &batch).await?;

            println!("analyzed {} items", result.total_items);
            println!("  mean confidence: {:.2}", result.mean_confidence);
            println!("  sentiment distribution:");
            for (label, count) in &result.sentiment_distribution {
                println!("    {:<12} {}", label, count);
            }
            if let Some(themes) = &result.themes {
                println!("  themes:");
                for theme in themes {
                    println!("    {:<24} {} ({})", theme.theme, theme.count, theme.sentiment);
                }
            }
            println!();
            for (index, record) in result.individual_results.iter().enumerate() {
                println!(
                    "[{}] {} ({:.2}) {}",
                    index,
                    record.sentiment,
                    record.confidence,
                    record.brief.as_deref().unwrap_or("")
                );
            }
            engine.executor().store().close().await;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => {
                let executor = connect_executor(&cfg).await?;
                let (items, analyses) = store::cache_stats(&executor).await?;
                println!("cache");
                println!("  items:    {}", items);
                println!("  analyses: {}", analyses);
                executor.store().close().await;
            }
        },
        Commands::Serve => {
            let engine = Arc::new(build_engine(&cfg).await?);
            server::run_server(&cfg.server.bind, engine).await?;
        }
    }

    Ok(())
}

async fn connect_executor(cfg: &Config) -> Result<QueryExecutor> {
    let store = StoreHandle::connect(&cfg.db).await?;
    Ok(QueryExecutor::new(store, &cfg.db))
}

async fn build_engine(cfg: &Config) -> Result<AnalysisEngine> {
    let executor = connect_executor(cfg).await?;
    let analyzer = create_analyzer(&cfg.analyzer)?;
    Ok(AnalysisEngine::new(executor, analyzer, &cfg.cache))
}
