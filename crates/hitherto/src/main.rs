//! # hitherto CLI
//!
//! ```bash
//! hitherto --config ./config/hitherto.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hitherto init` | Create the SQLite database and schema |
//! | `hitherto context "<query>"` | Assemble context and print it |
//! | `hitherto serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered by `RUST_LOG`
//! (default `hitherto=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use hitherto::context::{run_context, ContextArgs};
use hitherto::{config, migrate, server};

/// Context retrieval for the hitherto newsletter research dashboard.
#[derive(Parser)]
#[command(name = "hitherto", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hitherto.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Assemble context for a query and print it.
    ///
    /// `--doc` pins documents (explicit mode) and overrides every filter.
    /// Otherwise `--category`, `--since`, and `--until` restrict the search.
    Context {
        /// Query text.
        query: String,

        /// Restrict to a category. Repeat for any-of matching.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Only newsletters received on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only newsletters received on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Pin a document by message id. Repeatable.
        #[arg(long = "doc")]
        documents: Vec<String>,

        /// Maximum number of chunks (clamped to `retrieval.max_k`).
        #[arg(short = 'k', long, allow_negative_numbers = true)]
        k: Option<i64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hitherto=info,tower_http=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Context {
            query,
            categories,
            since,
            until,
            documents,
            k,
        } => {
            let args = ContextArgs {
                query,
                categories,
                since,
                until,
                documents,
                k,
            };
            run_context(&cfg, &args).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
