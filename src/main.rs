//! # Idea Pipeline CLI (`ideas`)
//!
//! ## Usage
//!
//! ```bash
//! ideas --config ./config/ideas.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ideas init` | Create the SQLite database and run schema migrations |
//! | `ideas serve` | Start the HTTP API (and the embedded worker if enabled) |
//! | `ideas worker` | Run the queue consumer on its own |
//! | `ideas get <id>` | Print one idea with every field |
//! | `ideas leaderboard` | Print the top scored public ideas |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use idea_pipeline::{config, migrate, server, views, worker};

/// Idea Pipeline CLI: submit, score, and rank short startup ideas.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ideas.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ideas",
    about = "Idea Pipeline: score startup ideas with an external analysis service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ideas.toml")]
    config: PathBuf,

    /// Log level for this crate when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API.
    Serve,

    /// Run the queue consumer until Ctrl-C.
    Worker,

    /// Print one idea by id.
    Get {
        /// Idea UUID.
        id: String,
    },

    /// Print the leaderboard.
    Leaderboard {
        /// Number of rows (1-100).
        #[arg(long)]
        limit: Option<i64>,
    },
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("idea_pipeline={},warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Worker => {
            worker::run_worker(&cfg).await?;
        }
        Commands::Get { id } => {
            views::run_get(&cfg, &id).await?;
        }
        Commands::Leaderboard { limit } => {
            views::run_leaderboard(&cfg, limit).await?;
        }
    }

    Ok(())
}
