mod cli;
mod config;
mod db;
mod embedding;
mod error;
mod memory;
mod sector;
mod server;
mod vector;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::HsgConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hsg", version, about = "Hierarchical Sector Graph memory engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Run an HSG query from the terminal
    Query {
        /// Natural language query text
        query: String,
        /// Scope the query to one tenant
        #[arg(long)]
        user: Option<String>,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Ingest a local file or URL
    Ingest {
        /// Path to a local file, or an http(s) URL
        source: String,
        /// Tenant to attribute the ingested memories to
        #[arg(long)]
        user: Option<String>,
    },
    /// Display per-user memory statistics
    Stats {
        /// Tenant to report on
        user: String,
    },
    /// Inspect a memory by ID
    Inspect {
        /// Memory ID to inspect
        id: String,
    },
    /// Run one decay/compression sweep immediately
    Decay,
    /// Run one reflection pass for a user immediately
    Reflect {
        /// Tenant to reflect on
        user: String,
    },
    /// Run database diagnostics and print a health report
    Doctor,
    /// Delete all memories for a tenant (requires confirmation)
    Reset {
        /// Tenant to wipe
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HsgConfig::load()?;

    let filter = EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Query { query, user, k } => {
            cli::query::query(&config, &query, user.as_deref(), k).await?;
        }
        Command::Ingest { source, user } => {
            cli::ingest::ingest(&config, &source, user.as_deref()).await?;
        }
        Command::Stats { user } => {
            cli::stats::stats(&config, &user)?;
        }
        Command::Inspect { id } => {
            cli::inspect::inspect(&config, &id)?;
        }
        Command::Decay => {
            cli::decay::decay(&config).await?;
        }
        Command::Reflect { user } => {
            cli::reflect::reflect(&config, &user)?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
        Command::Reset { user } => {
            cli::reset::reset(&config, &user)?;
        }
    }

    Ok(())
}
