// src/bin/trace-node.rs
use clap::{Parser, Subcommand};

use trace_indexer::config::Config;

#[derive(Parser)]
#[command(name = "trace-node", about = "Ledger trace indexing node", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trace indexing node
    Start {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // load .env for local development (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start {} => {
            let config = Config::from_env()?;
            trace_indexer::init_tracing(&config.log_level);
            trace_indexer::run(config).await
        }
    }
}
