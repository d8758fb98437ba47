mod config_cmd;
mod query_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use nodebridge_config::{config_dir, config_file_path};

#[derive(Parser)]
#[command(name = "nodebridge")]
#[command(about = "NodeBridge: run cross-thread node queries against a tree fixture")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.nodebridge/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a tree and run queries against it through the dispatcher
    Query(query_cmd::QueryArgs),
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));

    match cli.command {
        Commands::Query(args) => query_cmd::run(&config_path, args).await,
        Commands::Config { action } => config_cmd::run(&config_path, action).await,
    }
}
