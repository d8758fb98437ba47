//! `nodebridge config`: show the effective config or write a default one.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use nodebridge_config::{apply_all_defaults, load_and_prepare, write_config, NodeBridgeConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective config (file, env overrides and defaults) as YAML
    Show,
    /// Write a config file filled with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_and_prepare(config_path).await?;
            let yaml = serde_yaml::to_string(&config).context("Failed to render config")?;
            println!("# {}", config_path.display());
            print!("{yaml}");
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            let config = apply_all_defaults(NodeBridgeConfig::default());
            write_config(&config, config_path).await?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}
