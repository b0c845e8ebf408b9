use anyhow::{Context, Result};
use clap::Parser;
use stash_config::{ConfigLoader, StashConfig};
use stash_store::{LocalCacheMiddleware, Store};
use std::sync::Arc;
use tracing::{debug, info};

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

fn load_config(cli: &Cli) -> Result<StashConfig> {
    let config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;
    debug!(backend = ?config.store.kind(), "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.to_string());
    logging::init_tracing(&log_level)?;

    let output = match &cli.command {
        Commands::ExpandKey { parts, namespace } => {
            serde_json::json!(commands::expand_key(parts, namespace.as_deref()))
        }
        command => {
            // No network client ships with the binary, so distributed configs fail here
            let store = Store::lookup(config.store.clone())
                .context("Failed to construct cache store")?;

            if config.local_cache && !cli.no_local_cache {
                let middleware = LocalCacheMiddleware::new(Arc::new(store));
                let command = command.clone();
                middleware
                    .scoped(|cache| async move { commands::execute(&*cache, &command).await })
                    .await?
            } else {
                commands::execute(&store, command).await?
            }
        }
    };

    info!("command completed");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
