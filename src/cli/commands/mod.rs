mod subcommands;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use crate::config::{Config, load_config};
use crate::store::{self, DataStore, MemoryStore};
use crate::sync::ChangeFeed;

#[derive(Parser)]
#[command(name = "leaddesk")]
#[command(about = "Sales dashboard backend for WhatsApp lead conversations")]
pub struct Cli {
    /// Config file (default: ~/.leaddesk/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway (webhook proxy, dashboard API, change ingress)
    Serve {
        /// Serve from an in-process store instead of the hosted one
        #[arg(long)]
        memory: bool,
        /// JSON file shaped `{"table": [rows]}` loaded into the in-process store
        #[arg(long, requires = "memory")]
        seed: Option<PathBuf>,
        /// Override gateway.port
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// List leads
    Leads {
        /// novo, interessado or pronto_para_comprar
        #[arg(long)]
        status: Option<String>,
        /// Score band: high, medium, low or all
        #[arg(long)]
        score: Option<String>,
        /// Name or phone substring
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    /// List campaigns
    Campaigns {
        /// Only campaigns running now
        #[arg(long, short = 'a')]
        active: bool,
    },
    /// Follow a lead's conversation and send messages to it
    Chat {
        lead_id: String,
        /// Start in manual mode (replies are sent as the operator)
        #[arg(long, short = 'm')]
        manual: bool,
        /// Gateway whose change stream triggers refreshes (default: gateway.host:gateway.port)
        #[arg(long)]
        gateway: Option<String>,
        /// Refresh on the interval only, without following a gateway
        #[arg(long, conflicts_with = "gateway")]
        no_push: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { memory, seed, port } => {
            serve(config, memory, seed.as_deref(), port).await?;
        }
        Commands::Leads {
            status,
            score,
            search,
        } => {
            subcommands::leads(&config, status, score, search).await?;
        }
        Commands::Campaigns { active } => {
            subcommands::campaigns(&config, active).await?;
        }
        Commands::Chat {
            lead_id,
            manual,
            gateway,
            no_push,
        } => {
            let push_from = (!no_push).then(|| gateway.unwrap_or_else(|| config.gateway.base_url()));
            subcommands::chat(&config, &lead_id, manual, push_from.as_deref()).await?;
        }
    }

    Ok(())
}

/// The hosted store, initialized once for the process.
fn open_store(config: &Config) -> Result<Arc<dyn DataStore>> {
    let store: Arc<dyn DataStore> =
        store::init(&config.store).context("Failed to initialize the data store")?;
    Ok(store)
}

/// Fill `store` from a `{"table": [rows]}` JSON file.
fn load_seed(store: &MemoryStore, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let tables: HashMap<String, Vec<Value>> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
    let mut total = 0;
    for (table, rows) in tables {
        total += rows.len();
        store.seed(&table, rows);
    }
    Ok(total)
}

async fn serve(
    mut config: Config,
    memory: bool,
    seed: Option<&Path>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(port) = port {
        anyhow::ensure!(port != 0, "--port must be non-zero");
        config.gateway.port = port;
    }

    let store: Arc<dyn DataStore> = if memory {
        let store = MemoryStore::new();
        if let Some(path) = seed {
            let rows = load_seed(&store, path)?;
            info!("seeded in-process store with {} rows", rows);
        }
        info!("serving from the in-process store");
        Arc::new(store)
    } else {
        open_store(&config)?
    };

    let feed = ChangeFeed::default();
    let (server, _state) = crate::gateway::start(&config, store, feed).await?;
    println!(
        "leaddesk gateway on http://{}:{} (Ctrl+C to stop)",
        config.gateway.host, config.gateway.port
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        _ = server => {}
    }

    Ok(())
}
