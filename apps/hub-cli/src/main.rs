//! ClickerHub operator binary.

mod config;
mod consumers;
mod shell;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use clickerhub_hub_consumers::ConsumerRegistry;
use clickerhub_hub_core::Hub;

use config::{DelimiterSet, HubConfig};

/// Connects a response-collection session server to local result consumers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session server host; connects at startup when set
    #[arg(short, long, env = "CLICKERHUB_SERVER")]
    server: Option<String>,

    /// Admin name sent at login
    #[arg(long)]
    admin: Option<String>,

    /// Identifier sent at login
    #[arg(long)]
    id: Option<String>,

    /// Login port of the session server
    #[arg(short, long)]
    port: Option<u16>,

    /// Delimiter set spoken by the server
    #[arg(long, value_enum)]
    delimiters: Option<DelimiterSet>,

    /// Configuration file (defaults to ~/.config/clickerhub/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut HubConfig) {
        if let Some(server) = &self.server {
            config.server_address = server.clone();
        }
        if let Some(admin) = &self.admin {
            config.admin = admin.clone();
        }
        if let Some(id) = &self.id {
            config.id = id.clone();
        }
        if let Some(port) = self.port {
            config.login_port = port;
        }
        if let Some(delimiters) = self.delimiters {
            config.delimiters = delimiters;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clickerhub=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => HubConfig::load_from(path)?,
        None => HubConfig::load()?,
    };
    args.apply(&mut config);

    let registry = Arc::new(ConsumerRegistry::new());
    consumers::register_samples(&registry).await?;
    if !config.disabled_consumers.is_empty() {
        let selection: BTreeMap<String, bool> = config
            .disabled_consumers
            .iter()
            .map(|key| (key.clone(), false))
            .collect();
        if let Err(e) = registry.apply_selection(&selection).await {
            tracing::warn!(error = %e, "ignoring disabled_consumers");
        }
    }

    let hub = Hub::new(config.credentials(), registry, config.hub_options());
    let events = hub.spawn();
    tracing::info!(id = %config.id, "ClickerHub started");

    if !config.server_address.is_empty()
        && let Err(e) = hub.set_server_address(&config.server_address).await
    {
        tracing::warn!(address = %config.server_address, error = %e, "initial connect failed");
    }

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = shell::run(hub.clone(), stdin, tokio::io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    hub.shutdown().await;
    events.await??;
    Ok(())
}
