//! Tally Agent
//!
//! Prints the plugin type catalogue or runs the agent with an initial set of
//! plugin instances.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package tally-agent -- types
//! cargo run --package tally-agent -- run --config tally.toml --plugins plugins.json
//! ```
//!
//! The plugins file holds a JSON array of create requests:
//!
//! ```json
//! [
//!   {"type_name": "inputs.cpu", "fields": {"percpu": false, "interval": "5s"}},
//!   {"type_name": "outputs.file", "fields": {"files": ["stdout"], "data_format": "json"}}
//! ]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tally::prelude::*;
use tally::runtime::{Agent, AgentSettings};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tally-agent", version, about = "Tally telemetry agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every plugin type with its configuration schema as JSON
    Types,
    /// Run the agent until Ctrl+C
    Run {
        /// Configuration file (defaults to tally.toml in the search paths)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Configuration profile, e.g. "production"
        #[arg(long)]
        profile: Option<String>,
        /// JSON file with plugin create requests
        #[arg(short, long)]
        plugins: Option<PathBuf>,
    },
}

fn print_types() -> Result<()> {
    let api = ConfigApi::new(
        Arc::new(tally::registry()),
        Arc::new(Agent::new(AgentSettings::default())),
    );
    let types = api.list_types()?;
    println!("{}", serde_json::to_string_pretty(&types)?);
    Ok(())
}

async fn run(config: Option<PathBuf>, profile: Option<String>, plugins: Option<PathBuf>) -> Result<()> {
    let mut builder = TallyRuntime::builder().registry(tally::registry());
    if let Some(path) = config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;

    runtime.api().hooks().on_plugin_added(|event| {
        info!(id = %event.id, plugin = ?event.type_name, "Plugin added");
    });
    runtime.api().hooks().on_plugin_removed(|event| {
        info!(id = %event.id, plugin = ?event.type_name, "Plugin removed");
    });

    if let Some(path) = plugins {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let requests: Vec<PluginConfigRequest> = serde_json::from_str(&text)
            .with_context(|| format!("invalid plugin requests in {}", path.display()))?;
        let ids = runtime.create_all(&requests)?;
        info!(count = ids.len(), "Created initial plugins");
    }

    runtime.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Types => print_types(),
        Command::Run {
            config,
            profile,
            plugins,
        } => run(config, profile, plugins).await,
    }
}
