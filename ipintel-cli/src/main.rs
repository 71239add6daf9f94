//! ipintel - IP intelligence dashboard client
//!
//! Manages provider API keys, submits IP batches for enrichment over the
//! streaming endpoint and works with the stored results (filter, delete,
//! export).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ipintel_common::config::{resolve_config, ConfigOverrides};
use ipintel_common::keys::Provider;
use ipintel_common::results::Column;

mod commands;
mod render;

use commands::App;

/// Command-line arguments for ipintel
#[derive(Parser, Debug)]
#[command(name = "ipintel")]
#[command(about = "IP intelligence dashboard client")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/ipintel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enrichment service base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Credential storage file
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },

    /// Submit IP addresses for enrichment
    Submit {
        /// Read addresses from a file, one per line
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Use the non-streaming endpoint
        #[arg(long)]
        legacy: bool,

        /// Credential to send instead of the stored primary key
        #[arg(long)]
        key: Option<String>,

        /// Addresses to submit
        ips: Vec<String>,
    },

    /// List enriched IP addresses
    List {
        /// Column filter, e.g. `country=united` or `ports=443` (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(Column, String)>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show every stored field of one record
    Show { id: i64 },

    /// Delete records by id
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Export all records as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show plan and credits of the primary provider account
    Info,
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Show the status of every provider key
    List,

    /// Validate and store a provider key
    Add {
        /// shodan, virustotal or abuseipdb
        provider: Provider,

        /// Key value (read from stdin when omitted)
        key: Option<String>,
    },

    /// Delete a stored provider key
    Remove { provider: Provider },
}

fn parse_filter(raw: &str) -> std::result::Result<(Column, String), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TEXT, got '{}'", raw))?;
    let column = column.parse::<Column>().map_err(|e| e.to_string())?;
    Ok((column, value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        api_url: args.api_url.clone(),
        storage_path: args.storage.clone(),
        log_level: args.log_level.clone(),
    };
    let config = resolve_config(&overrides).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ipintel={0},ipintel_common={0}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ipintel v{}", env!("CARGO_PKG_VERSION"));
    debug!(api_url = %config.api_url, storage = %config.storage_file().display(), "Configuration resolved");

    let mut app = App::new(&config)?;

    match args.command {
        Command::Keys { action } => match action {
            KeysCommand::List => app.keys_list(),
            KeysCommand::Add { provider, key } => app.keys_add(provider, key).await,
            KeysCommand::Remove { provider } => app.keys_remove(provider),
        },
        Command::Submit {
            file,
            legacy,
            key,
            ips,
        } => app.submit(file, legacy, key, ips).await,
        Command::List { filters, json } => app.list(filters, json).await,
        Command::Show { id } => app.show(id).await,
        Command::Delete { ids } => app.delete(ids).await,
        Command::Export { output } => app.export(output).await,
        Command::Info => app.info().await,
    }
}
