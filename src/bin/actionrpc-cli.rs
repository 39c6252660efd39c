//! actionrpc CLI - Command-line interface for the action runtime
//!
//! Provides subcommands for listing and describing actions and for
//! submitting request batches against the sample things domain.

use actionrpc::RuntimeConfig;
use actionrpc::runtime::config::{load_or_default, write_config};
use actionrpc::service::{Reply, reply};
use actionrpc::things;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "actionrpc")]
#[command(about = "Batched, schema-validated action dispatch", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Act as this caller instead of the configured one
    #[arg(long = "as")]
    caller: Option<String>,

    /// Grant the caller a permission (repeatable)
    #[arg(short, long = "permission")]
    permissions: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the actions the caller may view
    Actions,

    /// Describe one action
    Action {
        /// Action id
        id: String,
    },

    /// Submit a request or batch; reads stdin when no payload is given
    Submit {
        /// JSON payload
        payload: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_or_default(cli.config.as_deref())?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    if let Some(name) = cli.caller {
        config.caller.name = name;
    }
    config.caller.permissions.extend(cli.permissions);
    let caller = config.caller.clone();

    let (runtime, _store) = things::sample_runtime(config)?;

    let reply = match cli.command {
        Commands::InitConfig { path } => {
            write_config(&path, &RuntimeConfig::default())?;
            println!("Wrote default configuration to {:?}", path);
            return Ok(());
        }
        Commands::Actions => reply::list(&runtime, &caller),
        Commands::Action { id } => reply::describe(&runtime, &id, &caller),
        Commands::Submit { payload } => {
            let payload = match payload {
                Some(payload) => payload,
                None => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("Failed to read payload from stdin")?;
                    buffer
                }
            };
            reply::submit(&runtime, &payload, &caller)
        }
    };

    print_reply(&reply)
}

fn print_reply(reply: &Reply) -> Result<()> {
    eprintln!("status: {}", reply.status);
    if let Some(body) = &reply.body {
        println!(
            "{}",
            serde_json::to_string_pretty(body).context("Failed to render reply body")?
        );
    }
    Ok(())
}
