//! Stockings CLI
//!
//! Thin wrapper around stockings-core functions for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create the local identity
//! stockings init
//!
//! # Publish a directory as archive "photos", version 1
//! stockings add ~/photos 1
//!
//! # Replicate through the broker until Ctrl-C
//! stockings run --broker wss://stockings-server.herokuapp.com
//!
//! # Inspect and manage stored archives
//! stockings list
//! stockings get-version photos
//! stockings remove photos
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stockings_core::{Node, NodeConfig, StockingsError, DEFAULT_BROKER, DEFAULT_IDENTITY};
use url::Url;

/// Stockings - replicate signed archives through a relay
#[derive(Parser)]
#[command(name = "stockings")]
#[command(version)]
#[command(about = "Stockings - replicate signed archives through a relay")]
#[command(
    long_about = "Publishes directories as signed, versioned archives and keeps them in sync with other nodes through a WebSocket broker. The first publisher of a name is the only one trusted for it."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Data directory (default: ~/.stockings)
    #[arg(short, long, global = true, env = "STOCKINGS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local identity if it does not exist
    Init {
        /// Identity name
        #[arg(long, default_value = DEFAULT_IDENTITY)]
        id: String,
    },

    /// Run the sync daemon
    Run {
        /// Broker URL
        #[arg(short, long, env = "STOCKINGS_BROKER", default_value = DEFAULT_BROKER)]
        broker: Url,

        /// Identity name
        #[arg(long, default_value = DEFAULT_IDENTITY)]
        id: String,

        /// Seconds between keepalives
        #[arg(long, default_value_t = 8)]
        heartbeat_secs: u64,

        /// Publish archives added while running every N seconds
        #[arg(long)]
        rescan_secs: Option<u64>,

        /// Do not publish archives missing from peer announcements
        #[arg(long)]
        no_answer_announcements: bool,
    },

    /// Pack, sign and store a directory as an archive
    Add {
        /// Directory to publish; its name becomes the archive name
        dir: PathBuf,

        /// Version of this archive (must increase for peers to accept it)
        version: String,

        /// Identity name
        #[arg(long, default_value = DEFAULT_IDENTITY)]
        id: String,
    },

    /// Remove an archive and release its publisher pin
    Remove {
        /// Archive name
        name: String,
    },

    /// List stored archives
    List,

    /// Print the stored version of an archive
    GetVersion {
        /// Archive name
        name: String,
    },
}

impl Commands {
    fn default_level(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "info",
            _ => "warn",
        }
    }
}

fn setup_logging(verbosity: u8, json: bool, default_level: &str) {
    let filter = match verbosity {
        0 => default_level,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Get the default data directory (~/.stockings)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stockings")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.json_logs, cli.command.default_level());

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let mut config = NodeConfig::new(&data_dir);

    if let Commands::Run {
        broker,
        heartbeat_secs,
        rescan_secs,
        no_answer_announcements,
        ..
    } = &cli.command
    {
        if *heartbeat_secs == 0 {
            anyhow::bail!("--heartbeat-secs must be at least 1");
        }
        config.broker = broker.clone();
        config.session.heartbeat_interval = Duration::from_secs(*heartbeat_secs);
        config.session.rescan_interval = rescan_secs.filter(|s| *s > 0).map(Duration::from_secs);
        config.session.answer_announcements = !no_answer_announcements;
    }

    let node = Node::open(config)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

    match cli.command {
        Commands::Init { id } => {
            let (identity, created) = node.init_identity(&id)?;
            if created {
                println!("Created identity '{}'.", identity.name);
            } else {
                println!("Identity '{}' already exists.", identity.name);
            }
            println!("  Fingerprint: {}", identity.public_key.fingerprint());
            println!("  Directory: {}", node.config().ids_dir().display());
        }

        Commands::Run { id, .. } => {
            let identity = node.load_identity(&id)?;
            tracing::info!(
                identity = %identity.name,
                fingerprint = %identity.public_key.fingerprint(),
                data_dir = %data_dir.display(),
                "Starting daemon"
            );
            node.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        }

        Commands::Add { dir, version, id } => {
            let accepted = node
                .add(&dir, &version, &id)
                .await
                .map_err(|e| match e {
                    StockingsError::KeyMismatch(name) => anyhow::anyhow!(
                        "Archive '{}' is pinned to another publisher; run `stockings remove {}` first",
                        name,
                        name
                    ),
                    other => other.into(),
                })
                .with_context(|| format!("Failed to add {}", dir.display()))?;
            println!("Added archive '{}' at version {}.", accepted.name, accepted.version);
        }

        Commands::Remove { name } => {
            node.remove(&name)?;
            println!("Removed archive '{}'.", name);
        }

        Commands::List => {
            let names = node.list()?;
            if names.is_empty() {
                eprintln!("No archives.");
            }
            for name in names {
                println!("{}", name);
            }
        }

        Commands::GetVersion { name } => {
            println!("{}", node.get_version(&name)?);
        }
    }

    Ok(())
}
