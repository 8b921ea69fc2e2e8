//! Shelf CLI
//!
//! Command-line harness for the Shelf sync client.
//!
//! # Commands
//!
//! - `sync` - run one full synchronization pass
//! - `fetch` - download content for one record on demand
//! - `status` - show mirror and queue counts
//! - `queue` - list undelivered mutations

mod commands;

use clap::{Parser, Subcommand};
use shelf_engine::{HttpTransport, SyncClient, SyncConfig};
use shelf_protocol::ContentKind;
use shelf_store::{FileBlobStore, FileQueueStore, FileRecordStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Shelf command-line client.
#[derive(Parser)]
#[command(name = "shelf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local mirror
    #[arg(global = true, short, long, default_value = "shelf-data")]
    data_dir: PathBuf,

    /// Base URL of the remote authority
    #[arg(global = true, short, long, default_value = "https://shelf.example.com")]
    server: String,

    /// Bearer credential (falls back to the SHELF_TOKEN environment variable)
    #[arg(global = true, short, long)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full synchronization pass
    Sync {
        /// Pre-fetch content of unread records
        #[arg(long)]
        prefetch: bool,

        /// Also pre-fetch source content of EPUB records
        #[arg(long)]
        source_prefetch: bool,
    },

    /// Download content for one record on demand
    Fetch {
        /// Record identifier
        id: String,

        /// Content stream (content, source)
        #[arg(short, long, default_value = "content")]
        kind: ContentKind,
    },

    /// Show mirror and queue counts
    Status,

    /// List undelivered mutations
    Queue,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(FileRecordStore::open(&cli.data_dir.join("records.json"))?);
    let blobs = Arc::new(FileBlobStore::open(&cli.data_dir.join("content"))?);
    let queue_store = Arc::new(FileQueueStore::open(&cli.data_dir.join("queue.json"))?);
    let transport = Arc::new(HttpTransport::new(&cli.server)?);

    let client = SyncClient::new(
        SyncConfig::new(&cli.server),
        store.clone(),
        blobs.clone(),
        queue_store.clone(),
        transport,
    );
    client.load()?;

    match cli.command {
        Commands::Sync {
            prefetch,
            source_prefetch,
        } => {
            let token = require_token(&cli)?;
            commands::sync::run(&client, &store, &token, prefetch, source_prefetch).await?;
        }
        Commands::Fetch { ref id, kind } => {
            let token = require_token(&cli)?;
            commands::fetch::run(&client, id, kind, &token).await?;
        }
        Commands::Status => {
            commands::status::run(&client, &store)?;
        }
        Commands::Queue => {
            commands::queue::run(&client)?;
        }
    }

    Ok(())
}

fn require_token(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    cli.token
        .clone()
        .or_else(|| std::env::var("SHELF_TOKEN").ok())
        .ok_or_else(|| "a bearer credential is required (--token or SHELF_TOKEN)".into())
}
