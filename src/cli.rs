//! Command-line interface.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::server;

/// Command-line interface for the registry server
#[derive(Parser)]
#[command(name = "tagship")]
#[command(about = "npm-compatible package registry serving git repositories", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the registry server
    Serve {
        /// Address to bind to for listening
        #[arg(long)]
        addr: Option<String>,
        /// Storage directory with one bare git repository per package
        #[arg(long)]
        storage_dir: Option<PathBuf>,
        /// Upstream CommonJS registry; pass an empty string to disable the
        /// fallback
        #[arg(long)]
        upstream_url: Option<String>,
        /// Capacity of the SHA-1 digest cache
        #[arg(long)]
        sha_cache_size: Option<usize>,
        /// Canonical front-facing base URL used in tarball links
        #[arg(long)]
        front_addr: Option<String>,
        /// Path to TLS certificate file
        #[arg(long)]
        cert_file: Option<String>,
        /// Path to TLS key file
        #[arg(long)]
        key_file: Option<String>,
        /// JSON configuration file; flags override its values
        #[arg(long, default_value = "tagship.json")]
        config: PathBuf,
    },
}

/// Parses arguments and executes the selected command.
pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagship=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            storage_dir,
            upstream_url,
            sha_cache_size,
            front_addr,
            cert_file,
            key_file,
            config,
        } => {
            let mut cfg = Config::load_or_default(&config)?;
            if let Some(addr) = addr {
                cfg.addr = addr;
            }
            if let Some(dir) = storage_dir {
                cfg.storage_dir = dir;
            }
            if let Some(url) = upstream_url {
                cfg.upstream_url = url;
            }
            if let Some(size) = sha_cache_size {
                cfg.sha_cache_size = size;
            }
            if let Some(front) = front_addr {
                cfg.front_addr = front;
            }
            if let Some(cert) = cert_file {
                cfg.cert_file = cert;
            }
            if let Some(key) = key_file {
                cfg.key_file = key;
            }

            info!(
                version = env!("CARGO_PKG_VERSION"),
                addr = %cfg.addr,
                storage_dir = %cfg.storage_dir.display(),
                upstream_url = %cfg.upstream_url,
                sha_cache_size = cfg.sha_cache_size,
                "starting tagship"
            );
            server::run(cfg).await
        }
    }
}
