use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Archive a chat server's channels, threads and media to disk.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./hoard.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest messages and media from the configured server
    Harvest {
        /// Comma-separated channel ids. If omitted, harvests every
        /// text, forum and media channel.
        #[arg(long, value_delimiter = ',', value_name = "IDS")]
        channels: Option<Vec<String>>,

        /// Messages per channel (threads per forum/media channel)
        #[arg(long, default_value_t = hoard_core::DEFAULT_MESSAGE_LIMIT)]
        limit: usize,
    },

    /// List the server's channels with their ids and types
    Channels,

    /// Delete the stored session token
    Logout,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,hoard=info,hoard_core=info,hoard_auth_bridge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Harvest { channels, limit } => commands::harvest::run(channels, limit, config).await,
        Commands::Channels => commands::channels::run(config).await,
        Commands::Logout => commands::logout::run(config),
    };

    if let Err(e) = result {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
