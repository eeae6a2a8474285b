//! Wallet Collector Bot - collects Solana wallet addresses via Discord
//!
//! Members holding the configured OG or WL role register exactly one wallet
//! address each through a button panel; administrators export the collected
//! addresses as CSV.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use wallet_collector::cli::commands;
use wallet_collector::config::Config;

/// Wallet Collector Bot
#[derive(Parser)]
#[command(name = "collector")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Start,

    /// Show current configuration (secrets masked)
    Config,

    /// Export registered wallets to a CSV file
    Export {
        /// Output path (default: timestamped name in the working directory)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallet_collector=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; refuses to proceed without token and role ids
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Start => commands::start(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Export { output } => commands::export(&config, output).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
