//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::bot::Bot;
use crate::config::Config;
use crate::discord::{GatewayClient, GatewayConfig, RestClient};
use crate::registry::{self, JsonFileStorage, RoleConfig, WalletRegistry, WalletStorage};

/// Channel capacity for gateway events; interactions are low-volume
const EVENT_CHANNEL_CAPACITY: usize = 256;

fn build_registry(config: &Config) -> WalletRegistry {
    let storage = Arc::new(JsonFileStorage::new(&config.storage.wallets_path));
    WalletRegistry::new(
        storage,
        RoleConfig {
            og_role_id: config.roles.og_role_id,
            wl_role_id: config.roles.wl_role_id,
        },
    )
}

fn build_rest(config: &Config) -> Result<Arc<RestClient>> {
    let rest = RestClient::new(
        &config.discord.api_base,
        &config.discord.token,
        config.discord.request_timeout_ms,
    )
    .context("Failed to build Discord REST client")?;
    Ok(Arc::new(rest))
}

/// Run the bot
pub async fn start(config: &Config) -> Result<()> {
    info!("Starting wallet collector bot...");
    info!("Wallet snapshot: {}", config.storage.wallets_path);

    let rest = build_rest(config)?;
    let registry = build_registry(config);
    let bot = Bot::new(rest, registry, config.panel.scan_window);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let gateway = GatewayClient::new(
        GatewayConfig {
            url: config.discord.gateway_url.clone(),
            token: config.discord.token.clone(),
            reconnect_delay_ms: config.discord.reconnect_delay_ms,
            max_reconnect_attempts: config.discord.max_reconnect_attempts,
        },
        event_tx,
    );
    gateway.start();

    let result = bot.run(event_rx).await;
    gateway.stop();
    result.context("Bot event loop failed")
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Export the wallet store to a CSV file on disk.
///
/// Operator tool; display names are resolved over REST with the usual
/// per-row fallback.
pub async fn export(config: &Config, output: Option<String>) -> Result<()> {
    let rest = build_rest(config)?;
    let storage = JsonFileStorage::new(&config.storage.wallets_path);

    let store = storage.load().await;
    let report = registry::export::build_report(&store, rest.as_ref()).await;

    let path = output.unwrap_or_else(|| report.filename());
    tokio::fs::write(&path, report.to_csv())
        .await
        .with_context(|| format!("Failed to write {}", path))?;

    info!(
        "Exported {} wallets ({} OG, {} WL) to {}",
        report.total(),
        report.og_count,
        report.wl_count,
        path
    );
    Ok(())
}
