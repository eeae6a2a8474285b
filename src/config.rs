//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub panel: PanelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (from DISCORD_TOKEN if not set in the file)
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Maximum reconnect attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    /// Role granting OG classification (from OG_ROLE_ID if not set)
    #[serde(default = "default_og_role_id")]
    pub og_role_id: u64,
    /// Role granting WL classification (from WL_ROLE_ID if not set)
    #[serde(default = "default_wl_role_id")]
    pub wl_role_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the wallet snapshot file
    #[serde(default = "default_wallets_path")]
    pub wallets_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    /// How many recent messages to scan for an existing panel
    #[serde(default = "default_scan_window")]
    pub scan_window: u8,
}

// Default value functions
fn default_token() -> String {
    std::env::var("DISCORD_TOKEN").unwrap_or_default()
}

fn default_og_role_id() -> u64 {
    std::env::var("OG_ROLE_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn default_wl_role_id() -> u64 {
    std::env::var("WL_ROLE_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".into()
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_wallets_path() -> String {
    "wallets.json".into()
}

fn default_scan_window() -> u8 {
    10
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            gateway_url: default_gateway_url(),
            api_base: default_api_base(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            request_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            og_role_id: default_og_role_id(),
            wl_role_id: default_wl_role_id(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wallets_path: default_wallets_path(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            scan_window: default_scan_window(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix COLLECTOR_)
            .add_source(
                config::Environment::with_prefix("COLLECTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Refuses to start without a bot token and both role ids.
    fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            anyhow::bail!("Missing bot token: set DISCORD_TOKEN or discord.token");
        }

        if self.roles.og_role_id == 0 {
            anyhow::bail!("Missing OG role id: set OG_ROLE_ID or roles.og_role_id");
        }

        if self.roles.wl_role_id == 0 {
            anyhow::bail!("Missing WL role id: set WL_ROLE_ID or roles.wl_role_id");
        }

        if self.storage.wallets_path.trim().is_empty() {
            anyhow::bail!("storage.wallets_path must not be empty");
        }

        if self.panel.scan_window == 0 {
            anyhow::bail!("panel.scan_window must be at least 1");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Discord:
    token: {}
    gateway: {}
    api_base: {}
    reconnect_delay: {}ms
  Roles:
    og_role_id: {}
    wl_role_id: {}
  Storage:
    wallets_path: {}
  Panel:
    scan_window: {}
"#,
            if self.discord.token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.discord.gateway_url,
            self.discord.api_base,
            self.discord.reconnect_delay_ms,
            self.roles.og_role_id,
            self.roles.wl_role_id,
            self.storage.wallets_path,
            self.panel.scan_window,
        )
    }
}
