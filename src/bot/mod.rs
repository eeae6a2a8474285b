//! Bot service: consumes gateway events and drives the wallet registry
//!
//! All registry replies are ephemeral. Unexpected handler failures are
//! caught here, logged, and answered with a generic message; they never take
//! the process down.

pub mod panel;

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::discord::types::{
    Interaction, Ready, FLAG_EPHEMERAL, INTERACTION_APPLICATION_COMMAND,
    INTERACTION_MESSAGE_COMPONENT, INTERACTION_MODAL_SUBMIT, RESPONSE_CHANNEL_MESSAGE,
    RESPONSE_MODAL,
};
use crate::discord::{GatewayEvent, RestClient};
use crate::error::{Error, Result};
use crate::registry::{
    Caller, Category, RemoveOutcome, RemoveResolution, SubmitOutcome, SubmitResolution,
    WalletRegistry,
};

// Confirmation button ids
const BUTTON_CONFIRM_REPLACE: &str = "confirm_replace";
const BUTTON_CANCEL_REPLACE: &str = "cancel_replace";
const BUTTON_CONFIRM_REMOVE: &str = "confirm_remove";
const BUTTON_CANCEL_REMOVE: &str = "cancel_remove";

// Modal ids
const MODAL_WALLET: &str = "wallet_modal";
const FIELD_ADDRESS: &str = "wallet_address";

// Slash commands
const COMMAND_CREATE_PANEL: &str = "create_panel";
const COMMAND_EXPORT_WALLETS: &str = "export_wallets";

const MSG_EXPIRED: &str = "This confirmation is no longer active. Please start again.";
const MSG_GENERIC_FAILURE: &str =
    "An error occurred while executing this command. Please try again later.";

/// The bot service object, constructed once at startup
pub struct Bot {
    rest: Arc<RestClient>,
    registry: WalletRegistry,
    scan_window: u8,
    /// Our own user id, learned from the Ready dispatch
    bot_user_id: Mutex<Option<String>>,
}

impl Bot {
    pub fn new(rest: Arc<RestClient>, registry: WalletRegistry, scan_window: u8) -> Self {
        Self {
            rest,
            registry,
            scan_window,
            bot_user_id: Mutex::new(None),
        }
    }

    /// Consume gateway events until the stream ends or a fatal error arrives
    pub async fn run(&self, mut events: mpsc::Receiver<GatewayEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Ready(ready) => self.on_ready(ready).await,
                GatewayEvent::Interaction(interaction) => self.on_interaction(interaction).await,
                GatewayEvent::Disconnected => {
                    warn!("Gateway disconnected");
                }
                GatewayEvent::Error(e) => {
                    return Err(Error::Gateway(e));
                }
            }
        }
        Ok(())
    }

    async fn on_ready(&self, ready: Ready) {
        info!("{} has connected to Discord", ready.user.username);

        *self.bot_user_id.lock().unwrap() = Some(ready.user.id);

        if let Err(e) = self.register_commands(&ready.application.id).await {
            error!("Failed to sync commands: {}", e);
        }
    }

    async fn register_commands(&self, application_id: &str) -> Result<()> {
        let commands = json!([
            {
                "name": COMMAND_CREATE_PANEL,
                "description": "Create a wallet management panel",
            },
            {
                "name": COMMAND_EXPORT_WALLETS,
                "description": "Export all wallet addresses to a CSV file",
            },
        ]);

        self.rest
            .bulk_overwrite_commands(application_id, &commands)
            .await?;
        info!("Synced 2 commands");
        Ok(())
    }

    /// Boundary for every interaction: failures are logged and answered
    /// with a generic message instead of propagating
    async fn on_interaction(&self, interaction: Interaction) {
        if let Err(e) = self.handle_interaction(&interaction).await {
            error!("Interaction handler failed: {}", e);
            let _ = self
                .reply(&interaction, ephemeral_message(MSG_GENERIC_FAILURE))
                .await;
        }
    }

    async fn handle_interaction(&self, interaction: &Interaction) -> Result<()> {
        match interaction.kind {
            INTERACTION_APPLICATION_COMMAND => {
                let name = interaction
                    .data
                    .as_ref()
                    .and_then(|d| d.name.as_deref())
                    .unwrap_or_default();
                match name {
                    COMMAND_CREATE_PANEL => self.create_panel(interaction).await,
                    COMMAND_EXPORT_WALLETS => self.export_wallets(interaction).await,
                    other => {
                        warn!("Unknown command: {}", other);
                        Ok(())
                    }
                }
            }
            INTERACTION_MESSAGE_COMPONENT => {
                let custom_id = interaction
                    .data
                    .as_ref()
                    .and_then(|d| d.custom_id.as_deref())
                    .unwrap_or_default();
                match custom_id {
                    panel::BUTTON_SUBMIT => self.submit_pressed(interaction).await,
                    panel::BUTTON_VIEW => self.view_pressed(interaction).await,
                    panel::BUTTON_REMOVE => self.remove_pressed(interaction).await,
                    BUTTON_CONFIRM_REPLACE => self.resolve_replace(interaction, true).await,
                    BUTTON_CANCEL_REPLACE => self.resolve_replace(interaction, false).await,
                    BUTTON_CONFIRM_REMOVE => self.resolve_remove(interaction, true).await,
                    BUTTON_CANCEL_REMOVE => self.resolve_remove(interaction, false).await,
                    other => {
                        debug!("Ignoring component {}", other);
                        Ok(())
                    }
                }
            }
            INTERACTION_MODAL_SUBMIT => self.modal_submitted(interaction).await,
            other => {
                debug!("Ignoring interaction kind {}", other);
                Ok(())
            }
        }
    }

    fn caller(&self, interaction: &Interaction) -> Result<Caller> {
        interaction
            .member
            .as_ref()
            .map(|member| member.caller())
            .ok_or_else(|| Error::Internal("Interaction without member".into()))
    }

    async fn reply(&self, interaction: &Interaction, response: Value) -> Result<()> {
        self.rest
            .create_interaction_response(&interaction.id, &interaction.token, &response)
            .await
    }

    // === Panel buttons ===

    async fn submit_pressed(&self, interaction: &Interaction) -> Result<()> {
        let caller = self.caller(interaction)?;

        if self.registry.classify(&caller).is_none() {
            return self
                .reply(
                    interaction,
                    ephemeral_message(&denial_message("submit a wallet address")),
                )
                .await;
        }

        self.reply(interaction, wallet_modal()).await
    }

    async fn modal_submitted(&self, interaction: &Interaction) -> Result<()> {
        let custom_id = interaction
            .data
            .as_ref()
            .and_then(|d| d.custom_id.as_deref())
            .unwrap_or_default();
        if custom_id != MODAL_WALLET {
            debug!("Ignoring modal {}", custom_id);
            return Ok(());
        }

        let caller = self.caller(interaction)?;
        let address = interaction.modal_value(FIELD_ADDRESS).unwrap_or_default();

        let response = match self.registry.request_submit(&caller, address).await {
            Ok(SubmitOutcome::Registered { category }) => ephemeral_message(&format!(
                "Your {} wallet address has been successfully submitted!",
                category
            )),
            Ok(SubmitOutcome::NeedsConfirmation {
                category,
                current,
                proposed,
            }) => confirmation_prompt(
                &format!(
                    "You already have a {} wallet address registered: `{}`\n\
                     Do you want to replace it with: `{}`?",
                    category, current, proposed
                ),
                BUTTON_CONFIRM_REPLACE,
                BUTTON_CANCEL_REPLACE,
            ),
            Err(Error::Unauthorized) => ephemeral_message(&denial_message("submit a wallet address")),
            Err(Error::InvalidAddress(reason)) => {
                ephemeral_message(&format!("Invalid wallet address: {}.", reason))
            }
            Err(e) => return Err(e),
        };

        self.reply(interaction, response).await
    }

    async fn resolve_replace(&self, interaction: &Interaction, confirmed: bool) -> Result<()> {
        let caller = self.caller(interaction)?;

        let response = match self.registry.resolve_submit(&caller, confirmed).await {
            Ok(SubmitResolution::Replaced {
                category,
                previous,
                address,
            }) => ephemeral_message(&format!(
                "Your {} wallet address has been successfully updated!\n\
                 Old address: `{}`\n\
                 New address: `{}`",
                category, previous, address
            )),
            Ok(SubmitResolution::Cancelled) => {
                ephemeral_message("Wallet address update cancelled.")
            }
            Ok(SubmitResolution::Expired) => ephemeral_message(MSG_EXPIRED),
            Err(Error::Unauthorized) => ephemeral_message(&denial_message("submit a wallet address")),
            Err(e) => return Err(e),
        };

        self.reply(interaction, response).await
    }

    async fn view_pressed(&self, interaction: &Interaction) -> Result<()> {
        let caller = self.caller(interaction)?;

        let Some(category) = self.registry.classify(&caller) else {
            return self
                .reply(
                    interaction,
                    ephemeral_message(&denial_message("view wallet addresses")),
                )
                .await;
        };

        let response = match self.registry.view(&caller).await? {
            Some(wallet) => ephemeral_message(&format!(
                "Your {} wallet address: `{}`",
                wallet.category, wallet.address
            )),
            None => ephemeral_message(&not_submitted_message(category)),
        };

        self.reply(interaction, response).await
    }

    async fn remove_pressed(&self, interaction: &Interaction) -> Result<()> {
        let caller = self.caller(interaction)?;

        let response = match self.registry.request_remove(&caller).await {
            Ok(RemoveOutcome::NotRegistered { category }) => {
                ephemeral_message(&not_submitted_message(category))
            }
            Ok(RemoveOutcome::NeedsConfirmation { category, address }) => confirmation_prompt(
                &format!(
                    "Are you sure you want to remove your {} wallet address: `{}`?",
                    category, address
                ),
                BUTTON_CONFIRM_REMOVE,
                BUTTON_CANCEL_REMOVE,
            ),
            Err(Error::Unauthorized) => {
                ephemeral_message(&denial_message("remove wallet addresses"))
            }
            Err(e) => return Err(e),
        };

        self.reply(interaction, response).await
    }

    async fn resolve_remove(&self, interaction: &Interaction, confirmed: bool) -> Result<()> {
        let caller = self.caller(interaction)?;

        let response = match self.registry.resolve_remove(&caller, confirmed).await {
            Ok(RemoveResolution::Removed { category, address }) => ephemeral_message(&format!(
                "Your {} wallet address has been successfully removed!\n\
                 Removed address: `{}`",
                category, address
            )),
            Ok(RemoveResolution::Cancelled) => ephemeral_message("Wallet removal cancelled."),
            Ok(RemoveResolution::Expired) => ephemeral_message(MSG_EXPIRED),
            Err(Error::Unauthorized) => {
                ephemeral_message(&denial_message("remove wallet addresses"))
            }
            Err(e) => return Err(e),
        };

        self.reply(interaction, response).await
    }

    // === Slash commands ===

    async fn create_panel(&self, interaction: &Interaction) -> Result<()> {
        let caller = self.caller(interaction)?;
        if !caller.is_admin {
            return self
                .reply(
                    interaction,
                    ephemeral_message("You need administrator permissions to create a panel."),
                )
                .await;
        }

        let channel_id = interaction
            .channel_id
            .as_deref()
            .ok_or_else(|| Error::Internal("Command without channel".into()))?;

        let bot_user_id = self
            .bot_user_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Internal("Not ready yet".into()))?;

        // Best-effort duplicate check over a bounded window of recent
        // messages; an older panel escapes the scan.
        let recent = self
            .rest
            .channel_messages(channel_id, self.scan_window)
            .await?;
        if panel::panel_exists(&recent, &bot_user_id) {
            return self
                .reply(
                    interaction,
                    ephemeral_message("A wallet management panel already exists in this channel!"),
                )
                .await;
        }

        self.rest
            .create_message(channel_id, &panel::panel_message())
            .await?;
        info!("Panel created in channel {}", channel_id);

        self.reply(
            interaction,
            ephemeral_message("Wallet management panel has been created!"),
        )
        .await
    }

    async fn export_wallets(&self, interaction: &Interaction) -> Result<()> {
        let caller = self.caller(interaction)?;
        if !caller.is_admin {
            return self
                .reply(
                    interaction,
                    ephemeral_message("You need administrator permissions to export wallet data."),
                )
                .await;
        }

        let report = self.registry.export(&caller, self.rest.as_ref()).await?;
        let filename = report.filename();

        let response = json!({
            "type": RESPONSE_CHANNEL_MESSAGE,
            "data": {
                "flags": FLAG_EPHEMERAL,
                "embeds": [{
                    "title": "Wallet Database Export",
                    "description": report.summary(),
                    "color": 0x2ecc71,
                    "footer": {
                        "text": format!(
                            "Exported at {}",
                            report.generated_at.format("%Y-%m-%d %H:%M:%S")
                        ),
                    },
                }],
                "attachments": [{"id": 0, "filename": filename}],
            },
        });

        // The artifact lives only in this request; nothing is written to disk
        self.rest
            .create_interaction_response_with_file(
                &interaction.id,
                &interaction.token,
                &response,
                &filename,
                report.to_csv().into_bytes(),
            )
            .await
    }
}

// === Response builders ===

fn ephemeral_message(content: &str) -> Value {
    json!({
        "type": RESPONSE_CHANNEL_MESSAGE,
        "data": {"content": content, "flags": FLAG_EPHEMERAL},
    })
}

fn confirmation_prompt(content: &str, confirm_id: &str, cancel_id: &str) -> Value {
    json!({
        "type": RESPONSE_CHANNEL_MESSAGE,
        "data": {
            "content": content,
            "flags": FLAG_EPHEMERAL,
            "components": [{
                "type": 1,
                "components": [
                    {"type": 2, "style": 3, "label": "Confirm", "custom_id": confirm_id},
                    {"type": 2, "style": 4, "label": "Cancel", "custom_id": cancel_id},
                ],
            }],
        },
    })
}

fn wallet_modal() -> Value {
    json!({
        "type": RESPONSE_MODAL,
        "data": {
            "custom_id": MODAL_WALLET,
            "title": "Submit Wallet Address",
            "components": [{
                "type": 1,
                "components": [{
                    "type": 4,
                    "custom_id": FIELD_ADDRESS,
                    "label": "Solana Wallet Address",
                    "style": 1,
                    "min_length": crate::registry::MIN_ADDRESS_LEN,
                    "max_length": crate::registry::MAX_ADDRESS_LEN,
                    "required": true,
                    "placeholder": "Enter your Solana wallet address...",
                }],
            }],
        },
    })
}

fn denial_message(action: &str) -> String {
    format!("You need either the OG or WL role to {}.", action)
}

fn not_submitted_message(category: Category) -> String {
    format!("You haven't submitted a {} wallet address yet.", category)
}
