//! Wallet management panel
//!
//! The panel is a single embed with three buttons. Before posting a new one,
//! a bounded window of recent messages is scanned for an existing panel; a
//! panel older than the window escapes the scan, so duplicates remain
//! possible. That is accepted behavior.

use serde_json::{json, Value};

use crate::discord::types::ChannelMessage;

/// Fixed embed title used to recognize an existing panel
pub const PANEL_TITLE: &str = "Solana Wallet Management";

/// Embed color (blurple-adjacent blue)
const PANEL_COLOR: u32 = 0x3498db;

// Button custom ids
pub const BUTTON_SUBMIT: &str = "submit_wallet";
pub const BUTTON_VIEW: &str = "view_wallet";
pub const BUTTON_REMOVE: &str = "remove_wallet";

const PANEL_DESCRIPTION: &str = "Use the buttons below to manage your Solana wallet address.\n\n\
**Submit Wallet**: Submit or update your Solana wallet address\n\
**View Wallet**: View your currently registered wallet address\n\
**Remove Wallet**: Remove your registered wallet address\n\n\
Note: Only users with OG or WL roles can use these features.\n\
Your wallet will be registered under your highest priority role (OG > WL).";

/// Message body for a fresh panel
pub fn panel_message() -> Value {
    json!({
        "embeds": [{
            "title": PANEL_TITLE,
            "description": PANEL_DESCRIPTION,
            "color": PANEL_COLOR,
        }],
        "components": [{
            "type": 1,
            "components": [
                {"type": 2, "style": 3, "label": "Submit Wallet", "custom_id": BUTTON_SUBMIT},
                {"type": 2, "style": 1, "label": "View Wallet", "custom_id": BUTTON_VIEW},
                {"type": 2, "style": 4, "label": "Remove Wallet", "custom_id": BUTTON_REMOVE},
            ],
        }],
    })
}

/// Scan a window of recent messages for a panel authored by this bot
pub fn panel_exists(messages: &[ChannelMessage], bot_user_id: &str) -> bool {
    messages.iter().any(|message| {
        message.author.id == bot_user_id
            && message
                .embeds
                .first()
                .and_then(|embed| embed.title.as_deref())
                == Some(PANEL_TITLE)
    })
}
