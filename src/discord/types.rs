//! Discord API payload models
//!
//! Only the slice of the v10 API this bot touches: the gateway envelope,
//! interactions, and message/embed summaries for the panel scan.

use serde::Deserialize;

use crate::registry::Caller;

// Gateway opcodes
pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

// Gateway intents
pub const INTENT_GUILDS: u64 = 1 << 0;
pub const INTENT_GUILD_MEMBERS: u64 = 1 << 1;

// Interaction kinds
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;
pub const INTERACTION_MESSAGE_COMPONENT: u8 = 3;
pub const INTERACTION_MODAL_SUBMIT: u8 = 5;

// Interaction response types
pub const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
pub const RESPONSE_MODAL: u8 = 9;

/// Message flag marking a reply visible only to the invoking user
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

/// ADMINISTRATOR permission bit
const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;

/// Envelope for every gateway frame
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    pub s: Option<u64>,
    pub t: Option<String>,
}

/// Hello payload (op 10)
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

/// Ready dispatch payload
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
    pub user: User,
    pub application: Application,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Application {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Guild member attached to an interaction
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Resolved permission bitset, serialized as a decimal string
    pub permissions: Option<String>,
}

impl Member {
    pub fn role_ids(&self) -> Vec<u64> {
        self.roles.iter().filter_map(|r| r.parse().ok()).collect()
    }

    pub fn is_admin(&self) -> bool {
        self.permissions
            .as_deref()
            .and_then(|p| p.parse::<u64>().ok())
            .map(|bits| bits & PERMISSION_ADMINISTRATOR != 0)
            .unwrap_or(false)
    }

    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user.id.parse().unwrap_or(0),
            role_ids: self.role_ids(),
            is_admin: self.is_admin(),
        }
    }
}

/// An incoming interaction (slash command, button press, or modal submit)
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub data: Option<InteractionData>,
    pub member: Option<Member>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    /// Command name (application commands)
    pub name: Option<String>,
    /// Component or modal custom id
    pub custom_id: Option<String>,
    /// Modal submit: action rows of submitted fields
    #[serde(default)]
    pub components: Vec<ModalRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModalRow {
    #[serde(default)]
    pub components: Vec<ModalField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModalField {
    pub custom_id: String,
    pub value: Option<String>,
}

impl Interaction {
    /// Value of a modal text input by custom id
    pub fn modal_value(&self, custom_id: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .components
            .iter()
            .flat_map(|row| &row.components)
            .find(|field| field.custom_id == custom_id)
            .and_then(|field| field.value.as_deref())
    }
}

/// Channel message summary, enough for the panel scan
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub author: User,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_component_interaction() {
        let json = r#"{
            "id": "123",
            "token": "tok",
            "type": 3,
            "channel_id": "555",
            "member": {
                "user": {"id": "42", "username": "alice"},
                "roles": ["1001", "bogus"],
                "permissions": "8"
            },
            "data": {"custom_id": "submit_wallet", "component_type": 2}
        }"#;

        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.kind, INTERACTION_MESSAGE_COMPONENT);
        assert_eq!(
            interaction.data.as_ref().unwrap().custom_id.as_deref(),
            Some("submit_wallet")
        );

        let member = interaction.member.unwrap();
        assert_eq!(member.role_ids(), vec![1001]);
        assert!(member.is_admin());

        let caller = member.caller();
        assert_eq!(caller.user_id, 42);
        assert!(caller.is_admin);
    }

    #[test]
    fn test_parse_modal_submit() {
        let json = r#"{
            "id": "123",
            "token": "tok",
            "type": 5,
            "member": {"user": {"id": "42", "username": "alice"}, "roles": []},
            "data": {
                "custom_id": "wallet_modal",
                "components": [
                    {"components": [{"custom_id": "wallet_address", "value": "Addr11111111111111111111111111AA"}]}
                ]
            }
        }"#;

        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.kind, INTERACTION_MODAL_SUBMIT);
        assert_eq!(
            interaction.modal_value("wallet_address"),
            Some("Addr11111111111111111111111111AA")
        );
        assert_eq!(interaction.modal_value("missing"), None);
    }

    #[test]
    fn test_admin_requires_permission_bit() {
        let member = Member {
            user: User {
                id: "1".into(),
                username: "bob".into(),
            },
            roles: vec![],
            permissions: Some("104320577".into()), // everything but ADMINISTRATOR
        };
        assert!(!member.is_admin());

        let member = Member {
            permissions: None,
            ..member
        };
        assert!(!member.is_admin());
    }

    #[test]
    fn test_parse_gateway_hello() {
        let json = r#"{"op": 10, "d": {"heartbeat_interval": 41250}, "s": null, "t": null}"#;
        let payload: GatewayPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.op, OP_HELLO);

        let hello: Hello = serde_json::from_value(payload.d).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }

    #[test]
    fn test_parse_channel_message() {
        let json = r#"{
            "id": "900",
            "author": {"id": "7", "username": "bot"},
            "embeds": [{"title": "Solana Wallet Management"}]
        }"#;

        let message: ChannelMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.author.id, "7");
        assert_eq!(
            message.embeds[0].title.as_deref(),
            Some("Solana Wallet Management")
        );
    }
}
