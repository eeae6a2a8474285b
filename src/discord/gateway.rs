//! Discord gateway WebSocket client
//!
//! Maintains the persistent gateway connection: identify on connect,
//! heartbeat at the interval the server dictates, and forward the dispatches
//! the bot cares about over a channel. Reconnects with a fresh identify;
//! interactions are request/response, so nothing is replayed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::types::{
    GatewayPayload, Hello, Interaction, Ready, INTENT_GUILDS, INTENT_GUILD_MEMBERS, OP_DISPATCH,
    OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO, OP_IDENTIFY, OP_INVALID_SESSION, OP_RECONNECT,
};

/// Configuration for the gateway client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    /// Reconnect delay in milliseconds
    pub reconnect_delay_ms: u64,
    /// Maximum reconnect attempts (0 = infinite)
    pub max_reconnect_attempts: u32,
}

/// Event from the gateway
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session established; carries bot identity
    Ready(Ready),
    /// A slash command, button press, or modal submit
    Interaction(Interaction),
    /// Connection lost; a reconnect follows unless attempts are exhausted
    Disconnected,
    /// Fatal error, no further reconnects
    Error(String),
}

/// Gateway WebSocket client
pub struct GatewayClient {
    config: GatewayConfig,
    event_tx: mpsc::Sender<GatewayEvent>,
    shutdown: tokio::sync::broadcast::Sender<()>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, event_tx: mpsc::Sender<GatewayEvent>) -> Self {
        let (shutdown, _) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            event_tx,
            shutdown,
        }
    }

    /// Start the connection loop in a background task
    pub fn start(&self) {
        info!("Starting gateway client...");

        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Gateway client shutting down");
                    break;
                }

                match Self::connect_and_stream(&config, &event_tx).await {
                    Ok(_) => {
                        // Clean disconnect
                        reconnect_attempts = 0;
                    }
                    Err(e) => {
                        error!("Gateway error: {}", e);
                        reconnect_attempts += 1;

                        if config.max_reconnect_attempts > 0
                            && reconnect_attempts >= config.max_reconnect_attempts
                        {
                            error!(
                                "Max reconnect attempts ({}) reached",
                                config.max_reconnect_attempts
                            );
                            let _ = event_tx
                                .send(GatewayEvent::Error(
                                    "Max reconnect attempts reached".to_string(),
                                ))
                                .await;
                            break;
                        }
                    }
                }

                let _ = event_tx.send(GatewayEvent::Disconnected).await;

                let delay = Duration::from_millis(config.reconnect_delay_ms);
                warn!("Reconnecting in {:?}...", delay);
                sleep(delay).await;
            }
        });
    }

    /// Stop the client
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    /// One connection lifetime: identify, heartbeat, forward dispatches
    async fn connect_and_stream(
        config: &GatewayConfig,
        event_tx: &mpsc::Sender<GatewayEvent>,
    ) -> Result<()> {
        info!("Connecting to gateway...");

        let url = url::Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid gateway URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Gateway(format!("WebSocket connect failed: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();

        // The server speaks first with Hello carrying the heartbeat interval
        let hello = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    if payload.op == OP_HELLO {
                        break serde_json::from_value::<Hello>(payload.d)?;
                    }
                    debug!("Ignoring pre-hello op {}", payload.op);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Gateway(format!("WebSocket error: {}", e))),
                None => return Err(Error::Gateway("Stream ended before hello".into())),
            }
        };

        info!(
            "Gateway hello received (heartbeat every {}ms)",
            hello.heartbeat_interval
        );

        // Identify
        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": config.token,
                "intents": INTENT_GUILDS | INTENT_GUILD_MEMBERS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "wallet-collector",
                    "device": "wallet-collector",
                },
            },
        });
        write
            .send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| Error::Gateway(format!("Failed to identify: {}", e)))?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        // First tick fires immediately; skip it so the first heartbeat
        // lands one interval after hello.
        heartbeat.tick().await;

        let mut last_seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = json!({"op": OP_HEARTBEAT, "d": last_seq});
                    if let Err(e) = write.send(Message::Text(beat.to_string())).await {
                        error!("Failed to send heartbeat: {}", e);
                        break;
                    }
                    debug!("Sent heartbeat (seq: {:?})", last_seq);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let payload: GatewayPayload = match serde_json::from_str(&text) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!("Unparseable gateway frame: {}", e);
                                    continue;
                                }
                            };

                            if let Some(seq) = payload.s {
                                last_seq = Some(seq);
                            }

                            match payload.op {
                                OP_DISPATCH => {
                                    Self::handle_dispatch(payload, event_tx).await;
                                }
                                OP_HEARTBEAT => {
                                    let beat = json!({"op": OP_HEARTBEAT, "d": last_seq});
                                    if let Err(e) = write.send(Message::Text(beat.to_string())).await {
                                        error!("Failed to answer heartbeat request: {}", e);
                                        break;
                                    }
                                }
                                OP_HEARTBEAT_ACK => {
                                    debug!("Heartbeat acknowledged");
                                }
                                OP_RECONNECT => {
                                    info!("Server requested reconnect");
                                    break;
                                }
                                OP_INVALID_SESSION => {
                                    warn!("Session invalidated, reconnecting");
                                    break;
                                }
                                other => {
                                    debug!("Ignoring gateway op {}", other);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Gateway closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break;
                        }
                        None => {
                            info!("Gateway stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Forward the dispatches the bot consumes
    async fn handle_dispatch(payload: GatewayPayload, event_tx: &mpsc::Sender<GatewayEvent>) {
        match payload.t.as_deref() {
            Some("READY") => match serde_json::from_value::<Ready>(payload.d) {
                Ok(ready) => {
                    let _ = event_tx.send(GatewayEvent::Ready(ready)).await;
                }
                Err(e) => warn!("Failed to parse READY: {}", e),
            },
            Some("INTERACTION_CREATE") => {
                match serde_json::from_value::<Interaction>(payload.d) {
                    Ok(interaction) => {
                        let _ = event_tx.send(GatewayEvent::Interaction(interaction)).await;
                    }
                    Err(e) => warn!("Failed to parse interaction: {}", e),
                }
            }
            Some(other) => debug!("Ignoring dispatch {}", other),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_intents() {
        assert_eq!(INTENT_GUILDS | INTENT_GUILD_MEMBERS, 3);
    }

    #[test]
    fn test_heartbeat_payload_shape() {
        let beat = json!({"op": OP_HEARTBEAT, "d": Some(42u64)});
        assert_eq!(beat.to_string(), r#"{"d":42,"op":1}"#);

        let beat = json!({"op": OP_HEARTBEAT, "d": None::<u64>});
        assert_eq!(beat.to_string(), r#"{"d":null,"op":1}"#);
    }
}
