//! Discord REST API client

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::NameResolver;

use super::types::{ChannelMessage, User};

/// Thin client over the handful of REST endpoints the bot uses
pub struct RestClient {
    http: reqwest::Client,
    api_base: String,
}

impl RestClient {
    pub fn new(api_base: &str, token: &str, timeout_ms: u64) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|e| Error::Config(format!("Invalid bot token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Answer an interaction (message or modal)
    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/interactions/{}/{}/callback",
            self.api_base, interaction_id, interaction_token
        );
        let resp = self.http.post(&url).json(response).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Answer an interaction with a message carrying a file attachment
    pub async fn create_interaction_response_with_file(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &Value,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let url = format!(
            "{}/interactions/{}/{}/callback",
            self.api_base, interaction_id, interaction_token
        );

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("text/csv")
            .map_err(|e| Error::Internal(format!("Invalid attachment mime: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("payload_json", serde_json::to_string(response)?)
            .part("files[0]", file);

        let resp = self.http.post(&url).multipart(form).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Post a message to a channel
    pub async fn create_message(&self, channel_id: &str, body: &Value) -> Result<ChannelMessage> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let resp = self.http.post(&url).json(body).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetch the most recent messages in a channel, newest first
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>> {
        let url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, channel_id, limit
        );
        let resp = self.http.get(&url).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetch a user by id
    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let url = format!("{}/users/{}", self.api_base, user_id);
        let resp = self.http.get(&url).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Replace the application's global slash commands
    pub async fn bulk_overwrite_commands(
        &self,
        application_id: &str,
        commands: &Value,
    ) -> Result<()> {
        let url = format!("{}/applications/{}/commands", self.api_base, application_id);
        let resp = self.http.put(&url).json(commands).send().await?;
        Self::check(resp).await?;
        debug!("Registered application commands");
        Ok(())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let snippet = &body[..body.len().min(200)];
        Err(Error::Api(format!("{}: {}", status, snippet)))
    }
}

#[async_trait]
impl NameResolver for RestClient {
    async fn display_name(&self, user_id: &str) -> Result<String> {
        Ok(self.get_user(user_id).await?.username)
    }
}
