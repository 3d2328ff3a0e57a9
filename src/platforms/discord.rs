use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::env;
use std::time::Duration;

use crate::platforms::{EnforcementError, PlatformModerator};
use crate::types::MessageEvent;

const API_BASE: &str = "https://discord.com/api/v10";

/// Configuration for the Discord REST moderation surface
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
}

impl DiscordConfig {
    /// Load Discord configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN environment variable not set")?;

        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("DISCORD_BOT_TOKEN is empty"));
        }

        info!("Loaded Discord moderation config");
        Ok(Self { bot_token })
    }
}

/// Discord REST implementation of the moderation surface. Gateway/session
/// transport is not handled here; this only applies actions.
pub struct DiscordModerator {
    config: DiscordConfig,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct CreateDmRequest<'a> {
    recipient_id: &'a str,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct TimeoutRequest {
    communication_disabled_until: String,
}

impl DiscordModerator {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    /// Map a Discord REST status to the enforcement error taxonomy
    fn map_status(status: u16, action: &'static str) -> EnforcementError {
        match status {
            401 | 403 => EnforcementError::InsufficientPermission { action },
            404 => EnforcementError::TargetNotFound { action },
            code => EnforcementError::PlatformUnavailable {
                action,
                detail: format!("status {}", code),
            },
        }
    }

    fn map_transport(e: reqwest::Error, action: &'static str) -> EnforcementError {
        EnforcementError::PlatformUnavailable {
            action,
            detail: e.to_string(),
        }
    }

    async fn check(
        response: reqwest::Response,
        action: &'static str,
    ) -> Result<(), EnforcementError> {
        let status = response.status();
        if status.is_success() {
            debug!("Discord {} succeeded ({})", action, status);
            Ok(())
        } else {
            Err(Self::map_status(status.as_u16(), action))
        }
    }

    /// Open (or reuse) the DM channel with a user and return its id
    async fn open_dm_channel(&self, user_id: &str) -> Result<String, EnforcementError> {
        let response = self
            .http_client
            .post(format!("{}/users/@me/channels", API_BASE))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&CreateDmRequest { recipient_id: user_id })
            .send()
            .await
            .map_err(|e| Self::map_transport(e, "warn"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(status.as_u16(), "warn"));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::map_transport(e, "warn"))?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(EnforcementError::PlatformUnavailable {
                action: "warn",
                detail: "DM channel response missing id".to_string(),
            })
    }
}

#[async_trait]
impl PlatformModerator for DiscordModerator {
    fn platform_name(&self) -> &str {
        "discord"
    }

    async fn delete_message(&self, event: &MessageEvent) -> Result<(), EnforcementError> {
        let response = self
            .http_client
            .delete(format!(
                "{}/channels/{}/messages/{}",
                API_BASE, event.channel, event.message_id
            ))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Self::map_transport(e, "delete"))?;
        Self::check(response, "delete").await
    }

    async fn warn_author(&self, event: &MessageEvent, reason: &str) -> Result<(), EnforcementError> {
        let dm_channel = self.open_dm_channel(&event.author_id).await?;
        let content = format!(
            "Your message in this server was flagged for policy violations. Reason: {}",
            reason
        );
        let response = self
            .http_client
            .post(format!("{}/channels/{}/messages", API_BASE, dm_channel))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&CreateMessageRequest { content: &content })
            .send()
            .await
            .map_err(|e| Self::map_transport(e, "warn"))?;
        Self::check(response, "warn").await
    }

    async fn timeout_author(
        &self,
        event: &MessageEvent,
        duration: Duration,
        reason: &str,
    ) -> Result<(), EnforcementError> {
        let until = chrono::Utc::now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let response = self
            .http_client
            .patch(format!(
                "{}/guilds/{}/members/{}",
                API_BASE, event.scope, event.author_id
            ))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header("X-Audit-Log-Reason", sanitize_audit_reason(reason))
            .json(&TimeoutRequest {
                communication_disabled_until: until.to_rfc3339(),
            })
            .send()
            .await
            .map_err(|e| Self::map_transport(e, "timeout"))?;
        Self::check(response, "timeout").await
    }

    async fn ban_author(&self, event: &MessageEvent, reason: &str) -> Result<(), EnforcementError> {
        let response = self
            .http_client
            .put(format!(
                "{}/guilds/{}/bans/{}",
                API_BASE, event.scope, event.author_id
            ))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header("X-Audit-Log-Reason", sanitize_audit_reason(reason))
            .json(&serde_json::json!({ "delete_message_seconds": 0 }))
            .send()
            .await
            .map_err(|e| Self::map_transport(e, "ban"))?;
        Self::check(response, "ban").await
    }
}

/// Audit-log headers must be single-line and bounded at 512 chars
fn sanitize_audit_reason(reason: &str) -> String {
    reason
        .replace(['\r', '\n'], " ")
        .chars()
        .take(512)
        .collect()
}
