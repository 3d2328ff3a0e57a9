use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::MessageEvent;

pub mod discord;

/// Failure applying a moderation action against the platform
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// The platform denied the action, e.g. the target outranks the bot.
    /// Retrying cannot succeed.
    #[error("insufficient permission to {action}")]
    InsufficientPermission { action: &'static str },
    /// The target no longer exists (message already deleted, member gone)
    #[error("target not found for {action}")]
    TargetNotFound { action: &'static str },
    /// Transient platform-side failure
    #[error("platform unavailable during {action}: {detail}")]
    PlatformUnavailable { action: &'static str, detail: String },
}

impl EnforcementError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnforcementError::PlatformUnavailable { .. })
    }
}

/// Trait defining the moderation surface all platform integrations must
/// implement. The enforcement executor only ever talks to this.
#[async_trait]
pub trait PlatformModerator: Send + Sync {
    /// Get the platform identifier (e.g. "discord")
    fn platform_name(&self) -> &str;

    /// Remove the offending message
    async fn delete_message(&self, event: &MessageEvent) -> Result<(), EnforcementError>;

    /// Notify the author why their message was flagged
    async fn warn_author(&self, event: &MessageEvent, reason: &str) -> Result<(), EnforcementError>;

    /// Temporarily restrict the author from participating
    async fn timeout_author(
        &self,
        event: &MessageEvent,
        duration: Duration,
        reason: &str,
    ) -> Result<(), EnforcementError>;

    /// Permanently remove the author's access to the scope
    async fn ban_author(&self, event: &MessageEvent, reason: &str) -> Result<(), EnforcementError>;
}
