// src/bot/executor.rs - Applies enforcement actions against the platform

use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::platforms::{EnforcementError, PlatformModerator};
use crate::types::{ActionKind, EnforcementOutcome, MessageEvent, Verdict};

/// One retry after a transient platform failure
const MAX_ACTION_RETRIES: u32 = 1;
const ACTION_RETRY_DELAY: Duration = Duration::from_millis(750);

/// Runtime knobs the executor needs from configuration
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub action_timeout: Duration,
    pub default_timeout_days: u32,
    pub max_timeout_days: u32,
    pub ban_reason_template: String,
}

/// Applies a selected action against the platform and reports a concrete
/// outcome. Never panics the run: every platform failure becomes a FAILED
/// outcome with a reason.
pub struct EnforcementExecutor {
    platform: Arc<dyn PlatformModerator>,
    settings: ExecutorSettings,
}

impl EnforcementExecutor {
    pub fn new(platform: Arc<dyn PlatformModerator>, settings: ExecutorSettings) -> Self {
        Self { platform, settings }
    }

    /// Apply `action` for `event`. The platform call is the commit point:
    /// a run cancelled before this never half-applies anything.
    pub async fn enforce(
        &self,
        event: &MessageEvent,
        action: ActionKind,
        verdict: &Verdict,
    ) -> EnforcementOutcome {
        let event_id = event.event_id();
        let result = match action {
            ActionKind::Log => {
                info!(
                    "Flagged message {} from {} in {}#{}: category={:?} severity={:?} ({})",
                    event_id,
                    event.author_name,
                    event.scope,
                    event.channel,
                    verdict.category,
                    verdict.severity,
                    verdict.reason
                );
                Ok(())
            }
            ActionKind::Delete => self.delete(event, false).await,
            ActionKind::Warn => self.warn(event, verdict).await,
            ActionKind::DeleteAndWarn => self.delete_and_warn(event, verdict).await,
            ActionKind::Timeout => self.timeout_author(event, verdict).await,
            ActionKind::Ban => self.ban_author(event, verdict).await,
        };

        match result {
            Ok(()) => EnforcementOutcome::applied(event_id, verdict.clone(), action),
            Err(e) => EnforcementOutcome::failed(
                event_id,
                Some(verdict.clone()),
                Some(action),
                e.to_string(),
            ),
        }
    }

    async fn delete(
        &self,
        event: &MessageEvent,
        tolerate_missing: bool,
    ) -> Result<(), EnforcementError> {
        let result = self
            .with_retry("delete", || self.platform.delete_message(event))
            .await;
        match result {
            // Composite actions treat an already-gone message as deleted
            Err(EnforcementError::TargetNotFound { .. }) if tolerate_missing => {
                warn!("Message {} already gone before delete", event.event_id());
                Ok(())
            }
            other => other,
        }
    }

    async fn warn(&self, event: &MessageEvent, verdict: &Verdict) -> Result<(), EnforcementError> {
        self.with_retry("warn", || {
            self.platform.warn_author(event, &verdict.reason)
        })
        .await
    }

    /// Delete first, warn regardless of the delete outcome. Both halves
    /// must land for an APPLIED result.
    async fn delete_and_warn(
        &self,
        event: &MessageEvent,
        verdict: &Verdict,
    ) -> Result<(), EnforcementError> {
        let delete_result = self.delete(event, true).await;
        let warn_result = self.warn(event, verdict).await;
        delete_result?;
        warn_result
    }

    async fn timeout_author(
        &self,
        event: &MessageEvent,
        verdict: &Verdict,
    ) -> Result<(), EnforcementError> {
        let days = verdict
            .suggested_ban_days
            .unwrap_or(self.settings.default_timeout_days)
            .min(self.settings.max_timeout_days);
        let duration = Duration::from_secs(u64::from(days) * 86_400);

        self.with_retry("timeout", || {
            self.platform.timeout_author(event, duration, &verdict.reason)
        })
        .await?;
        info!(
            "Timed out {} in {} for {} day(s)",
            event.author_name, event.scope, days
        );

        // The offending message comes down with the author
        if let Err(e) = self.delete(event, true).await {
            warn!(
                "Timeout applied but message {} could not be deleted: {}",
                event.event_id(),
                e
            );
        }
        Ok(())
    }

    async fn ban_author(
        &self,
        event: &MessageEvent,
        verdict: &Verdict,
    ) -> Result<(), EnforcementError> {
        let reason = format!(
            "{} | Category: {:?} | Severity: {:?}",
            self.settings.ban_reason_template, verdict.category, verdict.severity
        );
        self.with_retry("ban", || self.platform.ban_author(event, &reason))
            .await?;
        info!("Banned {} from {}", event.author_name, event.scope);

        if let Err(e) = self.delete(event, true).await {
            warn!(
                "Ban applied but message {} could not be deleted: {}",
                event.event_id(),
                e
            );
        }
        Ok(())
    }

    /// Run one platform call with a bounded timeout, retrying transient
    /// failures once. Permission and not-found errors are never retried.
    async fn with_retry<F, Fut>(
        &self,
        label: &'static str,
        mut op: F,
    ) -> Result<(), EnforcementError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), EnforcementError>>,
    {
        let mut attempt = 0;
        loop {
            let result = match timeout(self.settings.action_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(EnforcementError::PlatformUnavailable {
                    action: label,
                    detail: "timed out".to_string(),
                }),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < MAX_ACTION_RETRIES => {
                    attempt += 1;
                    warn!(
                        "Platform {} failed ({}), retry {}/{}",
                        label, e, attempt, MAX_ACTION_RETRIES
                    );
                    sleep(ACTION_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
