// src/bot/pipeline.rs - Per-event pipeline coordination

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, Semaphore};

use crate::bot::executor::EnforcementExecutor;
use crate::bot::policy;
use crate::classifier::{
    normalize::normalize, validate_content, ClassificationError, ModerationClassifier,
    POLICY_MAX_CHARS, INSTRUCTIONS_MAX_CHARS,
};
use crate::config::{combine_custom_text, ConfigurationManager};
use crate::types::{EnforcementOutcome, MessageEvent, SkipReason, Verdict};

/// Stages a run moves through, strictly in order. DONE and FAILED are
/// terminal; no stage is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Received,
    Classifying,
    Deciding,
    Enforcing,
    Done,
    Failed,
}

/// Process-fatal conditions escalated to the host, distinct from
/// per-event failures
#[derive(Debug, Clone)]
pub enum FatalEvent {
    /// The classifier credential is unusable for all subsequent events
    CredentialRejected,
}

/// Custom text loaded once at startup from policy.txt / instructions.txt
#[derive(Debug, Clone, Default)]
pub struct CustomText {
    pub policy: Option<String>,
    pub instructions: Option<String>,
}

/// Drives one MessageEvent through classify -> decide -> enforce, emitting
/// exactly one EnforcementOutcome. Safe to share across many concurrent
/// runs.
pub struct PipelineCoordinator {
    classifier: Arc<dyn ModerationClassifier>,
    executor: EnforcementExecutor,
    config: Arc<ConfigurationManager>,
    custom_text: CustomText,
    /// Event ids already enforced (or currently enforcing). Entries are
    /// permanent for the process lifetime.
    enforced_ids: Arc<RwLock<HashSet<String>>>,
    /// Bounds how many runs sit in CLASSIFYING at once
    classify_slots: Arc<Semaphore>,
    /// Latched when the provider rejects our credential
    auth_failed: Arc<AtomicBool>,
    fatal_notifier: broadcast::Sender<FatalEvent>,
}

impl PipelineCoordinator {
    pub fn new(
        classifier: Arc<dyn ModerationClassifier>,
        executor: EnforcementExecutor,
        config: Arc<ConfigurationManager>,
        custom_text: CustomText,
        max_concurrent_classifications: usize,
    ) -> Self {
        let (fatal_notifier, _) = broadcast::channel(4);
        Self {
            classifier,
            executor,
            config,
            custom_text,
            enforced_ids: Arc::new(RwLock::new(HashSet::new())),
            classify_slots: Arc::new(Semaphore::new(max_concurrent_classifications.max(1))),
            auth_failed: Arc::new(AtomicBool::new(false)),
            fatal_notifier,
        }
    }

    /// Subscribe to process-fatal escalations
    pub fn subscribe_fatal(&self) -> broadcast::Receiver<FatalEvent> {
        self.fatal_notifier.subscribe()
    }

    /// How many event ids the suppression set currently holds
    pub async fn enforced_count(&self) -> usize {
        self.enforced_ids.read().await.len()
    }

    /// Process one event to a terminal outcome. Never returns an error:
    /// every stage failure is converted into a FAILED outcome.
    pub async fn submit(&self, event: MessageEvent) -> EnforcementOutcome {
        let event_id = event.event_id();

        // Bad input never enters the state machine
        if let Err(e) = validate_content(&event.content) {
            debug!("Rejected event {}: {}", event_id, e);
            return EnforcementOutcome::failed(event_id, None, None, e.to_string());
        }

        if self.auth_failed.load(Ordering::SeqCst) {
            return EnforcementOutcome::failed(
                event_id,
                None,
                None,
                "classifier credential rejected; moderation halted".to_string(),
            );
        }

        debug!("Event {} entered pipeline at {:?}", event_id, RunStage::Received);

        // Policy pre-filters run before classification so skipped events
        // never spend classifier quota.
        let policy_snapshot = self.config.policy_for(&event.scope).await;
        if let Some(reason) = policy::precheck(&event, &policy_snapshot) {
            debug!("Event {} skipped pre-classification: {:?}", event_id, reason);
            return EnforcementOutcome::skipped(event_id, None, reason);
        }

        // CLASSIFYING
        let verdict = match self.classify(&event, &policy_snapshot).await {
            Ok(verdict) => verdict,
            Err(e) => {
                if e.is_auth() {
                    self.escalate_auth_failure();
                }
                error!(
                    "Event {} failed at {:?}: {}",
                    event_id,
                    RunStage::Classifying,
                    e
                );
                return EnforcementOutcome::failed(event_id, None, None, e.to_string());
            }
        };

        // DECIDING - fresh policy snapshot; this run's view of the policy
        // is fixed from here on
        debug!("Event {} entering {:?}", event_id, RunStage::Deciding);
        let policy_snapshot = self.config.policy_for(&event.scope).await;
        let decision = policy::decide(&event.scope, &verdict, &policy_snapshot);
        let action = match decision {
            crate::types::EnforcementDecision::Skip { reason } => {
                debug!("Event {} gated off: {:?}", event_id, reason);
                return EnforcementOutcome::skipped(event_id, Some(verdict), reason);
            }
            crate::types::EnforcementDecision::Act { action } => action,
        };

        // ENFORCING - atomic check-and-insert guards against duplicate
        // delivery; the reservation is permanent even if enforcement fails
        debug!("Event {} entering {:?}", event_id, RunStage::Enforcing);
        {
            let mut enforced = self.enforced_ids.write().await;
            if !enforced.insert(event_id.clone()) {
                debug!("Event {} suppressed as duplicate", event_id);
                return EnforcementOutcome::skipped(
                    event_id,
                    Some(verdict),
                    SkipReason::DuplicateEvent,
                );
            }
        }

        let outcome = self.executor.enforce(&event, action, &verdict).await;
        match outcome.result {
            crate::types::ActionResult::Applied => {
                info!(
                    "Event {} enforced: {} ({:?}/{:?}), run {:?}",
                    event_id,
                    action.label(),
                    verdict.category,
                    verdict.severity,
                    RunStage::Done
                );
            }
            _ => {
                warn!(
                    "Event {} enforcement {} ended {:?}: {}",
                    event_id,
                    action.label(),
                    RunStage::Failed,
                    outcome.reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        outcome
    }

    /// Classify and normalize without deciding or enforcing. Used by the
    /// analyze-only manual path.
    pub async fn classify_only(
        &self,
        scope: &str,
        content: &str,
    ) -> Result<Verdict, ClassificationError> {
        let policy_snapshot = self.config.policy_for(scope).await;
        let event_like = MessageEvent {
            message_id: String::new(),
            scope: scope.to_string(),
            channel: String::new(),
            author_id: String::new(),
            author_name: String::new(),
            author_is_bot: false,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.classify(&event_like, &policy_snapshot).await
    }

    async fn classify(
        &self,
        event: &MessageEvent,
        policy_snapshot: &crate::types::ScopePolicy,
    ) -> Result<Verdict, ClassificationError> {
        let policy_text = combine_custom_text(
            self.custom_text.policy.as_deref(),
            policy_snapshot.custom_policy_text.as_deref(),
            POLICY_MAX_CHARS,
        );
        let instructions_text = combine_custom_text(
            self.custom_text.instructions.as_deref(),
            policy_snapshot.custom_instructions_text.as_deref(),
            INSTRUCTIONS_MAX_CHARS,
        );

        // Queue rather than fire unbounded concurrent requests
        let _permit = match self.classify_slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err(ClassificationError::ProviderUnavailable { status: 0 });
            }
        };

        let raw = self
            .classifier
            .classify(
                &event.content,
                policy_text.as_deref(),
                instructions_text.as_deref(),
            )
            .await?;
        Ok(normalize(raw))
    }

    fn escalate_auth_failure(&self) {
        if !self.auth_failed.swap(true, Ordering::SeqCst) {
            error!("Classifier credential rejected; escalating to host");
            let _ = self.fatal_notifier.send(FatalEvent::CredentialRejected);
        }
    }
}
