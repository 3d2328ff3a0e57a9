use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::classifier::{validate_content, ModerationClassifier};
use crate::config::ConfigurationManager;
use crate::platforms::PlatformModerator;
use crate::types::{
    ActionKind, EnforcementDecision, EnforcementOutcome, MessageEvent, Severity, Verdict,
};

pub mod executor;
pub mod pipeline;
pub mod policy;

use executor::{EnforcementExecutor, ExecutorSettings};
use pipeline::{CustomText, FatalEvent, PipelineCoordinator};

/// Result of an analyze-only (dry-run) invocation: what the classifier
/// said and what the policy gate would do, with nothing enforced
#[derive(Debug, Clone)]
pub struct ModerationAnalysis {
    pub verdict: Verdict,
    pub decision: EnforcementDecision,
}

/// Runtime snapshot for the presentation layer's status surface
#[derive(Debug, Clone)]
pub struct AutomodStatus {
    pub provider: String,
    pub default_enabled: bool,
    pub default_action: ActionKind,
    pub default_minimum_severity: Severity,
    pub scope_overrides: usize,
    pub enforced_events: usize,
}

/// Core moderation engine: wires the classifier, policy gate, and
/// enforcement executor behind a single submission surface
pub struct ModerationBot {
    config: Arc<ConfigurationManager>,
    coordinator: Arc<PipelineCoordinator>,
    outcome_notifier: broadcast::Sender<EnforcementOutcome>,
}

impl ModerationBot {
    pub async fn new(
        config: Arc<ConfigurationManager>,
        classifier: Arc<dyn ModerationClassifier>,
        platform: Arc<dyn PlatformModerator>,
        custom_text: CustomText,
    ) -> Self {
        let settings = config.settings().await;
        let executor = EnforcementExecutor::new(
            platform,
            ExecutorSettings {
                action_timeout: Duration::from_secs(settings.enforce_timeout_seconds),
                default_timeout_days: settings.default_timeout_days,
                max_timeout_days: settings.max_timeout_days,
                ban_reason_template: settings.ban_reason_template.clone(),
            },
        );
        let coordinator = Arc::new(PipelineCoordinator::new(
            classifier,
            executor,
            Arc::clone(&config),
            custom_text,
            settings.max_concurrent_classifications,
        ));
        let (outcome_notifier, _) = broadcast::channel(64);

        Self {
            config,
            coordinator,
            outcome_notifier,
        }
    }

    /// Process one event to its terminal outcome. Hosts await this for
    /// manual requests and fire-and-forget it for auto-moderation.
    pub async fn submit(&self, event: MessageEvent) -> EnforcementOutcome {
        let outcome = self.coordinator.submit(event).await;
        let _ = self.outcome_notifier.send(outcome.clone());
        outcome
    }

    /// Classify and gate without enforcing, for manual preview commands
    pub async fn analyze(&self, scope: &str, content: &str) -> Result<ModerationAnalysis> {
        validate_content(content)?;
        let verdict = self.coordinator.classify_only(scope, content).await?;
        let policy = self.config.policy_for(scope).await;
        let decision = policy::decide(scope, &verdict, &policy);
        Ok(ModerationAnalysis { verdict, decision })
    }

    /// The pure policy gate, exposed for preview invocations
    pub fn decide(
        scope: &str,
        verdict: &Verdict,
        policy: &crate::types::ScopePolicy,
    ) -> EnforcementDecision {
        policy::decide(scope, verdict, policy)
    }

    /// Outcomes of all runs, for the presentation/logging layer
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<EnforcementOutcome> {
        self.outcome_notifier.subscribe()
    }

    /// Process-fatal escalations (unusable credential)
    pub fn subscribe_fatal(&self) -> broadcast::Receiver<FatalEvent> {
        self.coordinator.subscribe_fatal()
    }

    /// Status snapshot for the /automod-status surface
    pub async fn automod_status(&self) -> AutomodStatus {
        let settings = self.config.settings().await;
        AutomodStatus {
            provider: settings.api_provider.name().to_string(),
            default_enabled: settings.default_policy.auto_moderate_enabled,
            default_action: settings.default_policy.action_on_trigger,
            default_minimum_severity: settings.default_policy.minimum_severity,
            scope_overrides: settings.scopes.len(),
            enforced_events: self.coordinator.enforced_count().await,
        }
    }

    /// Start the auto-moderation intake: a bounded queue of inbound events,
    /// each processed as its own pipeline run. Returns the sender the event
    /// source feeds; dropping it drains in-flight runs and stops the loop.
    pub fn start(
        &self,
        queue_depth: usize,
    ) -> (mpsc::Sender<MessageEvent>, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<MessageEvent>(queue_depth);
        let coordinator = Arc::clone(&self.coordinator);
        let outcome_notifier = self.outcome_notifier.clone();

        let handle = tokio::spawn(async move {
            let mut runs: JoinSet<()> = JoinSet::new();
            info!("Auto-moderation intake started (queue depth {})", queue_depth);

            loop {
                tokio::select! {
                    received = rx.recv() => {
                        match received {
                            Some(event) => {
                                let coordinator = Arc::clone(&coordinator);
                                let notifier = outcome_notifier.clone();
                                runs.spawn(async move {
                                    let outcome = coordinator.submit(event).await;
                                    let _ = notifier.send(outcome);
                                });
                            }
                            None => break,
                        }
                    }
                    // Reap finished runs so the set does not grow unbounded
                    Some(finished) = runs.join_next(), if !runs.is_empty() => {
                        if let Err(e) = finished {
                            warn!("Pipeline run panicked: {}", e);
                        }
                    }
                }
            }

            // Intake closed: drain remaining runs, never abort mid-action
            info!("Auto-moderation intake closed, draining {} run(s)", runs.len());
            while let Some(finished) = runs.join_next().await {
                if let Err(e) = finished {
                    warn!("Pipeline run panicked during drain: {}", e);
                }
            }
        });

        (tx, handle)
    }
}
