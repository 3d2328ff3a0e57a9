// src/types/mod.rs - Core moderation pipeline types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One inbound unit of moderation work. Immutable once received; owned by a
/// single pipeline run for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Platform message id, unique within its scope
    pub message_id: String,
    /// Server/guild/group the message belongs to
    pub scope: String,
    /// Channel within the scope
    pub channel: String,
    pub author_id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl MessageEvent {
    /// Globally unique event identifier (scope + message id). Duplicate
    /// suppression keys on this.
    pub fn event_id(&self) -> String {
        format!("{}:{}", self.scope, self.message_id)
    }
}

/// Whether the classifier considers the content publishable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Allowed,
    Blocked,
}

/// Harm category. `Safe` is the only category compatible with an
/// `Allowed` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Safe,
    Hate,
    Violence,
    Sexual,
    Harassment,
    SelfHarm,
    Illegal,
}

/// Harm magnitude, totally ordered: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the classifier recommends doing about the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendedAction {
    Allow,
    Warn,
    Block,
    Escalate,
}

/// Canonical, provider-independent moderation result for one message.
/// Produced once per event by the verdict normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub category: Category,
    pub severity: Severity,
    /// Classifier confidence, clamped to [0.0, 1.0]
    pub confidence: f32,
    pub recommended_action: RecommendedAction,
    pub reason: String,
    /// Specific triggers the classifier detected
    pub signals: Vec<String>,
    /// Suggested removal duration in whole days, present only when the
    /// recommended action implies removal
    pub suggested_ban_days: Option<u32>,
    pub uncertainty_flag: bool,
    pub escalation_required: bool,
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        self.status == VerdictStatus::Blocked
    }
}

/// Concrete remediation applied when a scope's policy triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Delete,
    Warn,
    Log,
    DeleteAndWarn,
    Timeout,
    Ban,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Delete => "delete",
            ActionKind::Warn => "warn",
            ActionKind::Log => "log",
            ActionKind::DeleteAndWarn => "delete_and_warn",
            ActionKind::Timeout => "timeout",
            ActionKind::Ban => "ban",
        }
    }
}

/// Why the policy gate (or the coordinator) declined to enforce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AutoModDisabled,
    BotAuthor,
    ScopeNotWhitelisted,
    ChannelFiltered,
    AuthorBypassed,
    ContentAllowed,
    BelowSeverityThreshold,
    DuplicateEvent,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::AutoModDisabled => "auto-moderation disabled for scope",
            SkipReason::BotAuthor => "author is a bot",
            SkipReason::ScopeNotWhitelisted => "scope not in whitelist",
            SkipReason::ChannelFiltered => "channel excluded from moderation",
            SkipReason::AuthorBypassed => "author has bypass",
            SkipReason::ContentAllowed => "content allowed by classifier",
            SkipReason::BelowSeverityThreshold => "severity below configured threshold",
            SkipReason::DuplicateEvent => "event already enforced",
        }
    }
}

/// Outcome of gating one verdict against one scope policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementDecision {
    /// Policy triggered: apply this action
    Act { action: ActionKind },
    /// Policy did not trigger
    Skip { reason: SkipReason },
}

impl EnforcementDecision {
    pub fn act(&self) -> bool {
        matches!(self, EnforcementDecision::Act { .. })
    }

    pub fn action(&self) -> Option<ActionKind> {
        match self {
            EnforcementDecision::Act { action } => Some(*action),
            EnforcementDecision::Skip { .. } => None,
        }
    }
}

/// Terminal result class of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionResult {
    Applied,
    Skipped,
    Failed,
}

/// Terminal record of one pipeline run. Exactly one is emitted per
/// submitted event.
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub event_id: String,
    /// Absent when classification failed before a verdict existed
    pub verdict: Option<Verdict>,
    /// The action attempted, if any
    pub action: Option<ActionKind>,
    pub result: ActionResult,
    pub reason: Option<String>,
}

impl EnforcementOutcome {
    pub fn applied(event_id: String, verdict: Verdict, action: ActionKind) -> Self {
        Self {
            event_id,
            verdict: Some(verdict),
            action: Some(action),
            result: ActionResult::Applied,
            reason: None,
        }
    }

    pub fn skipped(event_id: String, verdict: Option<Verdict>, reason: SkipReason) -> Self {
        Self {
            event_id,
            verdict,
            action: None,
            result: ActionResult::Skipped,
            reason: Some(reason.describe().to_string()),
        }
    }

    pub fn failed(
        event_id: String,
        verdict: Option<Verdict>,
        action: Option<ActionKind>,
        reason: String,
    ) -> Self {
        Self {
            event_id,
            verdict,
            action,
            result: ActionResult::Failed,
            reason: Some(reason),
        }
    }
}

/// Per-scope moderation configuration. Loaded from file at startup,
/// hot-reloaded between runs, snapshotted per pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopePolicy {
    #[serde(default = "default_true")]
    pub auto_moderate_enabled: bool,
    #[serde(default = "default_action")]
    pub action_on_trigger: ActionKind,
    #[serde(default = "default_severity")]
    pub minimum_severity: Severity,
    /// Allowed scope ids; empty means all scopes are allowed
    #[serde(default)]
    pub whitelist: HashSet<String>,
    #[serde(default = "default_true")]
    pub ignore_bots: bool,
    /// Author ids exempt from auto-moderation
    #[serde(default)]
    pub bypass_authors: HashSet<String>,
    /// If non-empty, only these channels are moderated
    #[serde(default)]
    pub included_channels: HashSet<String>,
    /// Channels never moderated (ignored when included_channels is set)
    #[serde(default)]
    pub excluded_channels: HashSet<String>,
    /// Channel the presentation layer posts moderation alerts to
    #[serde(default)]
    pub log_channel: Option<String>,
    #[serde(default)]
    pub custom_policy_text: Option<String>,
    #[serde(default)]
    pub custom_instructions_text: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_action() -> ActionKind {
    ActionKind::DeleteAndWarn
}

fn default_severity() -> Severity {
    Severity::Low
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            auto_moderate_enabled: true,
            action_on_trigger: ActionKind::DeleteAndWarn,
            minimum_severity: Severity::Low,
            whitelist: HashSet::new(),
            ignore_bots: true,
            bypass_authors: HashSet::new(),
            included_channels: HashSet::new(),
            excluded_channels: HashSet::new(),
            log_channel: None,
            custom_policy_text: None,
            custom_instructions_text: None,
        }
    }
}
