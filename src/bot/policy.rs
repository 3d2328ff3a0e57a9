// src/bot/policy.rs - Policy gate: verdict + scope policy -> enforcement decision

use crate::types::{
    EnforcementDecision, MessageEvent, ScopePolicy, SkipReason, Verdict, VerdictStatus,
};

/// Checks that need no verdict. The coordinator runs these before
/// classification so skipped events never spend classifier quota.
pub fn precheck(event: &MessageEvent, policy: &ScopePolicy) -> Option<SkipReason> {
    if !policy.auto_moderate_enabled {
        return Some(SkipReason::AutoModDisabled);
    }
    if policy.ignore_bots && event.author_is_bot {
        return Some(SkipReason::BotAuthor);
    }
    if !policy.whitelist.is_empty() && !policy.whitelist.contains(&event.scope) {
        return Some(SkipReason::ScopeNotWhitelisted);
    }
    if !policy.included_channels.is_empty() {
        if !policy.included_channels.contains(&event.channel) {
            return Some(SkipReason::ChannelFiltered);
        }
    } else if policy.excluded_channels.contains(&event.channel) {
        return Some(SkipReason::ChannelFiltered);
    }
    if policy.bypass_authors.contains(&event.author_id) {
        return Some(SkipReason::AuthorBypassed);
    }
    None
}

/// Decide whether a verdict triggers enforcement under a scope's policy.
/// Pure and deterministic in its inputs; also exposed standalone for
/// analyze-only invocations that must not enforce.
pub fn decide(scope: &str, verdict: &Verdict, policy: &ScopePolicy) -> EnforcementDecision {
    if !policy.auto_moderate_enabled {
        return EnforcementDecision::Skip {
            reason: SkipReason::AutoModDisabled,
        };
    }
    if !policy.whitelist.is_empty() && !policy.whitelist.contains(scope) {
        return EnforcementDecision::Skip {
            reason: SkipReason::ScopeNotWhitelisted,
        };
    }
    if verdict.status == VerdictStatus::Allowed {
        return EnforcementDecision::Skip {
            reason: SkipReason::ContentAllowed,
        };
    }
    if verdict.severity < policy.minimum_severity {
        return EnforcementDecision::Skip {
            reason: SkipReason::BelowSeverityThreshold,
        };
    }
    EnforcementDecision::Act {
        action: policy.action_on_trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, Category, RecommendedAction, Severity};

    fn verdict(status: VerdictStatus, category: Category, severity: Severity) -> Verdict {
        Verdict {
            status,
            category,
            severity,
            confidence: 0.9,
            recommended_action: RecommendedAction::Block,
            reason: "test".to_string(),
            signals: vec![],
            suggested_ban_days: None,
            uncertainty_flag: false,
            escalation_required: false,
        }
    }

    fn blocked(severity: Severity) -> Verdict {
        verdict(VerdictStatus::Blocked, Category::Harassment, severity)
    }

    fn event(scope: &str, channel: &str, author: &str, is_bot: bool) -> MessageEvent {
        MessageEvent {
            message_id: "1".to_string(),
            scope: scope.to_string(),
            channel: channel.to_string(),
            author_id: author.to_string(),
            author_name: author.to_string(),
            author_is_bot: is_bot,
            content: "hello".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    const ALL_SEVERITIES: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    #[test]
    fn decide_is_deterministic() {
        let policy = ScopePolicy::default();
        let verdict = blocked(Severity::High);
        assert_eq!(
            decide("g", &verdict, &policy),
            decide("g", &verdict, &policy)
        );
    }

    #[test]
    fn allowed_content_never_triggers() {
        let policy = ScopePolicy::default();
        let verdict = verdict(VerdictStatus::Allowed, Category::Safe, Severity::Low);
        assert_eq!(
            decide("g", &verdict, &policy),
            EnforcementDecision::Skip {
                reason: SkipReason::ContentAllowed
            }
        );
    }

    #[test]
    fn disabled_scope_never_triggers() {
        let policy = ScopePolicy {
            auto_moderate_enabled: false,
            ..Default::default()
        };
        assert!(!decide("g", &blocked(Severity::Critical), &policy).act());
    }

    #[test]
    fn severity_threshold_gates_enforcement() {
        let policy = ScopePolicy {
            minimum_severity: Severity::High,
            action_on_trigger: ActionKind::Delete,
            ..Default::default()
        };
        assert_eq!(
            decide("g", &blocked(Severity::Medium), &policy),
            EnforcementDecision::Skip {
                reason: SkipReason::BelowSeverityThreshold
            }
        );
        assert_eq!(
            decide("g", &blocked(Severity::High), &policy),
            EnforcementDecision::Act {
                action: ActionKind::Delete
            }
        );
    }

    #[test]
    fn severity_monotonicity() {
        // If a severity triggers under a threshold, every higher severity
        // must trigger under the same threshold.
        for threshold in ALL_SEVERITIES {
            let policy = ScopePolicy {
                minimum_severity: threshold,
                ..Default::default()
            };
            for (i, severity) in ALL_SEVERITIES.iter().enumerate() {
                if decide("g", &blocked(*severity), &policy).act() {
                    for higher in &ALL_SEVERITIES[i..] {
                        assert!(
                            decide("g", &blocked(*higher), &policy).act(),
                            "severity {:?} triggered but {:?} did not under {:?}",
                            severity,
                            higher,
                            threshold
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn whitelist_containment() {
        let policy = ScopePolicy {
            whitelist: ["allowed-guild".to_string()].into_iter().collect(),
            ..Default::default()
        };
        // Outside a non-empty whitelist: never act, regardless of verdict
        for severity in ALL_SEVERITIES {
            assert_eq!(
                decide("other-guild", &blocked(severity), &policy),
                EnforcementDecision::Skip {
                    reason: SkipReason::ScopeNotWhitelisted
                }
            );
        }
        assert!(decide("allowed-guild", &blocked(Severity::Critical), &policy).act());
    }

    #[test]
    fn empty_whitelist_allows_all_scopes() {
        let policy = ScopePolicy::default();
        assert!(decide("any-guild", &blocked(Severity::Low), &policy).act());
    }

    #[test]
    fn triggered_action_comes_from_policy() {
        let policy = ScopePolicy {
            action_on_trigger: ActionKind::Timeout,
            ..Default::default()
        };
        assert_eq!(
            decide("g", &blocked(Severity::Low), &policy).action(),
            Some(ActionKind::Timeout)
        );
    }

    #[test]
    fn precheck_skips_bots_when_configured() {
        let policy = ScopePolicy::default();
        assert_eq!(
            precheck(&event("g", "c", "u", true), &policy),
            Some(SkipReason::BotAuthor)
        );
        assert_eq!(precheck(&event("g", "c", "u", false), &policy), None);
    }

    #[test]
    fn precheck_channel_include_takes_precedence_over_exclude() {
        let policy = ScopePolicy {
            included_channels: ["mod-zone".to_string()].into_iter().collect(),
            excluded_channels: ["mod-zone".to_string()].into_iter().collect(),
            ..Default::default()
        };
        // Included list is authoritative when present
        assert_eq!(precheck(&event("g", "mod-zone", "u", false), &policy), None);
        assert_eq!(
            precheck(&event("g", "general", "u", false), &policy),
            Some(SkipReason::ChannelFiltered)
        );
    }

    #[test]
    fn precheck_excluded_channel_is_skipped() {
        let policy = ScopePolicy {
            excluded_channels: ["off-topic".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(
            precheck(&event("g", "off-topic", "u", false), &policy),
            Some(SkipReason::ChannelFiltered)
        );
    }

    #[test]
    fn precheck_bypass_author_is_skipped() {
        let policy = ScopePolicy {
            bypass_authors: ["mod-1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(
            precheck(&event("g", "c", "mod-1", false), &policy),
            Some(SkipReason::AuthorBypassed)
        );
    }
}
