// src/classifier/normalize.rs - Provider verdict normalization

use log::warn;

use crate::classifier::{DevVerdict, NovaVerdict, RawVerdict};
use crate::types::{Category, RecommendedAction, Severity, Verdict, VerdictStatus};

/// Map a raw provider verdict onto the canonical schema. Total and pure:
/// unknown vocabulary degrades to the most conservative classification
/// instead of being dropped.
pub fn normalize(raw: RawVerdict) -> Verdict {
    match raw {
        RawVerdict::Nova(v) => normalize_fields(Fields {
            status: v.status,
            category: v.category,
            severity: v.severity,
            confidence: v.confidence,
            action: v.action,
            reason: v.reason,
            signals: v.detected_signals,
            ban_days: v.banned_days,
            uncertainty_flag: v.uncertainty_flag,
            escalation_required: v.escalation_required,
        }),
        RawVerdict::Dev(v) => normalize_fields(Fields {
            status: v.result,
            category: v.category,
            severity: v.severity,
            confidence: v.confidence_score,
            action: v.recommended_action,
            reason: v.explanation,
            signals: v.flags,
            ban_days: v.ban_days,
            uncertainty_flag: v.uncertainty_flag,
            escalation_required: v.escalation_required,
        }),
    }
}

/// Provider-independent field bag both variants reduce to
struct Fields {
    status: String,
    category: String,
    severity: String,
    confidence: f32,
    action: String,
    reason: Option<String>,
    signals: Vec<String>,
    ban_days: Option<u32>,
    uncertainty_flag: bool,
    escalation_required: bool,
}

fn normalize_fields(fields: Fields) -> Verdict {
    let status = parse_status(&fields.status);
    let category = parse_category(&fields.category, status);
    // Invariant: BLOCKED iff category != SAFE. The category is the
    // authoritative signal when the two disagree, except that a blocked
    // status with a SAFE category is treated as an unknown category.
    let (status, category) = reconcile(status, category);
    let severity = parse_severity(&fields.severity);
    let recommended_action = parse_action(&fields.action);

    // Ban durations only make sense for removing actions
    let suggested_ban_days = match recommended_action {
        RecommendedAction::Block | RecommendedAction::Escalate => fields.ban_days,
        _ => None,
    };

    Verdict {
        status,
        category,
        severity,
        confidence: fields.confidence.clamp(0.0, 1.0),
        recommended_action,
        reason: fields
            .reason
            .unwrap_or_else(|| "No reason provided".to_string()),
        signals: fields.signals,
        suggested_ban_days,
        uncertainty_flag: fields.uncertainty_flag,
        escalation_required: fields.escalation_required,
    }
}

fn parse_status(raw: &str) -> VerdictStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ALLOWED" => VerdictStatus::Allowed,
        // Some provider versions spell BLOCKED as DISALLOWED
        "BLOCKED" | "DISALLOWED" => VerdictStatus::Blocked,
        other => {
            warn!("Unknown verdict status '{}', treating as BLOCKED", other);
            VerdictStatus::Blocked
        }
    }
}

fn parse_category(raw: &str, status: VerdictStatus) -> Category {
    match raw.trim().to_ascii_uppercase().as_str() {
        "SAFE" => Category::Safe,
        "HATE" => Category::Hate,
        "VIOLENCE" => Category::Violence,
        "SEXUAL" => Category::Sexual,
        "HARASSMENT" => Category::Harassment,
        "SELF_HARM" | "SELF-HARM" => Category::SelfHarm,
        "ILLEGAL" => Category::Illegal,
        other => {
            // Unknown category on an allowed verdict is harmless; on a
            // blocked one it must not silently under-classify.
            warn!("Unknown verdict category '{}'", other);
            match status {
                VerdictStatus::Allowed => Category::Safe,
                VerdictStatus::Blocked => Category::Harassment,
            }
        }
    }
}

fn reconcile(status: VerdictStatus, category: Category) -> (VerdictStatus, Category) {
    match (status, category) {
        (VerdictStatus::Allowed, Category::Safe) => (status, category),
        // Harmful category wins over a contradictory ALLOWED status
        (VerdictStatus::Allowed, harmful) => (VerdictStatus::Blocked, harmful),
        // Blocked with SAFE category: the block stands, category unknown
        (VerdictStatus::Blocked, Category::Safe) => (VerdictStatus::Blocked, Category::Harassment),
        (VerdictStatus::Blocked, harmful) => (VerdictStatus::Blocked, harmful),
    }
}

fn parse_severity(raw: &str) -> Severity {
    match raw.trim().to_ascii_uppercase().as_str() {
        "LOW" => Severity::Low,
        "MEDIUM" => Severity::Medium,
        "HIGH" => Severity::High,
        "CRITICAL" => Severity::Critical,
        other => {
            warn!("Unknown severity '{}', treating as HIGH", other);
            Severity::High
        }
    }
}

fn parse_action(raw: &str) -> RecommendedAction {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ALLOW" => RecommendedAction::Allow,
        "WARN" => RecommendedAction::Warn,
        "BLOCK" => RecommendedAction::Block,
        "ESCALATE" => RecommendedAction::Escalate,
        other => {
            warn!("Unknown recommended action '{}', treating as ESCALATE", other);
            RecommendedAction::Escalate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nova(status: &str, category: &str, severity: &str, action: &str) -> RawVerdict {
        RawVerdict::Nova(NovaVerdict {
            status: status.to_string(),
            category: category.to_string(),
            severity: severity.to_string(),
            confidence: 0.9,
            action: action.to_string(),
            reason: Some("test".to_string()),
            detected_signals: vec![],
            banned_days: None,
            uncertainty_flag: false,
            escalation_required: false,
        })
    }

    #[test]
    fn safe_allowed_passes_through() {
        let verdict = normalize(nova("ALLOWED", "SAFE", "LOW", "ALLOW"));
        assert_eq!(verdict.status, VerdictStatus::Allowed);
        assert_eq!(verdict.category, Category::Safe);
        assert_eq!(verdict.recommended_action, RecommendedAction::Allow);
    }

    #[test]
    fn status_category_invariant_holds_for_all_inputs() {
        let statuses = ["ALLOWED", "BLOCKED", "DISALLOWED", "garbage"];
        let categories = [
            "SAFE",
            "HATE",
            "VIOLENCE",
            "SEXUAL",
            "HARASSMENT",
            "SELF_HARM",
            "ILLEGAL",
            "garbage",
        ];
        for status in statuses {
            for category in categories {
                let verdict = normalize(nova(status, category, "HIGH", "BLOCK"));
                assert_eq!(
                    verdict.status == VerdictStatus::Blocked,
                    verdict.category != Category::Safe,
                    "invariant violated for status={} category={}",
                    status,
                    category
                );
            }
        }
    }

    #[test]
    fn unknown_severity_maps_to_high() {
        let verdict = normalize(nova("BLOCKED", "HATE", "EXTREME", "BLOCK"));
        assert_eq!(verdict.severity, Severity::High);
    }

    #[test]
    fn unknown_action_maps_to_escalate() {
        let verdict = normalize(nova("BLOCKED", "HATE", "HIGH", "NUKE"));
        assert_eq!(verdict.recommended_action, RecommendedAction::Escalate);
    }

    #[test]
    fn harmful_category_overrides_allowed_status() {
        let verdict = normalize(nova("ALLOWED", "VIOLENCE", "MEDIUM", "WARN"));
        assert_eq!(verdict.status, VerdictStatus::Blocked);
        assert_eq!(verdict.category, Category::Violence);
    }

    #[test]
    fn confidence_is_clamped() {
        let mut raw = NovaVerdict {
            status: "ALLOWED".to_string(),
            category: "SAFE".to_string(),
            severity: "LOW".to_string(),
            confidence: 1.7,
            action: "ALLOW".to_string(),
            reason: None,
            detected_signals: vec![],
            banned_days: None,
            uncertainty_flag: false,
            escalation_required: false,
        };
        let verdict = normalize(RawVerdict::Nova(raw.clone()));
        assert_eq!(verdict.confidence, 1.0);

        raw.confidence = -0.5;
        let verdict = normalize(RawVerdict::Nova(raw));
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn ban_days_dropped_for_non_removing_actions() {
        let raw = RawVerdict::Nova(NovaVerdict {
            status: "BLOCKED".to_string(),
            category: "HARASSMENT".to_string(),
            severity: "MEDIUM".to_string(),
            confidence: 0.8,
            action: "WARN".to_string(),
            reason: None,
            detected_signals: vec![],
            banned_days: Some(5),
            uncertainty_flag: false,
            escalation_required: false,
        });
        assert_eq!(normalize(raw).suggested_ban_days, None);
    }

    #[test]
    fn dev_variant_field_spellings_are_absorbed() {
        let raw = RawVerdict::Dev(DevVerdict {
            result: "BLOCKED".to_string(),
            category: "ILLEGAL".to_string(),
            severity: "CRITICAL".to_string(),
            confidence_score: 0.97,
            recommended_action: "ESCALATE".to_string(),
            explanation: Some("contraband offer".to_string()),
            flags: vec!["contraband".to_string()],
            ban_days: Some(30),
            uncertainty_flag: false,
            escalation_required: true,
        });
        let verdict = normalize(raw);
        assert_eq!(verdict.category, Category::Illegal);
        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.suggested_ban_days, Some(30));
        assert_eq!(verdict.reason, "contraband offer");
        assert!(verdict.escalation_required);
    }
}
