// src/classifier/mod.rs - Remote moderation classifier client

use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod normalize;

/// Maximum content length accepted by the upstream moderation API
pub const CONTENT_MAX_CHARS: usize = 50_000;
/// Maximum custom policy text length
pub const POLICY_MAX_CHARS: usize = 10_000;
/// Maximum custom instructions text length
pub const INSTRUCTIONS_MAX_CHARS: usize = 2_000;

/// Additional attempts after the first failed call, retryable errors only
const MAX_RETRIES: u32 = 2;
/// Base delay for exponential backoff between retries
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Bad input rejected before any network call is made
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content is empty")]
    EmptyContent,
    #[error("content exceeds maximum length of {max} characters ({len} given)")]
    ContentTooLong { len: usize, max: usize },
}

/// Typed failure from the classifier client
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// Credential rejected by the provider. Fatal for all subsequent
    /// events, not just this one.
    #[error("moderation API rejected credential (status {status})")]
    Auth { status: u16 },
    #[error("moderation API rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("moderation API call timed out")]
    Timeout,
    #[error("moderation API unavailable (status {status})")]
    ProviderUnavailable { status: u16 },
    #[error("moderation API returned malformed response: {detail}")]
    MalformedResponse { detail: String },
}

impl ClassificationError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassificationError::RateLimited { .. }
                | ClassificationError::Timeout
                | ClassificationError::ProviderUnavailable { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClassificationError::Auth { .. })
    }
}

/// Reject content the upstream would refuse, before spending quota on it
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = content.chars().count();
    if len > CONTENT_MAX_CHARS {
        return Err(ValidationError::ContentTooLong {
            len,
            max: CONTENT_MAX_CHARS,
        });
    }
    Ok(())
}

/// Truncate optional request text to its provider limit
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Selectable upstream moderation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiProvider {
    /// Paid/enterprise tier
    NovaAi,
    /// Free developer tier
    NabzclanDev,
}

impl ApiProvider {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ApiProvider::NovaAi => "https://novaaiapi.nabzclan.vip/v1/moderation",
            ApiProvider::NabzclanDev => "https://developer.nabzclan.vip/api/v1/moderation",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiProvider::NovaAi => "nova_ai",
            ApiProvider::NabzclanDev => "nabzclan_dev",
        }
    }
}

/// Raw provider verdict before normalization. Closed union: one variant per
/// provider schema; anything else is a malformed response.
#[derive(Debug, Clone)]
pub enum RawVerdict {
    Nova(NovaVerdict),
    Dev(DevVerdict),
}

/// Paid-tier response shape: a flat verdict object
#[derive(Debug, Clone, Deserialize)]
pub struct NovaVerdict {
    pub status: String,
    pub category: String,
    pub severity: String,
    #[serde(default)]
    pub confidence: f32,
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detected_signals: Vec<String>,
    #[serde(default)]
    pub banned_days: Option<u32>,
    #[serde(default)]
    pub uncertainty_flag: bool,
    #[serde(default)]
    pub escalation_required: bool,
}

/// Free-tier response shape: the verdict nested under a success envelope
/// with its own field spellings
#[derive(Debug, Clone, Deserialize)]
pub struct DevEnvelope {
    pub success: bool,
    pub data: DevVerdict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevVerdict {
    pub result: String,
    pub category: String,
    pub severity: String,
    #[serde(default)]
    pub confidence_score: f32,
    pub recommended_action: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub ban_days: Option<u32>,
    #[serde(default)]
    pub uncertainty_flag: bool,
    #[serde(default)]
    pub escalation_required: bool,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

/// Seam between the pipeline and the remote classifier. The HTTP client
/// implements this; tests substitute scripted verdicts.
#[async_trait]
pub trait ModerationClassifier: Send + Sync {
    async fn classify(
        &self,
        content: &str,
        policy: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<RawVerdict, ClassificationError>;
}

/// HTTP client for the Nova moderation API family
pub struct NovaClassifier {
    provider: ApiProvider,
    api_key: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl NovaClassifier {
    pub fn new(provider: ApiProvider, api_key: String, request_timeout: Duration) -> Self {
        Self {
            provider,
            api_key,
            http_client: reqwest::Client::new(),
            request_timeout,
        }
    }

    /// Single request/response cycle, no retry handling
    async fn call_once(
        &self,
        content: &str,
        policy: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<RawVerdict, ClassificationError> {
        let request = ModerationRequest {
            content,
            policy: policy.map(|p| truncate_chars(p, POLICY_MAX_CHARS)),
            instructions: instructions.map(|i| truncate_chars(i, INSTRUCTIONS_MAX_CHARS)),
        };

        let response = self
            .http_client
            .post(self.provider.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassificationError::Timeout
                } else {
                    // Connection-level failures are transient for our purposes
                    ClassificationError::ProviderUnavailable { status: 0 }
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                let body = response.text().await.map_err(|e| {
                    ClassificationError::MalformedResponse {
                        detail: format!("failed to read body: {}", e),
                    }
                })?;
                self.parse_body(&body)
            }
            401 | 403 => Err(ClassificationError::Auth {
                status: status.as_u16(),
            }),
            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ClassificationError::RateLimited { retry_after })
            }
            code if code >= 500 => Err(ClassificationError::ProviderUnavailable { status: code }),
            code => Err(ClassificationError::MalformedResponse {
                detail: format!("unexpected status {}", code),
            }),
        }
    }

    /// Deserialize into the provider's variant of the raw verdict union
    fn parse_body(&self, body: &str) -> Result<RawVerdict, ClassificationError> {
        match self.provider {
            ApiProvider::NovaAi => serde_json::from_str::<NovaVerdict>(body)
                .map(RawVerdict::Nova)
                .map_err(|e| ClassificationError::MalformedResponse {
                    detail: e.to_string(),
                }),
            ApiProvider::NabzclanDev => {
                let envelope: DevEnvelope = serde_json::from_str(body).map_err(|e| {
                    ClassificationError::MalformedResponse {
                        detail: e.to_string(),
                    }
                })?;
                if !envelope.success {
                    return Err(ClassificationError::MalformedResponse {
                        detail: "provider envelope reported success=false".to_string(),
                    });
                }
                Ok(RawVerdict::Dev(envelope.data))
            }
        }
    }

    /// Backoff delay before retry `attempt` (1-based), with jitter. A
    /// rate-limit hint from the provider takes precedence.
    fn backoff_delay(attempt: u32, error: &ClassificationError) -> Duration {
        if let ClassificationError::RateLimited {
            retry_after: Some(hint),
        } = error
        {
            return *hint;
        }
        let base = RETRY_BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
        let jitter = rand::rng().random_range(0..RETRY_BASE_DELAY_MS / 2);
        Duration::from_millis(base + jitter)
    }
}

#[async_trait]
impl ModerationClassifier for NovaClassifier {
    async fn classify(
        &self,
        content: &str,
        policy: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<RawVerdict, ClassificationError> {
        let mut attempt = 0;
        loop {
            match self.call_once(content, policy, instructions).await {
                Ok(raw) => {
                    debug!(
                        "Classifier call succeeded via {} on attempt {}",
                        self.provider.name(),
                        attempt + 1
                    );
                    return Ok(raw);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = Self::backoff_delay(attempt, &e);
                    warn!(
                        "Classifier call failed ({}), retry {}/{} in {:?}",
                        e, attempt, MAX_RETRIES, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_rejected() {
        assert_eq!(validate_content("   "), Err(ValidationError::EmptyContent));
    }

    #[test]
    fn oversized_content_is_rejected_client_side() {
        let content = "x".repeat(CONTENT_MAX_CHARS + 1);
        assert!(matches!(
            validate_content(&content),
            Err(ValidationError::ContentTooLong { .. })
        ));
        assert!(validate_content(&"x".repeat(CONTENT_MAX_CHARS)).is_ok());
    }

    #[test]
    fn policy_text_is_truncated_not_rejected() {
        let long = "p".repeat(POLICY_MAX_CHARS + 100);
        assert_eq!(truncate_chars(&long, POLICY_MAX_CHARS).chars().count(), POLICY_MAX_CHARS);
    }

    #[test]
    fn retryability_classification() {
        assert!(!ClassificationError::Auth { status: 401 }.is_retryable());
        assert!(!ClassificationError::MalformedResponse {
            detail: "x".to_string()
        }
        .is_retryable());
        assert!(ClassificationError::Timeout.is_retryable());
        assert!(ClassificationError::RateLimited { retry_after: None }.is_retryable());
        assert!(ClassificationError::ProviderUnavailable { status: 503 }.is_retryable());
    }

    #[test]
    fn provider_endpoints_differ() {
        assert_ne!(
            ApiProvider::NovaAi.endpoint(),
            ApiProvider::NabzclanDev.endpoint()
        );
    }

    #[test]
    fn provider_selection_parses_config_spelling() {
        let provider: ApiProvider = serde_yaml::from_str("NABZCLAN_DEV").unwrap();
        assert_eq!(provider, ApiProvider::NabzclanDev);
    }

    #[test]
    fn nova_body_parses_into_nova_variant() {
        let client = NovaClassifier::new(
            ApiProvider::NovaAi,
            "key".to_string(),
            Duration::from_secs(10),
        );
        let body = r#"{
            "status": "BLOCKED",
            "category": "HARASSMENT",
            "severity": "HIGH",
            "confidence": 0.93,
            "action": "BLOCK",
            "reason": "targeted insults",
            "detected_signals": ["insult", "targeting"],
            "banned_days": 3
        }"#;
        match client.parse_body(body).unwrap() {
            RawVerdict::Nova(v) => {
                assert_eq!(v.status, "BLOCKED");
                assert_eq!(v.banned_days, Some(3));
                assert_eq!(v.detected_signals.len(), 2);
            }
            RawVerdict::Dev(_) => panic!("expected Nova variant"),
        }
    }

    #[test]
    fn dev_body_parses_into_dev_variant() {
        let client = NovaClassifier::new(
            ApiProvider::NabzclanDev,
            "key".to_string(),
            Duration::from_secs(10),
        );
        let body = r#"{
            "success": true,
            "data": {
                "result": "ALLOWED",
                "category": "SAFE",
                "severity": "LOW",
                "confidence_score": 0.99,
                "recommended_action": "ALLOW"
            }
        }"#;
        match client.parse_body(body).unwrap() {
            RawVerdict::Dev(v) => {
                assert_eq!(v.result, "ALLOWED");
                assert_eq!(v.category, "SAFE");
            }
            RawVerdict::Nova(_) => panic!("expected Dev variant"),
        }
    }

    #[test]
    fn unrecognized_shape_is_malformed_not_guessed() {
        let client = NovaClassifier::new(
            ApiProvider::NovaAi,
            "key".to_string(),
            Duration::from_secs(10),
        );
        let err = client.parse_body(r#"{"totally": "different"}"#).unwrap_err();
        assert!(matches!(err, ClassificationError::MalformedResponse { .. }));
    }

    #[test]
    fn failed_dev_envelope_is_malformed() {
        let client = NovaClassifier::new(
            ApiProvider::NabzclanDev,
            "key".to_string(),
            Duration::from_secs(10),
        );
        let body = r#"{"success": false, "data": {"result": "ALLOWED", "category": "SAFE", "severity": "LOW", "recommended_action": "ALLOW"}}"#;
        assert!(matches!(
            client.parse_body(body).unwrap_err(),
            ClassificationError::MalformedResponse { .. }
        ));
    }

    #[test]
    fn rate_limit_hint_overrides_backoff() {
        let err = ClassificationError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(
            NovaClassifier::backoff_delay(1, &err),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn backoff_grows_exponentially() {
        let err = ClassificationError::Timeout;
        let first = NovaClassifier::backoff_delay(1, &err);
        let second = NovaClassifier::backoff_delay(2, &err);
        assert!(first >= Duration::from_millis(RETRY_BASE_DELAY_MS));
        assert!(second >= Duration::from_millis(RETRY_BASE_DELAY_MS * 2));
    }
}
