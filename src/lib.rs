//! # AI Content Moderation Relay
//!
//! A content-moderation engine written in Rust: inbound chat messages are
//! classified by a remote AI moderation API, gated against per-scope policy,
//! and enforced with a single terminal outcome per event.
//!
//! ## Features
//!
//! - **Remote AI Classification**: Two selectable upstream providers behind
//!   one canonical verdict schema
//! - **Per-Scope Policy**: Severity thresholds, whitelists, channel filters,
//!   and configurable enforcement actions with hot-reload
//! - **Idempotent Enforcement**: Duplicate event delivery never produces a
//!   second side effect
//! - **Bounded Concurrency**: Classifier calls queue instead of firing
//!   unbounded concurrent requests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use novamod::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(ConfigurationManager::new("config/moderation.yaml"));
//!     config.initialize().await?;
//!
//!     let settings = config.settings().await;
//!     let classifier = Arc::new(NovaClassifier::new(
//!         settings.api_provider,
//!         std::env::var("NOVA_API_KEY")?,
//!         Duration::from_secs(settings.classify_timeout_seconds),
//!     ));
//!     let platform = Arc::new(DiscordModerator::new(DiscordConfig::from_env()?));
//!
//!     let bot = Arc::new(
//!         ModerationBot::new(config, classifier, platform, CustomText::default()).await,
//!     );
//!     let (events, intake) = bot.start(256);
//!
//!     // Feed MessageEvents from your event source into `events` ...
//!     drop(events);
//!     intake.await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod classifier;
pub mod config;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::pipeline::{CustomText, FatalEvent};
    pub use crate::bot::{AutomodStatus, ModerationAnalysis, ModerationBot};
    pub use crate::classifier::{
        ApiProvider, ClassificationError, ModerationClassifier, NovaClassifier, ValidationError,
    };
    pub use crate::config::ConfigurationManager;
    pub use crate::platforms::{
        discord::{DiscordConfig, DiscordModerator},
        EnforcementError, PlatformModerator,
    };
    pub use crate::types::{
        ActionKind, ActionResult, Category, EnforcementDecision, EnforcementOutcome, MessageEvent,
        ScopePolicy, Severity, Verdict, VerdictStatus,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
