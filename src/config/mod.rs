// src/config/mod.rs - Moderation configuration management

use anyhow::{Context, Result};
use log::{error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, Duration};

use crate::classifier::{ApiProvider, INSTRUCTIONS_MAX_CHARS, POLICY_MAX_CHARS};
use crate::types::ScopePolicy;

/// Top-level moderation settings loaded from the YAML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationSettings {
    #[serde(default = "default_provider")]
    pub api_provider: ApiProvider,
    /// Upper bound on one classifier HTTP call
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout_seconds: u64,
    /// Upper bound on one platform action call
    #[serde(default = "default_enforce_timeout")]
    pub enforce_timeout_seconds: u64,
    /// How many events may sit in CLASSIFYING at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_classifications: usize,
    /// Timeout applied when the classifier suggests no duration
    #[serde(default = "default_timeout_days")]
    pub default_timeout_days: u32,
    /// Platform cap on timeout length (Discord allows 28 days)
    #[serde(default = "default_max_timeout_days")]
    pub max_timeout_days: u32,
    #[serde(default = "default_ban_reason")]
    pub ban_reason_template: String,
    /// Policy applied to scopes without an explicit entry
    #[serde(default)]
    pub default_policy: ScopePolicy,
    /// Per-scope policy overrides, keyed by scope id
    #[serde(default)]
    pub scopes: HashMap<String, ScopePolicy>,
}

fn default_provider() -> ApiProvider {
    ApiProvider::NovaAi
}

fn default_classify_timeout() -> u64 {
    30
}

fn default_enforce_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    8
}

fn default_timeout_days() -> u32 {
    1
}

fn default_max_timeout_days() -> u32 {
    28
}

fn default_ban_reason() -> String {
    "Automatic ban: content policy violation".to_string()
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            api_provider: default_provider(),
            classify_timeout_seconds: default_classify_timeout(),
            enforce_timeout_seconds: default_enforce_timeout(),
            max_concurrent_classifications: default_max_concurrent(),
            default_timeout_days: default_timeout_days(),
            max_timeout_days: default_max_timeout_days(),
            ban_reason_template: default_ban_reason(),
            default_policy: ScopePolicy::default(),
            scopes: HashMap::new(),
        }
    }
}

/// Events broadcasted when configuration changes
#[derive(Debug, Clone)]
pub enum ConfigChangeEvent {
    PoliciesReloaded { file: String },
    ValidationError { file: String, error: String },
}

/// Manages the moderation config file with hot-reload support. Pipeline
/// runs take a snapshot at DECIDING entry; a reload mid-run never tears an
/// in-flight run's view of its policy.
pub struct ConfigurationManager {
    config_path: PathBuf,
    settings: Arc<RwLock<ModerationSettings>>,
    change_notifier: broadcast::Sender<ConfigChangeEvent>,
    watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        let (change_notifier, _) = broadcast::channel(16);
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            settings: Arc::new(RwLock::new(ModerationSettings::default())),
            change_notifier,
            watchers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Load the config file, falling back to defaults when it is absent
    pub async fn initialize(&self) -> Result<()> {
        if self.config_path.exists() {
            self.reload().await?;
            info!(
                "Loaded moderation config from {}",
                self.config_path.display()
            );
        } else {
            warn!(
                "Config file {} not found, using defaults",
                self.config_path.display()
            );
        }
        Ok(())
    }

    /// Re-read and swap the settings. In-flight runs keep their snapshot.
    pub async fn reload(&self) -> Result<()> {
        reload_into(&self.config_path, &self.settings).await?;
        let _ = self.change_notifier.send(ConfigChangeEvent::PoliciesReloaded {
            file: self.config_path.display().to_string(),
        });
        Ok(())
    }

    /// Subscribe to configuration change events
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_notifier.subscribe()
    }

    /// Snapshot of the full settings
    pub async fn settings(&self) -> ModerationSettings {
        self.settings.read().await.clone()
    }

    /// Snapshot of the policy governing one scope
    pub async fn policy_for(&self, scope: &str) -> ScopePolicy {
        let settings = self.settings.read().await;
        settings
            .scopes
            .get(scope)
            .cloned()
            .unwrap_or_else(|| settings.default_policy.clone())
    }

    /// Watch the config file and hot-reload on change
    pub async fn start_watching(&self) -> Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            if let Ok(event) = result {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })
        .context("failed to create config watcher")?;

        let watch_dir = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", watch_dir.display()))?;
        self.watchers.write().await.push(watcher);

        let config_path = self.config_path.clone();
        let settings = Arc::clone(&self.settings);
        let change_notifier = self.change_notifier.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Editors fire bursts of events per save; settle first
                sleep(Duration::from_millis(500)).await;
                while rx.try_recv().is_ok() {}

                match reload_into(&config_path, &settings).await {
                    Ok(()) => {
                        info!("Moderation config hot-reloaded");
                        let _ = change_notifier.send(ConfigChangeEvent::PoliciesReloaded {
                            file: config_path.display().to_string(),
                        });
                    }
                    Err(e) => {
                        error!("Config reload failed, keeping previous settings: {:#}", e);
                        let _ = change_notifier.send(ConfigChangeEvent::ValidationError {
                            file: config_path.display().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        info!("Watching {} for config changes", watch_dir.display());
        Ok(())
    }
}

/// Parse the file and swap it in; on error the previous settings stand
async fn reload_into(path: &Path, settings: &RwLock<ModerationSettings>) -> Result<()> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: ModerationSettings = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    *settings.write().await = parsed;
    Ok(())
}

/// Load custom policy text from policy.txt. Keeps `#policy` directive lines
/// and plain lines, strips other comments, truncates to the provider limit.
pub async fn load_policy_text<P: AsRef<Path>>(path: P) -> Option<String> {
    let content = fs::read_to_string(path.as_ref()).await.ok()?;
    let kept: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.to_lowercase().starts_with("#policy") || (!line.is_empty() && !line.starts_with('#'))
        })
        .collect();
    let joined = kept.join("\n");
    if joined.is_empty() {
        return None;
    }
    if joined.chars().count() > POLICY_MAX_CHARS {
        warn!(
            "{} exceeds {} character limit, truncated",
            path.as_ref().display(),
            POLICY_MAX_CHARS
        );
        return Some(joined.chars().take(POLICY_MAX_CHARS).collect());
    }
    Some(joined)
}

/// Load custom instructions from instructions.txt. Strips comment lines,
/// truncates to the provider limit.
pub async fn load_instructions_text<P: AsRef<Path>>(path: P) -> Option<String> {
    let content = fs::read_to_string(path.as_ref()).await.ok()?;
    let kept: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let joined = kept.join("\n");
    if joined.is_empty() {
        return None;
    }
    if joined.chars().count() > INSTRUCTIONS_MAX_CHARS {
        warn!(
            "{} exceeds {} character limit, truncated",
            path.as_ref().display(),
            INSTRUCTIONS_MAX_CHARS
        );
        return Some(joined.chars().take(INSTRUCTIONS_MAX_CHARS).collect());
    }
    Some(joined)
}

/// Combine file-level text with a scope's inline text, respecting the limit
pub fn combine_custom_text(
    file_text: Option<&str>,
    inline_text: Option<&str>,
    max_chars: usize,
) -> Option<String> {
    let combined = match (file_text, inline_text) {
        (Some(f), Some(i)) => format!("{}\n{}", f, i),
        (Some(f), None) => f.to_string(),
        (None, Some(i)) => i.to_string(),
        (None, None) => return None,
    };
    if combined.chars().count() > max_chars {
        Some(combined.chars().take(max_chars).collect())
    } else {
        Some(combined)
    }
}
