// src/main.rs - Moderation relay wiring

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use novamod::bot::pipeline::CustomText;
use novamod::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting novamod v{} - AI content moderation relay", novamod::VERSION);

    // =================================================================
    // CONFIGURATION
    // =================================================================

    let config_dir = Path::new("config");
    let config = Arc::new(ConfigurationManager::new(config_dir.join("moderation.yaml")));
    config
        .initialize()
        .await
        .context("failed to initialize moderation config")?;
    config
        .start_watching()
        .await
        .context("failed to watch moderation config")?;

    let custom_text = CustomText {
        policy: novamod::config::load_policy_text(config_dir.join("policy.txt")).await,
        instructions: novamod::config::load_instructions_text(config_dir.join("instructions.txt"))
            .await,
    };
    info!(
        "Custom text: policy {}, instructions {}",
        if custom_text.policy.is_some() { "loaded" } else { "absent" },
        if custom_text.instructions.is_some() { "loaded" } else { "absent" },
    );

    // =================================================================
    // CLASSIFIER AND PLATFORM
    // =================================================================

    let settings = config.settings().await;
    let api_key = std::env::var("NOVA_API_KEY")
        .context("NOVA_API_KEY environment variable not set")?;
    let classifier = Arc::new(NovaClassifier::new(
        settings.api_provider,
        api_key,
        Duration::from_secs(settings.classify_timeout_seconds),
    ));
    info!("Classifier provider: {}", settings.api_provider.name());

    let platform = Arc::new(DiscordModerator::new(DiscordConfig::from_env()?));

    // =================================================================
    // MODERATION ENGINE
    // =================================================================

    let bot = Arc::new(ModerationBot::new(config, classifier, platform, custom_text).await);
    let (event_sender, intake) = bot.start(256);

    // Outcome log stream for operators
    let mut outcomes = bot.subscribe_outcomes();
    tokio::spawn(async move {
        while let Ok(outcome) = outcomes.recv().await {
            info!(
                "Outcome {}: {:?} action={:?} reason={}",
                outcome.event_id,
                outcome.result,
                outcome.action,
                outcome.reason.as_deref().unwrap_or("-")
            );
        }
    });

    // Unusable credential is fatal for every subsequent event
    let mut fatal = bot.subscribe_fatal();
    let fatal_watch = tokio::spawn(async move {
        if let Ok(event) = fatal.recv().await {
            error!("Fatal moderation failure: {:?}", event);
        }
    });

    // The platform event source (gateway consumer) feeds `event_sender`.
    // It is kept alive here until shutdown so the intake keeps draining.
    info!("Moderation relay ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = fatal_watch => {
            warn!("Stopping intake after fatal failure");
        }
    }

    // Drop the intake sender and drain in-flight runs; a run is never
    // cancelled mid-action
    drop(event_sender);
    intake.await.context("intake task failed")?;
    info!("Moderation relay stopped");

    Ok(())
}
