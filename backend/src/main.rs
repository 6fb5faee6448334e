// BrainCrate - note backend with spaced-repetition reviews
// Entry point: prepares storage and reports where it lives

use braincrate::app::AppState;
use braincrate::commands;
use braincrate::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "braincrate=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BrainCrate");

    let config = AppConfig::from_env()?;
    let state = AppState::initialize(config).await?;

    let info = commands::get_app_info(&state);
    tracing::info!("BrainCrate {} ready", info.version);
    println!("{}", serde_json::to_string_pretty(&info)?);

    state.repo.pool().close().await;

    Ok(())
}
