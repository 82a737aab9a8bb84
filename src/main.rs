use anyhow::{Context, Result};
use gatekeeper::config::Config;
use gatekeeper::config_validator::ConfigValidator;
use gatekeeper::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env();
    ConfigValidator::validate(&config).context("Invalid settings")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gatekeeper={},tower_http=debug", config.log_level.to_lowercase()).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting gatekeeper service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        store = ?config.store,
        redis_url = %config.redis_url,
        "Configuration loaded"
    );

    let rate_limits = config
        .load_rate_limits()
        .context("Failed to load rate limit configuration")?;

    let server = Server::new(&config, rate_limits)
        .await
        .context("Failed to create server")?;

    server.run().await.context("Server error")?;

    Ok(())
}
