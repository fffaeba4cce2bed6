use anyhow::Result;
use buckley_core::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,buckley_core=debug".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(version = buckley_core::VERSION, "starting buckley-core");

    let _config = AppConfig::load()?;

    tokio::signal::ctrl_c().await?;
    Ok(())
}
