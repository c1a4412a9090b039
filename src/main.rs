use anyhow::Context;
use data_collector::config::{self, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv().context("failed to read .env")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let _log_guard = data_collector::logging::init(config.log_dir.as_deref());

    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Data collector starting");

    data_collector::run(config)
        .await
        .context("data collector stopped")?;
    Ok(())
}
