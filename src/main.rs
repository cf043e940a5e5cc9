use anyhow::Context;
use flakers::{config, demo, Session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variables `FLAKERS_<KEY>` override the placeholder connection parameters.
const ENV_PREFIX: &str = "FLAKERS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the table
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut configs = demo::placeholder_config();
    configs.extend(
        config::env_overrides(ENV_PREFIX).context("failed to read configuration overrides")?,
    );

    let mut stdout = std::io::stdout();
    demo::run(Session::builder().configs(configs), &mut stdout)
        .await
        .context("demo failed")?;
    Ok(())
}
