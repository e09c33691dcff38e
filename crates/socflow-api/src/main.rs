//! Binary entrypoint for the socflow API server.
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socflow_api::{run, ApiConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // SOCFLOW_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("SOCFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "socflow_api=info,socflow_core=info,socflow_stages=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    let config = ApiConfig::from_env()?;
    run(config).await?;
    Ok(())
}
