use anyhow::Result;
use api_gateway::{config, server, telemetry, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Env files must be loaded before telemetry reads RUST_LOG / LOG_FORMAT
    let env = config::load_env_files();
    let telemetry_config = config::TelemetryConfig::from_env();
    let prometheus = telemetry::init(&telemetry_config);

    let config = Config::from_env()?;

    info!(app_env = %env, "Starting API Gateway");

    server::run(config, prometheus).await
}
