use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logship::agent::Agent;
use logship::config;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logship=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "logship.conf".to_string());

    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let agent = match Agent::start(&config) {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(error = %e, "failed to start agent");
            std::process::exit(1);
        }
    };

    tracing::info!(
        groups = config.files.len(),
        servers = config.network.servers.len(),
        "agent started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }

    agent.shutdown().await;
}
