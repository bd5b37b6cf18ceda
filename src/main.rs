use oidc_rp::prelude::*;
use oidc_rp::server;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let directory = Arc::new(InMemoryDirectory::new());
    if let Err(e) = server::serve(config, directory).await {
        tracing::error!("Server exited with error: {}", e);
        std::process::exit(1);
    }
}
