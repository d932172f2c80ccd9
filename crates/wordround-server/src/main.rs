use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wordround_server::build_engine;
use wordround_server::config::EngineConfig;
use wordround_server::store::MemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Wordround engine starting");

    let config = EngineConfig::load();
    config.validate();

    let store = Arc::new(MemoryStore::new());
    let (state, report) = match build_engine(config, store).await {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "startup recovery failed");
            std::process::exit(1);
        },
    };
    tracing::info!(
        recovered = report.recovered,
        swept = report.swept,
        addr = %state.config.listen_addr,
        "engine ready for transport attachment"
    );

    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
    state.shutdown().await;
}
