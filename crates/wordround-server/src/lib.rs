pub mod config;
pub mod error;
pub mod flow;
pub mod persistence;
pub mod recovery;
pub mod registry;
pub mod state;
pub mod store;

use std::sync::Arc;

use config::EngineConfig;
use error::PersistenceError;
use recovery::{RecoveryCoordinator, RecoveryReport};
use state::AppState;
use store::GameStore;

/// Build the engine state and run the startup recovery pass against the
/// given store. Traffic must not be admitted before this returns: the
/// registry is empty until recovery has reconciled it with durable storage.
pub async fn build_engine(
    config: EngineConfig,
    store: Arc<dyn GameStore>,
) -> Result<(AppState, RecoveryReport), PersistenceError> {
    let state = AppState::new(config, Arc::clone(&store));
    let recovery = RecoveryCoordinator::new(
        store,
        Arc::clone(&state.registry),
        Arc::clone(&state.persistence),
        Arc::clone(&state.config),
    );
    let report = recovery.run().await?;
    Ok((state, report))
}
