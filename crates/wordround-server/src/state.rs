use std::sync::Arc;

use tokio::sync::broadcast;

use wordround_core::messages::RoomNotification;

use crate::config::EngineConfig;
use crate::flow::GameFlow;
use crate::persistence::PersistenceCoordinator;
use crate::registry::{SessionRegistry, SharedRegistry};
use crate::store::GameStore;

/// Capacity of the outbound notification channel. A transport that lags
/// this far behind starts losing messages.
const NOTIFY_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub store: Arc<dyn GameStore>,
    pub persistence: Arc<PersistenceCoordinator>,
    pub flow: Arc<GameFlow>,
    pub config: Arc<EngineConfig>,
    notify_tx: broadcast::Sender<RoomNotification>,
}

impl AppState {
    pub fn new(config: EngineConfig, store: Arc<dyn GameStore>) -> Self {
        let config = Arc::new(config);
        let registry = SessionRegistry::shared();
        let persistence = Arc::new(PersistenceCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            &config.persistence,
        ));
        let (notify_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        let flow = Arc::new(GameFlow::new(
            Arc::clone(&registry),
            Arc::clone(&persistence),
            notify_tx.clone(),
            Arc::clone(&config),
        ));
        Self {
            registry,
            store,
            persistence,
            flow,
            config,
            notify_tx,
        }
    }

    /// Subscribe to the outbound notification stream. Each subscriber sees
    /// every room's notifications and filters by `room` itself.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomNotification> {
        self.notify_tx.subscribe()
    }

    /// Stop every background task: auto-snapshots and pending round timers.
    pub async fn shutdown(&self) {
        self.persistence.shutdown();
        self.registry.write().await.shutdown();
        tracing::info!("engine shut down");
    }
}
