use std::sync::Arc;

use db::{PersistenceStore, SqliteStore};
use events::EventBus;
use orchestrator::{ConnectorRegistry, EngineConfig, RunEngine};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceStore>,
    pub engine: RunEngine,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, registry: ConnectorRegistry, config: EngineConfig) -> Self {
        let store: Arc<dyn PersistenceStore> = Arc::new(SqliteStore::new(pool));
        let engine = RunEngine::new(store.clone(), EventBus::new(), registry, config);
        Self::from_engine(engine)
    }

    pub fn from_engine(engine: RunEngine) -> Self {
        Self {
            store: engine.store().clone(),
            event_bus: engine.event_bus().clone(),
            engine,
        }
    }
}
