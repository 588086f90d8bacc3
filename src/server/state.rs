use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::notification::{DispatchEngine, ProtocolRegistry, StaticCapabilities};
use crate::postgres::PostgresPool;
use crate::store::{create_message_store, create_preference_store, MessageStore, PreferenceStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<DispatchEngine>,
    pub store: Arc<dyn MessageStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub registry: Arc<ProtocolRegistry>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    /// State backed by the stores selected in `settings`, using the shared
    /// default protocol for every source.
    pub fn new(settings: Settings) -> Self {
        Self::with_backends(settings, None, Arc::new(ProtocolRegistry::default()))
    }

    /// State with an optional PostgreSQL pool and a caller-populated
    /// protocol registry.
    pub fn with_backends(
        settings: Settings,
        postgres_pool: Option<Arc<PostgresPool>>,
        registry: Arc<ProtocolRegistry>,
    ) -> Self {
        let store = create_message_store(&settings.store, postgres_pool.clone());
        let preferences = create_preference_store(&settings.store, postgres_pool.clone());
        let capabilities = StaticCapabilities::from(&settings.transport);

        let engine = DispatchEngine::new(store.clone(), preferences.clone(), registry.clone())
            .with_capabilities(Arc::new(capabilities));

        Self {
            settings: Arc::new(settings),
            engine: Arc::new(engine),
            store,
            preferences,
            registry,
            postgres_pool,
            start_time: Instant::now(),
        }
    }
}
