//! Store backend factory

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::postgres::PostgresPool;

use super::backend::MessageStore;
use super::memory_backend::MemoryMessageStore;
use super::postgres_backend::PostgresMessageStore;
use super::preferences::{MemoryPreferenceStore, PostgresPreferenceStore, PreferenceStore};

/// Create a message store based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend` setting:
/// - `"postgres"`: Returns a `PostgresMessageStore` if a PostgreSQL pool is provided
/// - `"memory"` (default): Returns a `MemoryMessageStore`
///
/// # Example
///
/// ```rust,ignore
/// let store = create_message_store(&settings.store, Some(pg_pool.clone()));
/// ```
pub fn create_message_store(
    settings: &StoreConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn MessageStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL message store");
                Arc::new(PostgresMessageStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL message store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryMessageStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory message store");
            Arc::new(MemoryMessageStore::new())
        }
    }
}

/// Create a preference store based on configuration.
///
/// Follows the same selection and fallback rules as [`create_message_store`].
pub fn create_preference_store(
    settings: &StoreConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn PreferenceStore> {
    match (settings.backend.as_str(), postgres_pool) {
        ("postgres", Some(pool)) => {
            tracing::info!(backend = "postgres", "Creating PostgreSQL preference store");
            Arc::new(PostgresPreferenceStore::new(pool.pool().clone()))
        }
        ("postgres", None) => {
            tracing::warn!(
                "PostgreSQL preference store requested but no pool provided, falling back to memory"
            );
            Arc::new(MemoryPreferenceStore::new())
        }
        _ => Arc::new(MemoryPreferenceStore::new()),
    }
}
