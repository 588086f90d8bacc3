//! In-app message persistence and channel preferences.
//!
//! # Architecture
//!
//! Storage uses a backend abstraction so the dispatcher is independent of
//! where records live:
//!
//! - `MemoryMessageStore` / `MemoryPreferenceStore`: DashMap-backed (default)
//! - `PostgresMessageStore` / `PostgresPreferenceStore`: PostgreSQL tables
//!
//! Use `create_message_store()` and `create_preference_store()` to build the
//! backends selected by configuration.

pub mod backend;
mod factory;
pub mod locks;
pub mod memory_backend;
pub mod postgres_backend;
pub mod preferences;

pub use backend::{
    MessageStore, MessageStoreStats, MessageWrite, StoreError, UpsertOutcome, UpsertResult,
};
pub use factory::{create_message_store, create_preference_store};
pub use locks::KeyLocks;
pub use memory_backend::MemoryMessageStore;
pub use postgres_backend::PostgresMessageStore;
pub use preferences::{
    ChannelPreference, MemoryPreferenceStore, PostgresPreferenceStore, PreferenceStore,
};
