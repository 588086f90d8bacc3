//! PostgreSQL persistence module.
//!
//! Provides connection pooling and schema bootstrap for the PostgreSQL stores.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
