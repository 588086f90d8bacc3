// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;

// Domain layer
pub mod notification;
pub mod store;

// Application layer
pub mod api;
pub mod server;
