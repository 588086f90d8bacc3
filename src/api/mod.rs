//! API layer - HTTP endpoint handlers organized by domain.

mod codes;
mod health;
mod messages;
mod metrics;
mod notifications;
mod preferences;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use codes::list_codes;
pub use health::{health, stats};
pub use messages::{check_message, list_messages, read_message, unchecked_count};
pub use metrics::prometheus_metrics;
pub use notifications::{send_notification, SendNotificationRequest, SendNotificationResponse};
pub use preferences::{delete_preference, get_preference, put_preference};
pub use routes::api_routes;
