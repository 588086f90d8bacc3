use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::codes::list_codes;
use super::health::{health, stats};
use super::messages::{check_message, list_messages, read_message, unchecked_count};
use super::notifications::send_notification;
use super::preferences::{delete_preference, get_preference, put_preference};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .nest(
            "/api/v1",
            Router::new()
                // Dispatch
                .route("/notifications/send", post(send_notification))
                // Inbox
                .route("/members/{member_id}/messages", get(list_messages))
                .route(
                    "/members/{member_id}/messages/unchecked-count",
                    get(unchecked_count),
                )
                .route("/messages/{message_id}/check", post(check_message))
                .route("/messages/{message_id}/read", post(read_message))
                // Preferences
                .route(
                    "/members/{member_id}/preferences/{component_type}/{component_name}/{code}",
                    get(get_preference)
                        .put(put_preference)
                        .delete(delete_preference),
                )
                // Code catalog
                .route(
                    "/sources/{component_type}/{component_name}/codes",
                    get(list_codes),
                )
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
