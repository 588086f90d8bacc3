//! Recipient inbox endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::notification::NotificationMessage;
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    pub member_id: i64,
    pub messages: Vec<NotificationMessage>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UncheckedCountResponse {
    pub member_id: i64,
    pub unchecked: usize,
}

/// GET /api/v1/members/{member_id}/messages - Newest records first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let messages = state.store.list_for_recipient(member_id, limit).await?;

    Ok(Json(ListMessagesResponse {
        member_id,
        total: messages.len(),
        messages,
    }))
}

/// GET /api/v1/members/{member_id}/messages/unchecked-count
pub async fn unchecked_count(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> Result<Json<UncheckedCountResponse>> {
    let unchecked = state.store.count_unchecked(member_id).await?;
    Ok(Json(UncheckedCountResponse {
        member_id,
        unchecked,
    }))
}

/// POST /api/v1/messages/{message_id}/check
pub async fn check_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<NotificationMessage>> {
    if !state.store.mark_checked(message_id).await? {
        return Err(not_found(message_id));
    }
    fetch(&state, message_id).await
}

/// POST /api/v1/messages/{message_id}/read - Reading also checks the record
pub async fn read_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<NotificationMessage>> {
    if !state.store.mark_read(message_id).await? {
        return Err(not_found(message_id));
    }
    fetch(&state, message_id).await
}

async fn fetch(state: &AppState, message_id: Uuid) -> Result<Json<NotificationMessage>> {
    state
        .store
        .get(message_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(message_id))
}

fn not_found(message_id: Uuid) -> AppError {
    AppError::NotFound(format!("Message '{}' not found", message_id))
}
