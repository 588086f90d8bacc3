//! Backend trait for in-app message storage.
//!
//! Both backends share [`plan_write`], which encodes how a send interacts
//! with the record already stored for its logical key. Backends only differ
//! in how they look that record up and how they serialise concurrent writers
//! on the same key.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{MessageKey, NotificationMessage, Payload, SendMode};

/// Errors that can occur during message store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The logical key is missing a component
    #[error("Incomplete message key: {0}")]
    IncompleteKey(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Fields written alongside the content of a send
#[derive(Debug, Clone)]
pub struct MessageWrite {
    pub content: Payload,
    pub sent_by: i64,
    pub sent_at: i64,
    pub delivery_type: Option<String>,
}

/// How an upsert changed the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// A new record was created
    Inserted,
    /// Content was appended to the open record
    Merged,
    /// The existing record's content was overwritten
    Replaced,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Merged => "merged",
            UpsertOutcome::Replaced => "replaced",
        }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertResult {
    pub message_id: Uuid,
    pub outcome: UpsertOutcome,
}

/// Record to write, derived from the existing state for the key
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub message_id: Uuid,
    pub contents: Vec<Payload>,
    pub outcome: UpsertOutcome,
}

/// Whether the lookup for `mode` only considers unchecked records.
///
/// Returns `None` for NEW, which never looks anything up.
pub fn lookup_unchecked_only(mode: SendMode) -> Option<bool> {
    match mode {
        SendMode::New => None,
        SendMode::Merge => Some(true),
        SendMode::Replace => Some(false),
    }
}

/// Decide the record to write given the record found by the mode's lookup.
///
/// `existing` must come from the lookup described by
/// [`lookup_unchecked_only`]: for MERGE it is the open record (checked
/// records are never reopened), for REPLACE any record with the key.
pub fn plan_write(
    mode: SendMode,
    existing: Option<&NotificationMessage>,
    content: Payload,
) -> WritePlan {
    let existing = match mode {
        SendMode::New => None,
        SendMode::Merge => existing.filter(|m| !m.is_checked),
        SendMode::Replace => existing,
    };

    match (mode, existing.and_then(|m| m.id.map(|id| (id, m)))) {
        (SendMode::Merge, Some((id, message))) => {
            let mut contents = message.contents.clone();
            contents.push(content);
            WritePlan {
                message_id: id,
                contents,
                outcome: UpsertOutcome::Merged,
            }
        }
        (SendMode::Replace, Some((id, _))) => WritePlan {
            message_id: id,
            contents: vec![content],
            outcome: UpsertOutcome::Replaced,
        },
        _ => WritePlan {
            message_id: Uuid::new_v4(),
            contents: vec![content],
            outcome: UpsertOutcome::Inserted,
        },
    }
}

/// Build the record written for a plan.
///
/// Both flags are reset on every write.
pub fn planned_message(
    key: &MessageKey,
    plan: &WritePlan,
    write: &MessageWrite,
) -> NotificationMessage {
    NotificationMessage {
        id: Some(plan.message_id),
        recipient_id: key.recipient_id,
        source: key.source.clone(),
        target: key.target.clone(),
        kind: key.kind.clone(),
        contents: plan.contents.clone(),
        sent_by: write.sent_by,
        sent_at: write.sent_at,
        is_checked: false,
        is_read: false,
        delivery_type: write.delivery_type.clone(),
    }
}

/// Reject keys that are missing a component before touching storage.
pub fn ensure_complete(key: &MessageKey) -> Result<(), StoreError> {
    if key.recipient_id <= 0 {
        return Err(StoreError::IncompleteKey("recipient".to_string()));
    }
    if !key.source.is_complete() {
        return Err(StoreError::IncompleteKey("source identity".to_string()));
    }
    if !key.target.is_complete() {
        return Err(StoreError::IncompleteKey("target".to_string()));
    }
    if key.kind.is_empty() {
        return Err(StoreError::IncompleteKey("kind".to_string()));
    }
    Ok(())
}

/// Statistics about the message store.
#[derive(Debug, Clone, Serialize)]
pub struct MessageStoreStats {
    /// Backend type identifier
    pub backend_type: String,

    /// Total stored records
    pub total_messages: usize,

    /// Records not yet checked by their recipient
    pub unchecked_messages: usize,

    /// Number of recipients with at least one record
    pub recipients: usize,
}

/// Backend trait for in-app message storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and must serialise the
/// lookup-then-write sequence of [`MessageStore::upsert`] per logical key so
/// that concurrent MERGE sends neither duplicate the open record nor lose
/// appended content.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Store content for `key` according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IncompleteKey` before any read or write when the
    /// key is missing a component.
    async fn upsert(
        &self,
        key: &MessageKey,
        mode: SendMode,
        write: MessageWrite,
    ) -> Result<UpsertResult, StoreError>;

    /// Fetch a record by id.
    async fn get(&self, message_id: Uuid) -> Result<Option<NotificationMessage>, StoreError>;

    /// Records of a recipient, newest first.
    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationMessage>, StoreError>;

    /// Number of unchecked records of a recipient.
    async fn count_unchecked(&self, recipient_id: i64) -> Result<usize, StoreError>;

    /// Mark a record as checked. Returns whether the record exists.
    async fn mark_checked(&self, message_id: Uuid) -> Result<bool, StoreError>;

    /// Mark a record as read (reading implies checking). Returns whether the
    /// record exists.
    async fn mark_read(&self, message_id: Uuid) -> Result<bool, StoreError>;

    /// Store statistics
    async fn stats(&self) -> MessageStoreStats;
}
