//! In-memory message store using DashMap.
//!
//! Records are lost on restart. Concurrent upserts on the same logical key
//! are serialised with a per-key async mutex held across lookup and write.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::metrics::StoreMetrics;
use crate::notification::{MessageKey, NotificationMessage, SendMode};

use super::backend::{
    ensure_complete, lookup_unchecked_only, plan_write, planned_message, MessageStore,
    MessageStoreStats, MessageWrite, StoreError, UpsertResult,
};
use super::locks::KeyLocks;

/// Stored record with its insertion sequence, used to break `sent_at` ties
#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    message: NotificationMessage,
}

/// In-memory message store.
#[derive(Default)]
pub struct MemoryMessageStore {
    rows: DashMap<Uuid, Row>,
    locks: KeyLocks,
    seq: AtomicU64,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent record with `key`, optionally only unchecked ones.
    fn find_latest(&self, key: &MessageKey, unchecked_only: bool) -> Option<NotificationMessage> {
        self.rows
            .iter()
            .filter(|row| row.message.key() == *key)
            .filter(|row| !unchecked_only || !row.message.is_checked)
            .max_by_key(|row| (row.message.sent_at, row.seq))
            .map(|row| row.message.clone())
    }

    /// Flip the flags under the record's key lock so an in-flight MERGE
    /// cannot write the record back as unchecked.
    async fn update_flags(&self, message_id: Uuid, read: bool) -> bool {
        let key = match self.rows.get(&message_id) {
            Some(row) => row.message.key(),
            None => return false,
        };
        let _guard = self.locks.acquire(&key.lock_key()).await;

        match self.rows.get_mut(&message_id) {
            Some(mut row) => {
                row.message.is_checked = true;
                if read {
                    row.message.is_read = true;
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        key: &MessageKey,
        mode: SendMode,
        write: MessageWrite,
    ) -> Result<UpsertResult, StoreError> {
        ensure_complete(key)?;

        let _guard = self.locks.acquire(&key.lock_key()).await;

        let existing =
            lookup_unchecked_only(mode).and_then(|unchecked| self.find_latest(key, unchecked));
        let plan = plan_write(mode, existing.as_ref(), write.content.clone());
        let message = planned_message(key, &plan, &write);

        let seq = match self.rows.get(&plan.message_id) {
            Some(row) => row.seq,
            None => self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.rows.insert(plan.message_id, Row { seq, message });

        StoreMetrics::record_write(mode, plan.outcome);

        tracing::debug!(
            message_id = %plan.message_id,
            recipient_id = key.recipient_id,
            source = %key.source,
            kind = %key.kind,
            mode = %mode,
            outcome = plan.outcome.as_str(),
            contents = plan.contents.len(),
            "Stored in-app notification"
        );

        Ok(UpsertResult {
            message_id: plan.message_id,
            outcome: plan.outcome,
        })
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<NotificationMessage>, StoreError> {
        Ok(self.rows.get(&message_id).map(|row| row.message.clone()))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationMessage>, StoreError> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| row.message.recipient_id == recipient_id)
            .map(|row| row.value().clone())
            .collect();

        rows.sort_by(|a, b| {
            (b.message.sent_at, b.seq).cmp(&(a.message.sent_at, a.seq))
        });

        Ok(rows.into_iter().take(limit).map(|row| row.message).collect())
    }

    async fn count_unchecked(&self, recipient_id: i64) -> Result<usize, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.message.recipient_id == recipient_id && !row.message.is_checked)
            .count())
    }

    async fn mark_checked(&self, message_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.update_flags(message_id, false).await)
    }

    async fn mark_read(&self, message_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.update_flags(message_id, true).await)
    }

    async fn stats(&self) -> MessageStoreStats {
        let mut unchecked = 0;
        let mut recipients = HashSet::new();

        for row in self.rows.iter() {
            if !row.message.is_checked {
                unchecked += 1;
            }
            recipients.insert(row.message.recipient_id);
        }

        MessageStoreStats {
            backend_type: "memory".to_string(),
            total_messages: self.rows.len(),
            unchecked_messages: unchecked,
            recipients: recipients.len(),
        }
    }
}
