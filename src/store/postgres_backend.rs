//! PostgreSQL-based message store.
//!
//! Records live in the `push_messages` table. Each upsert runs in a single
//! transaction that first takes a transaction-scoped advisory lock on the
//! logical key, so the lookup and the write of concurrent senders for the
//! same key never interleave. The lock is released on commit or rollback.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::metrics::StoreMetrics;
use crate::notification::{
    MessageKey, NotificationMessage, Payload, SendMode, SourceIdentity, TargetId, TargetRef,
};

use super::backend::{
    ensure_complete, lookup_unchecked_only, plan_write, planned_message, MessageStore,
    MessageStoreStats, MessageWrite, StoreError, UpsertResult,
};

const SELECT_COLUMNS: &str = r#"
    message_id, member_id, component_type, component_name, target_type, target_id,
    code, contents, sended_by, sended_at, is_checked, is_readed, type
"#;

/// Encode a flag the way the table stores it
pub(crate) fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

pub(crate) fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("TRUE")
}

fn message_from_row(row: &PgRow) -> Result<NotificationMessage, StoreError> {
    let target_id: String = row.try_get("target_id")?;
    let contents: serde_json::Value = row.try_get("contents")?;
    let is_checked: String = row.try_get("is_checked")?;
    let is_read: String = row.try_get("is_readed")?;

    Ok(NotificationMessage {
        id: Some(row.try_get("message_id")?),
        recipient_id: row.try_get("member_id")?,
        source: SourceIdentity::new(
            row.try_get::<String, _>("component_type")?,
            row.try_get::<String, _>("component_name")?,
        ),
        target: TargetRef::new(
            row.try_get::<String, _>("target_type")?,
            TargetId::from_stored(&target_id),
        ),
        kind: row.try_get("code")?,
        contents: Payload::list_from_stored(contents),
        sent_by: row.try_get("sended_by")?,
        sent_at: row.try_get("sended_at")?,
        is_checked: parse_flag(&is_checked),
        is_read: parse_flag(&is_read),
        delivery_type: row.try_get("type")?,
    })
}

/// PostgreSQL-based message store.
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Flip the flags while holding the record's key lock, the same lock
    /// `upsert` takes, so a concurrent MERGE cannot reopen the record.
    async fn update_flags(&self, message_id: Uuid, read: bool) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {SELECT_COLUMNS} FROM push_messages WHERE message_id = $1");
        let row = sqlx::query(&query)
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?;

        let message = match row.as_ref().map(message_from_row).transpose()? {
            Some(message) => message,
            None => return Ok(false),
        };

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(message.key().lock_key())
            .execute(&mut *tx)
            .await?;

        let query = if read {
            "UPDATE push_messages SET is_checked = 'TRUE', is_readed = 'TRUE' WHERE message_id = $1"
        } else {
            "UPDATE push_messages SET is_checked = 'TRUE' WHERE message_id = $1"
        };

        let result = sqlx::query(query)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn upsert(
        &self,
        key: &MessageKey,
        mode: SendMode,
        write: MessageWrite,
    ) -> Result<UpsertResult, StoreError> {
        ensure_complete(key)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.lock_key())
            .execute(&mut *tx)
            .await?;

        let existing = match lookup_unchecked_only(mode) {
            Some(unchecked_only) => {
                let query = format!(
                    r#"
                    SELECT {SELECT_COLUMNS}
                    FROM push_messages
                    WHERE member_id = $1
                      AND component_type = $2
                      AND component_name = $3
                      AND target_type = $4
                      AND target_id = $5
                      AND code = $6
                      AND ($7 = FALSE OR is_checked = 'FALSE')
                    ORDER BY sended_at DESC, created_at DESC
                    LIMIT 1
                    "#
                );

                let row = sqlx::query(&query)
                    .bind(key.recipient_id)
                    .bind(&key.source.component_type)
                    .bind(&key.source.component_name)
                    .bind(&key.target.target_type)
                    .bind(key.target.target_id.as_key())
                    .bind(&key.kind)
                    .bind(unchecked_only)
                    .fetch_optional(&mut *tx)
                    .await?;

                row.as_ref().map(message_from_row).transpose()?
            }
            None => None,
        };

        let plan = plan_write(mode, existing.as_ref(), write.content.clone());
        let message = planned_message(key, &plan, &write);
        let contents = serde_json::to_value(&message.contents)?;

        sqlx::query(
            r#"
            INSERT INTO push_messages (
                message_id, member_id, component_type, component_name, target_type, target_id,
                code, contents, sended_by, sended_at, is_checked, is_readed, type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (message_id) DO UPDATE SET
                contents = EXCLUDED.contents,
                sended_by = EXCLUDED.sended_by,
                sended_at = EXCLUDED.sended_at,
                is_checked = EXCLUDED.is_checked,
                is_readed = EXCLUDED.is_readed,
                type = EXCLUDED.type
            "#,
        )
        .bind(plan.message_id)
        .bind(message.recipient_id)
        .bind(&message.source.component_type)
        .bind(&message.source.component_name)
        .bind(&message.target.target_type)
        .bind(message.target.target_id.as_key())
        .bind(&message.kind)
        .bind(&contents)
        .bind(message.sent_by)
        .bind(message.sent_at)
        .bind(flag(message.is_checked))
        .bind(flag(message.is_read))
        .bind(&message.delivery_type)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        StoreMetrics::record_write(mode, plan.outcome);

        tracing::debug!(
            message_id = %plan.message_id,
            recipient_id = key.recipient_id,
            source = %key.source,
            kind = %key.kind,
            mode = %mode,
            outcome = plan.outcome.as_str(),
            contents = plan.contents.len(),
            "Stored in-app notification in PostgreSQL"
        );

        Ok(UpsertResult {
            message_id: plan.message_id,
            outcome: plan.outcome,
        })
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<NotificationMessage>, StoreError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM push_messages WHERE message_id = $1");

        let row = sqlx::query(&query)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_for_recipient(
        &self,
        recipient_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationMessage>, StoreError> {
        let query = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM push_messages
            WHERE member_id = $1
            ORDER BY sended_at DESC, created_at DESC
            LIMIT $2
            "#
        );

        let rows = sqlx::query(&query)
            .bind(recipient_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            match message_from_row(row) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        recipient_id = recipient_id,
                        error = %e,
                        "Failed to decode stored notification, skipping"
                    );
                }
            }
        }

        Ok(messages)
    }

    async fn count_unchecked(&self, recipient_id: i64) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM push_messages WHERE member_id = $1 AND is_checked = 'FALSE'",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }

    async fn mark_checked(&self, message_id: Uuid) -> Result<bool, StoreError> {
        self.update_flags(message_id, false).await
    }

    async fn mark_read(&self, message_id: Uuid) -> Result<bool, StoreError> {
        self.update_flags(message_id, true).await
    }

    async fn stats(&self) -> MessageStoreStats {
        let (total, unchecked, recipients): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE is_checked = 'FALSE'),
                COUNT(DISTINCT member_id)
            FROM push_messages
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to query message store stats");
            (0, 0, 0)
        });

        MessageStoreStats {
            backend_type: "postgres".to_string(),
            total_messages: total as usize,
            unchecked_messages: unchecked as usize,
            recipients: recipients as usize,
        }
    }
}
