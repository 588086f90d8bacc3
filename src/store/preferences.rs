//! Per-recipient channel preferences.
//!
//! A preference row, when present, fully decides the channels of a
//! (recipient, source, kind) triple. The dispatcher only reads rows; writes
//! come from the recipient through the HTTP API.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::notification::{Channel, SourceIdentity};

use super::backend::StoreError;

/// Explicit channel choice of a recipient for one notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub web: bool,
    pub sms: bool,
    pub email: bool,
}

impl ChannelPreference {
    pub fn new(web: bool, sms: bool, email: bool) -> Self {
        Self { web, sms, email }
    }

    /// Enabled channels in WEB, SMS, EMAIL order
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(3);
        if self.web {
            channels.push(Channel::InApp);
        }
        if self.sms {
            channels.push(Channel::Sms);
        }
        if self.email {
            channels.push(Channel::Email);
        }
        channels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PreferenceKey {
    recipient_id: i64,
    source: SourceIdentity,
    kind: String,
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<Option<ChannelPreference>, StoreError>;

    async fn put(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
        preference: ChannelPreference,
    ) -> Result<(), StoreError>;

    /// Remove a row, restoring the source's default. Returns whether a row
    /// existed.
    async fn delete(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<bool, StoreError>;
}

/// In-memory preference store
#[derive(Default)]
pub struct MemoryPreferenceStore {
    rows: DashMap<PreferenceKey, ChannelPreference>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(recipient_id: i64, source: &SourceIdentity, kind: &str) -> PreferenceKey {
        PreferenceKey {
            recipient_id,
            source: source.clone(),
            kind: kind.to_string(),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<Option<ChannelPreference>, StoreError> {
        Ok(self
            .rows
            .get(&Self::key(recipient_id, source, kind))
            .map(|row| *row))
    }

    async fn put(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
        preference: ChannelPreference,
    ) -> Result<(), StoreError> {
        self.rows
            .insert(Self::key(recipient_id, source, kind), preference);
        Ok(())
    }

    async fn delete(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .remove(&Self::key(recipient_id, source, kind))
            .is_some())
    }
}

/// PostgreSQL preference store over the `push_settings` table
pub struct PostgresPreferenceStore {
    pool: PgPool,
}

impl PostgresPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PostgresPreferenceStore {
    async fn get(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<Option<ChannelPreference>, StoreError> {
        let row: Option<(bool, bool, bool)> = sqlx::query_as(
            r#"
            SELECT web, sms, email
            FROM push_settings
            WHERE member_id = $1 AND component_type = $2 AND component_name = $3 AND code = $4
            "#,
        )
        .bind(recipient_id)
        .bind(&source.component_type)
        .bind(&source.component_name)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(web, sms, email)| ChannelPreference::new(web, sms, email)))
    }

    async fn put(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
        preference: ChannelPreference,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO push_settings (member_id, component_type, component_name, code, web, sms, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (member_id, component_type, component_name, code) DO UPDATE SET
                web = EXCLUDED.web,
                sms = EXCLUDED.sms,
                email = EXCLUDED.email
            "#,
        )
        .bind(recipient_id)
        .bind(&source.component_type)
        .bind(&source.component_name)
        .bind(kind)
        .bind(preference.web)
        .bind(preference.sms)
        .bind(preference.email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM push_settings
            WHERE member_id = $1 AND component_type = $2 AND component_name = $3 AND code = $4
            "#,
        )
        .bind(recipient_id)
        .bind(&source.component_type)
        .bind(&source.component_name)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
