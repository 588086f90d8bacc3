use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_SCHEMA_VERSION: u16 = 1;

/// Schema version assigned to stored values that predate the tagged format
pub const LEGACY_PAYLOAD_SCHEMA: u16 = 0;

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// In-app notification stored in the message inbox
    #[serde(rename = "WEB")]
    InApp,
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "EMAIL")]
    Email,
}

impl Channel {
    /// Canonical channel order used when normalising channel lists
    pub const ALL: [Channel; 3] = [Channel::InApp, Channel::Sms, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "WEB",
            Channel::Sms => "SMS",
            Channel::Email => "EMAIL",
        }
    }

    /// Keep only known channels, de-duplicated, in canonical order.
    pub fn normalize(channels: &[Channel]) -> Vec<Channel> {
        Self::ALL
            .iter()
            .copied()
            .filter(|c| channels.contains(c))
            .collect()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a new in-app send interacts with an existing record for the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SendMode {
    /// Always create an independent record
    New,
    /// Append to the open (unchecked) record, or create one
    #[default]
    Merge,
    /// Overwrite the existing record regardless of its checked state
    Replace,
}

impl SendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMode::New => "NEW",
            SendMode::Merge => "MERGE",
            SendMode::Replace => "REPLACE",
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown send mode: {0}")]
pub struct UnknownSendMode(pub String);

impl FromStr for SendMode {
    type Err = UnknownSendMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(SendMode::New),
            "MERGE" => Ok(SendMode::Merge),
            "REPLACE" => Ok(SendMode::Replace),
            _ => Err(UnknownSendMode(s.to_string())),
        }
    }
}

/// Identity of the component that raised a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    /// Component type (e.g. "module", "plugin")
    #[serde(rename = "type")]
    pub component_type: String,
    /// Component name (e.g. "board")
    #[serde(rename = "name")]
    pub component_name: String,
}

impl SourceIdentity {
    pub fn new(component_type: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_name: component_name.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.component_type.is_empty() && !self.component_name.is_empty()
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component_type, self.component_name)
    }
}

/// Identifier of the entity a notification concerns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Int(i64),
    Str(String),
}

impl TargetId {
    /// Textual form used for storage and key comparison
    pub fn as_key(&self) -> String {
        match self {
            TargetId::Int(id) => id.to_string(),
            TargetId::Str(id) => id.clone(),
        }
    }

    /// Rebuild from the stored text column; purely numeric text becomes `Int`.
    pub fn from_stored(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(id) if id.to_string() == value => TargetId::Int(id),
            _ => TargetId::Str(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TargetId::Str(s) if s.is_empty())
    }
}

impl PartialEq for TargetId {
    fn eq(&self, other: &Self) -> bool {
        self.as_key() == other.as_key()
    }
}

impl Eq for TargetId {}

impl std::hash::Hash for TargetId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_key().hash(state);
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<i64> for TargetId {
    fn from(id: i64) -> Self {
        TargetId::Int(id)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        TargetId::Str(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        TargetId::Str(id)
    }
}

/// Entity a notification concerns
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(rename = "id")]
    pub target_id: TargetId,
}

impl TargetRef {
    pub fn new(target_type: impl Into<String>, target_id: impl Into<TargetId>) -> Self {
        Self {
            target_type: target_type.into(),
            target_id: target_id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.target_type.is_empty() && !self.target_id.is_empty()
    }
}

/// Deduplication key for in-app notifications
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub recipient_id: i64,
    pub source: SourceIdentity,
    pub target: TargetRef,
    pub kind: String,
}

impl MessageKey {
    pub fn new(
        recipient_id: i64,
        source: SourceIdentity,
        target: TargetRef,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            source,
            target,
            kind: kind.into(),
        }
    }

    /// Whether every key component is present.
    ///
    /// Recipient `0` is a guest and never owns in-app records.
    pub fn is_complete(&self) -> bool {
        self.recipient_id > 0
            && self.source.is_complete()
            && self.target.is_complete()
            && !self.kind.is_empty()
    }

    /// Stable string form, used for lock tables and advisory lock hashing
    pub fn lock_key(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.recipient_id,
            self.source.component_type,
            self.source.component_name,
            self.target.target_type,
            self.target.target_id.as_key(),
            self.kind
        )
    }
}

/// Payload body variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PayloadBody {
    Text(String),
    Structured(serde_json::Value),
}

/// Schema-versioned notification content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub schema: u16,
    pub body: PayloadBody,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            schema: PAYLOAD_SCHEMA_VERSION,
            body: PayloadBody::Text(text.into()),
        }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            schema: PAYLOAD_SCHEMA_VERSION,
            body: PayloadBody::Structured(value),
        }
    }

    /// Decode a stored value, wrapping anything that is not a tagged payload
    /// as a legacy structured body so no content is dropped.
    pub fn from_stored(value: serde_json::Value) -> Self {
        match serde_json::from_value::<Payload>(value.clone()) {
            Ok(payload) => payload,
            Err(_) => Self {
                schema: LEGACY_PAYLOAD_SCHEMA,
                body: PayloadBody::Structured(value),
            },
        }
    }

    /// Decode a stored contents array.
    pub fn list_from_stored(value: serde_json::Value) -> Vec<Payload> {
        match value {
            serde_json::Value::Array(items) => items.into_iter().map(Self::from_stored).collect(),
            serde_json::Value::Null => Vec::new(),
            other => vec![Self::from_stored(other)],
        }
    }
}

/// Persisted in-app notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// `None` until the record has been persisted
    pub id: Option<Uuid>,
    pub recipient_id: i64,
    pub source: SourceIdentity,
    pub target: TargetRef,
    pub kind: String,
    pub contents: Vec<Payload>,
    /// `0` means system-originated
    pub sent_by: i64,
    /// Seconds since the Unix epoch
    pub sent_at: i64,
    pub is_checked: bool,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,
}

impl NotificationMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(
            self.recipient_id,
            self.source.clone(),
            self.target.clone(),
            self.kind.clone(),
        )
    }

    pub fn latest_content(&self) -> Option<&Payload> {
        self.contents.last()
    }
}

/// Immutable projection of a send request, shared by persistence and
/// transport sender construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message: NotificationMessage,
}

impl Envelope {
    pub(crate) fn new(message: NotificationMessage) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &NotificationMessage {
        &self.message
    }

    /// The single payload carried by this send
    pub fn content(&self) -> Option<&Payload> {
        self.message.latest_content()
    }
}
