//! Notification send endpoint.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::notification::{Channel, Payload, Recipient, SendRequest, SourceIdentity, TargetRef};
use crate::server::AppState;

/// Request to dispatch a notification
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Raising component, `{"type": ..., "name": ...}`
    pub source: SourceIdentity,
    /// Sending member, `0` for system sends
    #[serde(default)]
    pub sent_by: i64,
    pub recipient: Recipient,
    /// Entity the notification concerns, `{"type": ..., "id": ...}`
    pub target: TargetRef,
    /// Notification kind
    pub kind: String,
    /// A string is stored as text, anything else as structured content
    pub content: serde_json::Value,
    /// NEW, MERGE or REPLACE; unknown names fall back to MERGE
    pub mode: Option<String>,
    pub delivery_type: Option<String>,
    /// Overrides the server clock (seconds)
    pub sent_at: Option<i64>,
}

impl SendNotificationRequest {
    fn into_send_request(self) -> (SendRequest, Option<i64>) {
        let payload = match self.content {
            serde_json::Value::String(text) => Payload::text(text),
            other => Payload::structured(other),
        };

        let mut request = SendRequest::new(self.source, self.sent_by)
            .with_recipient(self.recipient)
            .target(self.target.target_type, self.target.target_id)
            .content(self.kind, payload);

        if let Some(mode) = self.mode {
            request = request.mode_named(&mode);
        }

        if let Some(tag) = self.delivery_type {
            request = request.delivery_type(tag);
        }

        (request, self.sent_at)
    }
}

/// Response for notification send operations
#[derive(Debug, Serialize, Deserialize)]
pub struct SendNotificationResponse {
    pub success: bool,
    /// In-app record written, if any
    pub message_id: Option<Uuid>,
    pub channels: Vec<Channel>,
    pub sms_attempted: bool,
    pub email_attempted: bool,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/v1/notifications/send
#[tracing::instrument(
    name = "api.send_notification",
    skip(state, request),
    fields(source = %request.source, kind = %request.kind)
)]
pub async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>> {
    let (request, sent_at) = request.into_send_request();
    let result = state.engine.send(&request, sent_at).await?;

    Ok(Json(SendNotificationResponse {
        success: result.success,
        message_id: result.message_id,
        channels: result.channels,
        sms_attempted: result.sms_attempted,
        email_attempted: result.email_attempted,
        timestamp: Utc::now(),
    }))
}
