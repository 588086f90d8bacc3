//! Send request builder.

use serde::{Deserialize, Serialize};

use super::types::{Channel, Payload, SendMode, SourceIdentity, TargetId, TargetRef};

/// Recipient of a send and the contacts available for external channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// `0` for guests; such recipients never get an in-app record
    pub member_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Recipient {
    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    /// Contact address for an external channel, if one was supplied
    pub fn contact(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::InApp => None,
            Channel::Sms => non_blank(self.phone.as_deref()),
            Channel::Email => non_blank(self.email.as_deref()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A configured send, consumed by [`DispatchEngine::send`](super::DispatchEngine::send).
///
/// # Example
///
/// ```rust,ignore
/// let request = SendRequest::new(SourceIdentity::new("module", "board"), 0)
///     .recipient(42, Some("Kim"), None, Some("010-1234-5678"))
///     .target("post", 17)
///     .mode(SendMode::Merge)
///     .content("comment", Payload::text("New comment on your post"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    source: SourceIdentity,
    sent_by: i64,
    recipient: Option<Recipient>,
    target: Option<TargetRef>,
    mode: SendMode,
    kind: String,
    content: Option<Payload>,
    delivery_type: Option<String>,
}

/// Borrowed view of a request that passed validation
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValidatedRequest<'a> {
    pub recipient: &'a Recipient,
    pub target: &'a TargetRef,
    pub kind: &'a str,
    pub content: &'a Payload,
}

impl SendRequest {
    /// Start a request raised by `source`. `sent_by` is `0` for system sends.
    pub fn new(source: SourceIdentity, sent_by: i64) -> Self {
        Self {
            source,
            sent_by,
            recipient: None,
            target: None,
            mode: SendMode::default(),
            kind: String::new(),
            content: None,
            delivery_type: None,
        }
    }

    pub fn recipient(
        mut self,
        member_id: i64,
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Self {
        self.recipient = Some(Recipient {
            member_id,
            name: name.map(String::from),
            email: email.map(String::from),
            phone: phone.map(String::from),
        });
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn target(
        mut self,
        target_type: impl Into<String>,
        target_id: impl Into<TargetId>,
    ) -> Self {
        self.target = Some(TargetRef::new(target_type, target_id));
        self
    }

    pub fn mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the mode by name. Unknown names leave the current mode in place.
    pub fn mode_named(mut self, name: &str) -> Self {
        match name.parse::<SendMode>() {
            Ok(mode) => self.mode = mode,
            Err(e) => {
                tracing::debug!(error = %e, mode = %self.mode, "Ignoring unknown send mode");
            }
        }
        self
    }

    pub fn content(mut self, kind: impl Into<String>, content: Payload) -> Self {
        self.kind = kind.into();
        self.content = Some(content);
        self
    }

    pub fn delivery_type(mut self, tag: impl Into<String>) -> Self {
        self.delivery_type = Some(tag.into());
        self
    }

    pub fn source(&self) -> &SourceIdentity {
        &self.source
    }

    pub fn sent_by(&self) -> i64 {
        self.sent_by
    }

    pub fn get_recipient(&self) -> Option<&Recipient> {
        self.recipient.as_ref()
    }

    pub fn get_target(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    pub fn get_mode(&self) -> SendMode {
        self.mode
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get_delivery_type(&self) -> Option<&str> {
        self.delivery_type.as_deref()
    }

    /// Check that recipient, source, target and kind are all set.
    pub(crate) fn validate(&self) -> Result<ValidatedRequest<'_>, String> {
        let recipient = self
            .recipient
            .as_ref()
            .ok_or_else(|| "recipient is not set".to_string())?;
        if recipient.member_id < 0 {
            return Err(format!("invalid recipient id {}", recipient.member_id));
        }
        if !self.source.is_complete() {
            return Err("source identity is incomplete".to_string());
        }
        let target = self
            .target
            .as_ref()
            .filter(|t| t.is_complete())
            .ok_or_else(|| "target is not set".to_string())?;
        if self.kind.trim().is_empty() {
            return Err("kind is not set".to_string());
        }
        let content = self
            .content
            .as_ref()
            .ok_or_else(|| "content is not set".to_string())?;

        Ok(ValidatedRequest {
            recipient,
            target,
            kind: &self.kind,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> SourceIdentity {
        SourceIdentity::new("module", "board")
    }

    fn complete() -> SendRequest {
        SendRequest::new(board(), 0)
            .recipient(5, Some("Lee"), None, Some("010-0000-0000"))
            .target("post", 3)
            .content("reply", Payload::text("hello"))
    }

    #[test]
    fn test_default_mode_is_merge() {
        assert_eq!(SendRequest::new(board(), 0).get_mode(), SendMode::Merge);
    }

    #[test]
    fn test_mode_named_keeps_prior_on_unknown() {
        let request = SendRequest::new(board(), 0)
            .mode_named("replace")
            .mode_named("overwrite");
        assert_eq!(request.get_mode(), SendMode::Replace);

        let request = request.mode_named("NEW");
        assert_eq!(request.get_mode(), SendMode::New);
    }

    #[test]
    fn test_complete_request_validates() {
        let request = complete();
        let validated = request.validate().unwrap();
        assert_eq!(validated.recipient.member_id, 5);
        assert_eq!(validated.kind, "reply");
        assert_eq!(validated.target.target_type, "post");
    }

    #[test]
    fn test_missing_parts_fail_validation() {
        let no_recipient = SendRequest::new(board(), 0)
            .target("post", 3)
            .content("reply", Payload::text("x"));
        assert!(no_recipient.validate().is_err());

        let no_target = SendRequest::new(board(), 0)
            .recipient(1, None, None, None)
            .content("reply", Payload::text("x"));
        assert!(no_target.validate().is_err());

        let no_kind = SendRequest::new(board(), 0)
            .recipient(1, None, None, None)
            .target("post", 3)
            .content("", Payload::text("x"));
        assert!(no_kind.validate().is_err());

        let no_source = SendRequest::new(SourceIdentity::new("module", ""), 0)
            .recipient(1, None, None, None)
            .target("post", 3)
            .content("reply", Payload::text("x"));
        assert!(no_source.validate().is_err());

        let empty_target_id = SendRequest::new(board(), 0)
            .recipient(1, None, None, None)
            .target("post", "")
            .content("reply", Payload::text("x"));
        assert!(empty_target_id.validate().is_err());
    }

    #[test]
    fn test_guest_recipient_is_valid() {
        let request = SendRequest::new(board(), 0)
            .recipient(0, None, Some("guest@example.com"), None)
            .target("post", 3)
            .content("reply", Payload::text("x"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_recipient_contacts_ignore_blank_values() {
        let recipient = Recipient {
            member_id: 1,
            name: Some("  ".to_string()),
            email: Some("".to_string()),
            phone: Some("010-1111-2222".to_string()),
        };
        assert_eq!(recipient.name(), None);
        assert_eq!(recipient.contact(Channel::Email), None);
        assert_eq!(recipient.contact(Channel::Sms), Some("010-1111-2222"));
        assert_eq!(recipient.contact(Channel::InApp), None);
    }
}
