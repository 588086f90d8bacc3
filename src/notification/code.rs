//! Notification kinds advertised by a source protocol.

use serde::Serialize;

use super::types::Channel;

/// A notification kind a source component can raise, with the channels a
/// recipient may opt into for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationCode {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    channels: Vec<Channel>,
}

impl NotificationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: None,
            channels: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the selectable channels; duplicates are dropped and the order is
    /// always WEB, SMS, EMAIL.
    pub fn channels(mut self, channels: &[Channel]) -> Self {
        self.channels = Channel::normalize(channels);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn get_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn get_channels(&self) -> &[Channel] {
        &self.channels
    }
}
