//! Channel resolution for a (recipient, source, kind) triple.

use std::sync::Arc;

use crate::store::{PreferenceStore, StoreError};

use super::protocol::ProtocolRegistry;
use super::types::{Channel, SourceIdentity};

/// Decides which channels a recipient receives a notification kind on.
///
/// An explicit preference row wins outright, even when it enables nothing.
/// Without one the source's protocol supplies the default.
pub struct ChannelPolicy {
    preferences: Arc<dyn PreferenceStore>,
    registry: Arc<ProtocolRegistry>,
}

impl ChannelPolicy {
    pub fn new(preferences: Arc<dyn PreferenceStore>, registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            preferences,
            registry,
        }
    }

    pub async fn resolve(
        &self,
        recipient_id: i64,
        source: &SourceIdentity,
        kind: &str,
    ) -> Result<Vec<Channel>, StoreError> {
        // Guests have no preference rows
        if recipient_id != 0 {
            if let Some(preference) = self.preferences.get(recipient_id, source, kind).await? {
                return Ok(preference.channels());
            }
        }

        let mut channels = self
            .registry
            .for_source(source)
            .default_channels(recipient_id, kind);
        dedup_in_order(&mut channels);
        Ok(channels)
    }
}

/// Drop repeated channels, keeping the first occurrence of each.
fn dedup_in_order(channels: &mut Vec<Channel>) {
    let mut seen = Vec::with_capacity(channels.len());
    channels.retain(|channel| {
        if seen.contains(channel) {
            false
        } else {
            seen.push(*channel);
            true
        }
    });
}
