//! Per-source protocol overrides.
//!
//! A source component may register its own [`Protocol`] to change which
//! channels its notifications use by default and to build SMS/email senders
//! for them. Sources without a registration share the registry's default
//! protocol, which never builds a sender.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::code::NotificationCode;
use super::types::{Channel, Envelope, SourceIdentity};

/// Failure reported by an external transport sender
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport rejected message: {0}")]
    Rejected(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// A ready-to-send SMS or email message built by a protocol.
#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn send(&self) -> Result<(), TransportError>;
}

/// Source-specific notification behaviour.
///
/// Every method has a default matching the shared protocol, so an override
/// only implements what it changes.
pub trait Protocol: Send + Sync {
    /// Notification kinds this source raises.
    fn codes(&self) -> Vec<NotificationCode> {
        Vec::new()
    }

    /// Channels used when the recipient has no explicit preference.
    fn default_channels(&self, recipient_id: i64, _kind: &str) -> Vec<Channel> {
        if recipient_id == 0 {
            vec![Channel::Sms, Channel::Email]
        } else {
            vec![Channel::InApp]
        }
    }

    /// Build an SMS sender; `None` disables SMS for this message.
    fn sms_sender(
        &self,
        _envelope: &Envelope,
        _recipient_name: Option<&str>,
        _phone: &str,
    ) -> Option<Box<dyn TransportSender>> {
        None
    }

    /// Build an email sender; `None` disables email for this message.
    fn email_sender(
        &self,
        _envelope: &Envelope,
        _recipient_name: Option<&str>,
        _email: &str,
    ) -> Option<Box<dyn TransportSender>> {
        None
    }
}

/// Protocol used by sources that did not register their own
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProtocol;

impl Protocol for DefaultProtocol {}

/// Maps source identities to their protocol
pub struct ProtocolRegistry {
    protocols: DashMap<SourceIdentity, Arc<dyn Protocol>>,
    default: Arc<dyn Protocol>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new(Arc::new(DefaultProtocol))
    }
}

impl ProtocolRegistry {
    pub fn new(default: Arc<dyn Protocol>) -> Self {
        Self {
            protocols: DashMap::new(),
            default,
        }
    }

    /// Register (or replace) the protocol for a source.
    pub fn register(&self, source: SourceIdentity, protocol: Arc<dyn Protocol>) {
        tracing::info!(source = %source, "Registered notification protocol");
        self.protocols.insert(source, protocol);
    }

    pub fn unregister(&self, source: &SourceIdentity) -> bool {
        self.protocols.remove(source).is_some()
    }

    /// Builder-style registration
    pub fn with_protocol(self, source: SourceIdentity, protocol: Arc<dyn Protocol>) -> Self {
        self.register(source, protocol);
        self
    }

    pub fn for_source(&self, source: &SourceIdentity) -> Arc<dyn Protocol> {
        self.protocols
            .get(source)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn is_registered(&self, source: &SourceIdentity) -> bool {
        self.protocols.contains_key(source)
    }
}
