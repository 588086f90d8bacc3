use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::{DispatchMetrics, TransportMetrics};
use crate::store::{MessageStore, MessageWrite, PreferenceStore, StoreError};

use super::capability::{Capabilities, Capability, Clock, StaticCapabilities, SystemClock};
use super::policy::ChannelPolicy;
use super::protocol::{ProtocolRegistry, TransportSender};
use super::request::{SendRequest, ValidatedRequest};
use super::types::{Channel, Envelope, NotificationMessage};

/// Errors returned by [`DispatchEngine::send`]
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request is missing recipient, source, target or kind
    #[error("Invalid send request: {0}")]
    Validation(String),

    /// Preference lookup or in-app write failed
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Result of a send that passed validation
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    /// In-app record written by this send
    pub message_id: Option<Uuid>,
    /// Channels resolved for the recipient, in attempt order
    pub channels: Vec<Channel>,
    pub sms_attempted: bool,
    pub email_attempted: bool,
}

/// Statistics for the dispatch engine
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Sends that passed validation
    pub total_sent: AtomicU64,
    pub validation_failures: AtomicU64,
    pub persistence_failures: AtomicU64,
    pub in_app_writes: AtomicU64,
    pub sms_attempts: AtomicU64,
    pub email_attempts: AtomicU64,
    /// Sender invocations that reported an error
    pub transport_failures: AtomicU64,
    pub envelopes_built: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            in_app_writes: self.in_app_writes.load(Ordering::Relaxed),
            sms_attempts: self.sms_attempts.load(Ordering::Relaxed),
            email_attempts: self.email_attempts.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            envelopes_built: self.envelopes_built.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_sent: u64,
    pub validation_failures: u64,
    pub persistence_failures: u64,
    pub in_app_writes: u64,
    pub sms_attempts: u64,
    pub email_attempts: u64,
    pub transport_failures: u64,
    pub envelopes_built: u64,
}

/// Resolves channels for a send and fans it out to the in-app store and
/// protocol-built transport senders.
pub struct DispatchEngine {
    store: Arc<dyn MessageStore>,
    policy: ChannelPolicy,
    registry: Arc<ProtocolRegistry>,
    capabilities: Arc<dyn Capabilities>,
    clock: Arc<dyn Clock>,
    stats: DispatcherStats,
}

impl DispatchEngine {
    /// Create an engine with no external transports installed and the
    /// system clock.
    pub fn new(
        store: Arc<dyn MessageStore>,
        preferences: Arc<dyn PreferenceStore>,
        registry: Arc<ProtocolRegistry>,
    ) -> Self {
        Self {
            store,
            policy: ChannelPolicy::new(preferences, registry.clone()),
            registry,
            capabilities: Arc::new(StaticCapabilities::none()),
            clock: Arc::new(SystemClock),
            stats: DispatcherStats::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn Capabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Validate `request`, resolve its channels and attempt each one.
    ///
    /// `sent_at` overrides the clock. Channels are independent: an in-app
    /// write failure is returned only after SMS and email were attempted.
    #[tracing::instrument(
        name = "dispatcher.send",
        skip(self, request),
        fields(
            source = %request.source(),
            kind = %request.kind(),
            mode = %request.get_mode()
        )
    )]
    pub async fn send(
        &self,
        request: &SendRequest,
        sent_at: Option<i64>,
    ) -> Result<DispatchResult, DispatchError> {
        let started = Instant::now();

        let validated = match request.validate() {
            Ok(validated) => validated,
            Err(reason) => {
                self.stats.validation_failures.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_invalid();
                tracing::warn!(reason = %reason, "Rejected send request");
                return Err(DispatchError::Validation(reason));
            }
        };

        let recipient = validated.recipient;
        let channels = match self
            .policy
            .resolve(recipient.member_id, request.source(), validated.kind)
            .await
        {
            Ok(channels) => channels,
            Err(e) => {
                self.stats.persistence_failures.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_failed();
                tracing::error!(error = %e, "Failed to resolve channels");
                return Err(e.into());
            }
        };

        let sent_at = sent_at.unwrap_or_else(|| self.clock.now());
        let protocol = self.registry.for_source(request.source());

        let mut envelope: Option<Envelope> = None;
        let mut result = DispatchResult {
            success: true,
            message_id: None,
            channels: channels.clone(),
            sms_attempted: false,
            email_attempted: false,
        };
        let mut persistence_error = None;

        for channel in channels {
            match channel {
                Channel::InApp => {
                    if recipient.member_id <= 0 {
                        tracing::debug!("Skipping in-app delivery for guest recipient");
                        continue;
                    }

                    let envelope = envelope
                        .get_or_insert_with(|| self.build_envelope(request, &validated, sent_at));
                    DispatchMetrics::record_channel_attempt(channel);

                    match self.write_in_app(request, envelope).await {
                        Ok(message_id) => result.message_id = Some(message_id),
                        Err(e) => {
                            tracing::error!(
                                recipient_id = recipient.member_id,
                                error = %e,
                                "Failed to store in-app notification"
                            );
                            persistence_error = Some(e);
                        }
                    }
                }
                Channel::Sms | Channel::Email => {
                    let Some(contact) = recipient.contact(channel) else {
                        tracing::debug!(channel = %channel, "No contact for channel, skipping");
                        TransportMetrics::record_skipped(channel);
                        continue;
                    };

                    let capability = match channel {
                        Channel::Sms => Capability::Sms,
                        _ => Capability::Email,
                    };
                    if !self.capabilities.is_installed(capability) {
                        tracing::debug!(channel = %channel, "Transport not installed, skipping");
                        TransportMetrics::record_skipped(channel);
                        continue;
                    }

                    let envelope = envelope
                        .get_or_insert_with(|| self.build_envelope(request, &validated, sent_at));
                    let sender = match channel {
                        Channel::Sms => protocol.sms_sender(envelope, recipient.name(), contact),
                        _ => protocol.email_sender(envelope, recipient.name(), contact),
                    };

                    let Some(sender) = sender else {
                        tracing::debug!(channel = %channel, "Protocol built no sender, skipping");
                        TransportMetrics::record_skipped(channel);
                        continue;
                    };

                    DispatchMetrics::record_channel_attempt(channel);
                    self.run_sender(channel, sender).await;

                    if channel == Channel::Sms {
                        self.stats.sms_attempts.fetch_add(1, Ordering::Relaxed);
                        result.sms_attempted = true;
                    } else {
                        self.stats.email_attempts.fetch_add(1, Ordering::Relaxed);
                        result.email_attempted = true;
                    }
                }
            }
        }

        DispatchMetrics::observe_latency(started.elapsed().as_secs_f64());

        if let Some(e) = persistence_error {
            self.stats.persistence_failures.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_failed();
            return Err(DispatchError::Persistence(e));
        }

        self.stats.total_sent.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_accepted();

        tracing::debug!(
            message_id = ?result.message_id,
            channels = result.channels.len(),
            sms = result.sms_attempted,
            email = result.email_attempted,
            "Dispatched notification"
        );

        Ok(result)
    }

    fn build_envelope(
        &self,
        request: &SendRequest,
        validated: &ValidatedRequest<'_>,
        sent_at: i64,
    ) -> Envelope {
        self.stats.envelopes_built.fetch_add(1, Ordering::Relaxed);

        Envelope::new(NotificationMessage {
            id: None,
            recipient_id: validated.recipient.member_id,
            source: request.source().clone(),
            target: validated.target.clone(),
            kind: validated.kind.to_string(),
            contents: vec![validated.content.clone()],
            sent_by: request.sent_by(),
            sent_at,
            is_checked: false,
            is_read: false,
            delivery_type: request.get_delivery_type().map(String::from),
        })
    }

    async fn write_in_app(
        &self,
        request: &SendRequest,
        envelope: &Envelope,
    ) -> Result<Uuid, StoreError> {
        let message = envelope.message();
        let content = envelope
            .content()
            .cloned()
            .ok_or_else(|| StoreError::IncompleteKey("content".to_string()))?;

        let write = MessageWrite {
            content,
            sent_by: message.sent_by,
            sent_at: message.sent_at,
            delivery_type: message.delivery_type.clone(),
        };

        let upserted = self
            .store
            .upsert(&message.key(), request.get_mode(), write)
            .await?;
        self.stats.in_app_writes.fetch_add(1, Ordering::Relaxed);

        Ok(upserted.message_id)
    }

    /// Run a transport sender. Its outcome never affects the send result.
    async fn run_sender(&self, channel: Channel, sender: Box<dyn TransportSender>) {
        match sender.send().await {
            Ok(()) => {
                TransportMetrics::record_sent(channel);
                tracing::debug!(channel = %channel, "Transport accepted notification");
            }
            Err(e) => {
                self.stats.transport_failures.fetch_add(1, Ordering::Relaxed);
                TransportMetrics::record_failed(channel);
                tracing::warn!(channel = %channel, error = %e, "Transport send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::notification::{
        ManualClock, Payload, Protocol, SendMode, SourceIdentity, TransportError,
    };
    use crate::store::{
        ChannelPreference, MemoryMessageStore, MemoryPreferenceStore, MessageStoreStats,
        UpsertResult,
    };

    #[derive(Default)]
    struct Calls {
        sms_built: AtomicUsize,
        email_built: AtomicUsize,
        sent: AtomicUsize,
    }

    struct RecordingSender {
        calls: Arc<Calls>,
        channel: Channel,
        fail: bool,
    }

    #[async_trait]
    impl TransportSender for RecordingSender {
        async fn send(&self) -> Result<(), TransportError> {
            self.calls.sent.fetch_add(1, Ordering::SeqCst);
            match (self.fail, self.channel) {
                (false, _) => Ok(()),
                (true, Channel::Email) => Err(TransportError::Rejected("bounced".to_string())),
                (true, _) => Err(TransportError::Unavailable("gateway down".to_string())),
            }
        }
    }

    struct EverywhereProtocol {
        calls: Arc<Calls>,
        fail: bool,
    }

    impl Protocol for EverywhereProtocol {
        fn default_channels(&self, _recipient_id: i64, _kind: &str) -> Vec<Channel> {
            vec![Channel::InApp, Channel::Sms, Channel::Email]
        }

        fn sms_sender(
            &self,
            envelope: &Envelope,
            _recipient_name: Option<&str>,
            phone: &str,
        ) -> Option<Box<dyn TransportSender>> {
            assert!(!phone.is_empty());
            assert!(envelope.message().id.is_none());
            self.calls.sms_built.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(RecordingSender {
                calls: self.calls.clone(),
                channel: Channel::Sms,
                fail: self.fail,
            }))
        }

        fn email_sender(
            &self,
            _envelope: &Envelope,
            _recipient_name: Option<&str>,
            _email: &str,
        ) -> Option<Box<dyn TransportSender>> {
            self.calls.email_built.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(RecordingSender {
                calls: self.calls.clone(),
                channel: Channel::Email,
                fail: self.fail,
            }))
        }
    }

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl MessageStore for BrokenStore {
        fn backend_type(&self) -> &'static str {
            "broken"
        }

        async fn upsert(
            &self,
            _key: &crate::notification::MessageKey,
            _mode: SendMode,
            _write: MessageWrite,
        ) -> Result<UpsertResult, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn get(&self, _message_id: Uuid) -> Result<Option<NotificationMessage>, StoreError> {
            Ok(None)
        }

        async fn list_for_recipient(
            &self,
            _recipient_id: i64,
            _limit: usize,
        ) -> Result<Vec<NotificationMessage>, StoreError> {
            Ok(Vec::new())
        }

        async fn count_unchecked(&self, _recipient_id: i64) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn mark_checked(&self, _message_id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn mark_read(&self, _message_id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn stats(&self) -> MessageStoreStats {
            MessageStoreStats {
                backend_type: "broken".to_string(),
                total_messages: 0,
                unchecked_messages: 0,
                recipients: 0,
            }
        }
    }

    fn board() -> SourceIdentity {
        SourceIdentity::new("module", "board")
    }

    fn engine_with(
        store: Arc<dyn MessageStore>,
        calls: Arc<Calls>,
        fail: bool,
    ) -> (DispatchEngine, Arc<MemoryPreferenceStore>) {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let registry = ProtocolRegistry::default()
            .with_protocol(board(), Arc::new(EverywhereProtocol { calls, fail }));
        let engine = DispatchEngine::new(store, preferences.clone(), Arc::new(registry))
            .with_capabilities(Arc::new(StaticCapabilities::all()))
            .with_clock(Arc::new(ManualClock::new(1_000)));
        (engine, preferences)
    }

    fn request(phone: Option<&str>, email: Option<&str>) -> SendRequest {
        SendRequest::new(board(), 0)
            .recipient(7, Some("Park"), email, phone)
            .target("post", 11)
            .content("comment", Payload::text("hi"))
    }

    #[tokio::test]
    async fn test_fan_out_to_all_channels_builds_envelope_once() {
        let calls = Arc::new(Calls::default());
        let store = Arc::new(MemoryMessageStore::new());
        let (engine, _) = engine_with(store.clone(), calls.clone(), false);

        let result = engine
            .send(&request(Some("010-1"), Some("p@example.com")), None)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.message_id.is_some());
        assert!(result.sms_attempted);
        assert!(result.email_attempted);
        assert_eq!(calls.sent.load(Ordering::SeqCst), 2);

        let stats = engine.stats();
        assert_eq!(stats.envelopes_built, 1);
        assert_eq!(stats.total_sent, 1);
        assert_eq!(stats.in_app_writes, 1);

        let stored = store.get(result.message_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.sent_at, 1_000);
    }

    #[tokio::test]
    async fn test_missing_phone_never_builds_sms_sender() {
        let calls = Arc::new(Calls::default());
        let (engine, _) = engine_with(Arc::new(MemoryMessageStore::new()), calls.clone(), false);

        let result = engine.send(&request(None, None), None).await.unwrap();

        assert!(result.channels.contains(&Channel::Sms));
        assert!(!result.sms_attempted);
        assert_eq!(calls.sms_built.load(Ordering::SeqCst), 0);
        assert_eq!(calls.email_built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capability_missing_skips_transport() {
        let calls = Arc::new(Calls::default());
        let (engine, _) = engine_with(Arc::new(MemoryMessageStore::new()), calls.clone(), false);
        let engine = engine.with_capabilities(Arc::new(StaticCapabilities {
            sms: false,
            email: true,
        }));

        let result = engine
            .send(&request(Some("010-1"), Some("p@example.com")), None)
            .await
            .unwrap();

        assert!(!result.sms_attempted);
        assert!(result.email_attempted);
        assert_eq!(calls.sms_built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effects() {
        let calls = Arc::new(Calls::default());
        let store = Arc::new(MemoryMessageStore::new());
        let (engine, _) = engine_with(store.clone(), calls.clone(), false);

        let request = SendRequest::new(board(), 0)
            .recipient(7, None, Some("p@example.com"), Some("010-1"))
            .target("post", 11);
        let result = engine.send(&request, None).await;

        assert!(matches!(result, Err(DispatchError::Validation(_))));
        assert_eq!(store.stats().await.total_messages, 0);
        assert_eq!(calls.sms_built.load(Ordering::SeqCst), 0);
        assert_eq!(calls.sent.load(Ordering::SeqCst), 0);
        assert_eq!(engine.stats().envelopes_built, 0);
        assert_eq!(engine.stats().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_fail_send() {
        let calls = Arc::new(Calls::default());
        let (engine, _) = engine_with(Arc::new(MemoryMessageStore::new()), calls.clone(), true);

        let result = engine
            .send(&request(Some("010-1"), Some("p@example.com")), None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(engine.stats().transport_failures, 2);
    }

    #[tokio::test]
    async fn test_persistence_error_returned_after_transports() {
        let calls = Arc::new(Calls::default());
        let (engine, _) = engine_with(Arc::new(BrokenStore), calls.clone(), false);

        let result = engine
            .send(&request(Some("010-1"), Some("p@example.com")), None)
            .await;

        assert!(matches!(result, Err(DispatchError::Persistence(_))));
        assert_eq!(calls.sent.load(Ordering::SeqCst), 2);
        assert_eq!(engine.stats().persistence_failures, 1);
    }

    #[tokio::test]
    async fn test_guest_gets_no_in_app_record() {
        let calls = Arc::new(Calls::default());
        let store = Arc::new(MemoryMessageStore::new());
        let (engine, _) = engine_with(store.clone(), calls.clone(), false);

        let request = SendRequest::new(board(), 0)
            .recipient(0, None, Some("guest@example.com"), None)
            .target("post", 11)
            .content("comment", Payload::text("hi"));
        let result = engine.send(&request, Some(5)).await.unwrap();

        assert!(result.message_id.is_none());
        assert!(result.email_attempted);
        assert_eq!(store.stats().await.total_messages, 0);
    }

    #[tokio::test]
    async fn test_empty_preference_row_sends_nothing() {
        let calls = Arc::new(Calls::default());
        let store = Arc::new(MemoryMessageStore::new());
        let (engine, preferences) = engine_with(store.clone(), calls.clone(), false);
        preferences
            .put(7, &board(), "comment", ChannelPreference::new(false, false, false))
            .await
            .unwrap();

        let result = engine
            .send(&request(Some("010-1"), Some("p@example.com")), None)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.channels.is_empty());
        assert_eq!(engine.stats().envelopes_built, 0);
        assert_eq!(store.stats().await.total_messages, 0);
    }
}
