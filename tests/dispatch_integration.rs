//! Dispatch integration tests
//!
//! These tests drive the public dispatch API end to end with the in-memory
//! stores, a recording protocol and a manual clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use push_dispatch_service::notification::{
    Channel, DispatchEngine, DispatchError, Envelope, ManualClock, NotificationCode, Payload,
    Protocol, ProtocolRegistry, SendMode, SendRequest, SourceIdentity, StaticCapabilities,
    TransportError, TransportSender,
};
use push_dispatch_service::store::{
    ChannelPreference, MemoryMessageStore, MemoryPreferenceStore, MessageStore, PreferenceStore,
};

// ============================================================================
// Test protocol
// ============================================================================

#[derive(Default)]
struct Deliveries {
    sms_builds: AtomicUsize,
    email_builds: AtomicUsize,
    /// (channel, contact, recipient name, kind)
    sent: Mutex<Vec<(Channel, String, Option<String>, String)>>,
}

struct Delivery {
    deliveries: Arc<Deliveries>,
    channel: Channel,
    contact: String,
    name: Option<String>,
    kind: String,
}

#[async_trait]
impl TransportSender for Delivery {
    async fn send(&self) -> Result<(), TransportError> {
        self.deliveries.sent.lock().unwrap().push((
            self.channel,
            self.contact.clone(),
            self.name.clone(),
            self.kind.clone(),
        ));
        Ok(())
    }
}

/// Board protocol: members get in-app + SMS by default, guests email only
struct BoardProtocol {
    deliveries: Arc<Deliveries>,
}

impl Protocol for BoardProtocol {
    fn codes(&self) -> Vec<NotificationCode> {
        vec![
            NotificationCode::new("comment")
                .title("New comment")
                .channels(&[Channel::InApp, Channel::Sms, Channel::Email]),
            NotificationCode::new("mention").channels(&[Channel::InApp]),
        ]
    }

    fn default_channels(&self, recipient_id: i64, _kind: &str) -> Vec<Channel> {
        if recipient_id == 0 {
            vec![Channel::Email]
        } else {
            vec![Channel::InApp, Channel::Sms]
        }
    }

    fn sms_sender(
        &self,
        envelope: &Envelope,
        recipient_name: Option<&str>,
        phone: &str,
    ) -> Option<Box<dyn TransportSender>> {
        self.deliveries.sms_builds.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(Delivery {
            deliveries: self.deliveries.clone(),
            channel: Channel::Sms,
            contact: phone.to_string(),
            name: recipient_name.map(String::from),
            kind: envelope.message().kind.clone(),
        }))
    }

    fn email_sender(
        &self,
        envelope: &Envelope,
        recipient_name: Option<&str>,
        email: &str,
    ) -> Option<Box<dyn TransportSender>> {
        self.deliveries.email_builds.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(Delivery {
            deliveries: self.deliveries.clone(),
            channel: Channel::Email,
            contact: email.to_string(),
            name: recipient_name.map(String::from),
            kind: envelope.message().kind.clone(),
        }))
    }
}

struct TestEnvironment {
    engine: Arc<DispatchEngine>,
    store: Arc<MemoryMessageStore>,
    preferences: Arc<MemoryPreferenceStore>,
    deliveries: Arc<Deliveries>,
    clock: Arc<ManualClock>,
}

fn board() -> SourceIdentity {
    SourceIdentity::new("module", "board")
}

fn forum() -> SourceIdentity {
    SourceIdentity::new("module", "forum")
}

fn create_test_environment() -> TestEnvironment {
    let store = Arc::new(MemoryMessageStore::new());
    let preferences = Arc::new(MemoryPreferenceStore::new());
    let deliveries = Arc::new(Deliveries::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000));

    let registry = ProtocolRegistry::default().with_protocol(
        board(),
        Arc::new(BoardProtocol {
            deliveries: deliveries.clone(),
        }),
    );

    let engine = DispatchEngine::new(store.clone(), preferences.clone(), Arc::new(registry))
        .with_capabilities(Arc::new(StaticCapabilities::all()))
        .with_clock(clock.clone());

    TestEnvironment {
        engine: Arc::new(engine),
        store,
        preferences,
        deliveries,
        clock,
    }
}

fn comment(source: SourceIdentity, member_id: i64, text: &str) -> SendRequest {
    SendRequest::new(source, 0)
        .recipient(member_id, Some("Choi"), None, None)
        .target("post", 100)
        .content("comment", Payload::text(text))
}

// ============================================================================
// Merge / Replace / New
// ============================================================================

#[tokio::test]
async fn test_merge_twice_appends_in_send_order() {
    let env = create_test_environment();

    let first = assert_ok!(env.engine.send(&comment(forum(), 3, "one"), None).await);
    env.clock.advance(10);
    let second = assert_ok!(env.engine.send(&comment(forum(), 3, "two"), None).await);

    assert_eq!(first.message_id, second.message_id);

    let stored = env
        .store
        .get(first.message_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.contents, vec![Payload::text("one"), Payload::text("two")]);
    assert_eq!(stored.sent_at, 1_700_000_010);
}

#[tokio::test]
async fn test_replace_twice_keeps_latest() {
    let env = create_test_environment();

    let first = env
        .engine
        .send(&comment(forum(), 3, "one").mode(SendMode::Replace), None)
        .await
        .unwrap();
    let second = env
        .engine
        .send(&comment(forum(), 3, "two").mode(SendMode::Replace), None)
        .await
        .unwrap();

    assert_eq!(first.message_id, second.message_id);
    let stored = env
        .store
        .get(second.message_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.contents, vec![Payload::text("two")]);
}

#[tokio::test]
async fn test_new_twice_creates_two_records() {
    let env = create_test_environment();

    let first = env
        .engine
        .send(&comment(forum(), 3, "one").mode_named("new"), None)
        .await
        .unwrap();
    let second = env
        .engine
        .send(&comment(forum(), 3, "two").mode_named("new"), None)
        .await
        .unwrap();

    assert_ne!(first.message_id, second.message_id);
    assert_eq!(env.store.list_for_recipient(3, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_merge_after_check_opens_new_record() {
    let env = create_test_environment();

    let first = env.engine.send(&comment(forum(), 3, "one"), None).await.unwrap();
    let first_id = first.message_id.unwrap();
    assert!(env.store.mark_checked(first_id).await.unwrap());

    let second = env.engine.send(&comment(forum(), 3, "two"), None).await.unwrap();
    assert_ne!(second.message_id, Some(first_id));
    assert_eq!(env.store.count_unchecked(3).await.unwrap(), 1);
}

#[tokio::test]
async fn test_replace_reopens_read_record() {
    let env = create_test_environment();

    let first = env
        .engine
        .send(&comment(forum(), 3, "one").mode(SendMode::Replace), None)
        .await
        .unwrap();
    let id = first.message_id.unwrap();
    env.store.mark_read(id).await.unwrap();
    assert_eq!(env.store.count_unchecked(3).await.unwrap(), 0);

    let second = env
        .engine
        .send(&comment(forum(), 3, "two").mode(SendMode::Replace), None)
        .await
        .unwrap();
    assert_eq!(second.message_id, Some(id));

    let stored = env.store.get(id).await.unwrap().unwrap();
    assert!(!stored.is_checked);
    assert!(!stored.is_read);
}

#[tokio::test]
async fn test_invalid_mode_name_keeps_prior_mode() {
    let env = create_test_environment();

    let request = comment(forum(), 3, "one")
        .mode(SendMode::New)
        .mode_named("bogus");
    assert_eq!(request.get_mode(), SendMode::New);

    env.engine.send(&request, None).await.unwrap();
    env.engine.send(&request, None).await.unwrap();
    assert_eq!(env.store.list_for_recipient(3, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_string_and_numeric_target_ids_share_a_key() {
    let env = create_test_environment();

    let numeric = comment(forum(), 3, "one");
    let textual = SendRequest::new(forum(), 0)
        .recipient(3, None, None, None)
        .target("post", "100")
        .content("comment", Payload::text("two"));

    let first = env.engine.send(&numeric, None).await.unwrap();
    let second = env.engine.send(&textual, None).await.unwrap();
    assert_eq!(first.message_id, second.message_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_merges_yield_one_record() {
    let env = create_test_environment();

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let engine = env.engine.clone();
            tokio::spawn(async move {
                engine
                    .send(&comment(forum(), 8, &format!("m{}", i)), None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let records = env.store.list_for_recipient(8, 50).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].contents.len(), 24);
}

// ============================================================================
// Channel resolution and fan-out
// ============================================================================

#[tokio::test]
async fn test_default_channels_for_guest_and_member() {
    let env = create_test_environment();

    let guest = SendRequest::new(forum(), 0)
        .recipient(0, None, None, None)
        .target("post", 1)
        .content("comment", Payload::text("x"));
    let result = env.engine.send(&guest, None).await.unwrap();
    assert_eq!(result.channels, vec![Channel::Sms, Channel::Email]);
    assert!(result.message_id.is_none());

    let result = env.engine.send(&comment(forum(), 5, "x"), None).await.unwrap();
    assert_eq!(result.channels, vec![Channel::InApp]);
    assert!(result.message_id.is_some());
}

#[tokio::test]
async fn test_repeated_default_channels_run_once() {
    /// Lists every channel twice
    struct Stutter {
        inner: BoardProtocol,
    }

    impl Protocol for Stutter {
        fn default_channels(&self, _recipient_id: i64, _kind: &str) -> Vec<Channel> {
            vec![Channel::InApp, Channel::Sms, Channel::InApp, Channel::Sms]
        }

        fn sms_sender(
            &self,
            envelope: &Envelope,
            recipient_name: Option<&str>,
            phone: &str,
        ) -> Option<Box<dyn TransportSender>> {
            self.inner.sms_sender(envelope, recipient_name, phone)
        }
    }

    let deliveries = Arc::new(Deliveries::default());
    let store = Arc::new(MemoryMessageStore::new());
    let registry = ProtocolRegistry::default().with_protocol(
        board(),
        Arc::new(Stutter {
            inner: BoardProtocol {
                deliveries: deliveries.clone(),
            },
        }),
    );
    let engine = DispatchEngine::new(
        store.clone(),
        Arc::new(MemoryPreferenceStore::new()),
        Arc::new(registry),
    )
    .with_capabilities(Arc::new(StaticCapabilities::all()));

    let request = SendRequest::new(board(), 0)
        .recipient(5, Some("Choi"), None, Some("010-1111-2222"))
        .target("post", 1)
        .content("comment", Payload::text("once"));
    let result = assert_ok!(engine.send(&request, None).await);

    assert_eq!(result.channels, vec![Channel::InApp, Channel::Sms]);
    let stored = store.get(result.message_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.contents, vec![Payload::text("once")]);
    assert_eq!(deliveries.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_email_only_preference() {
    let env = create_test_environment();
    env.preferences
        .put(5, &board(), "comment", ChannelPreference::new(false, false, true))
        .await
        .unwrap();

    let request = SendRequest::new(board(), 0)
        .recipient(5, Some("Han"), Some("han@example.com"), Some("010-5555-5555"))
        .target("post", 1)
        .content("comment", Payload::text("x"));
    let result = env.engine.send(&request, None).await.unwrap();

    assert_eq!(result.channels, vec![Channel::Email]);
    assert!(result.message_id.is_none());
    assert!(!result.sms_attempted);
    assert!(result.email_attempted);

    let sent = env.deliveries.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![(
            Channel::Email,
            "han@example.com".to_string(),
            Some("Han".to_string()),
            "comment".to_string()
        )]
    );
}

#[tokio::test]
async fn test_member_without_phone_never_builds_sms_sender() {
    let env = create_test_environment();

    let result = env.engine.send(&comment(board(), 5, "x"), None).await.unwrap();

    assert_eq!(result.channels, vec![Channel::InApp, Channel::Sms]);
    assert!(!result.sms_attempted);
    assert_eq!(env.deliveries.sms_builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sms_and_email_share_one_envelope() {
    let env = create_test_environment();
    env.preferences
        .put(5, &board(), "comment", ChannelPreference::new(true, true, true))
        .await
        .unwrap();

    let request = SendRequest::new(board(), 2)
        .recipient(5, None, Some("a@example.com"), Some("010-1"))
        .target("post", 1)
        .content("comment", Payload::text("x"));
    let result = env.engine.send(&request, Some(42)).await.unwrap();

    assert!(result.sms_attempted && result.email_attempted);
    assert_eq!(env.engine.stats().envelopes_built, 1);
    assert_eq!(env.deliveries.sent.lock().unwrap().len(), 2);

    let stored = env
        .store
        .get(result.message_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sent_at, 42);
    assert_eq!(stored.sent_by, 2);
}

#[tokio::test]
async fn test_missing_kind_fails_without_side_effects() {
    let env = create_test_environment();

    let request = SendRequest::new(board(), 0)
        .recipient(5, None, Some("a@example.com"), Some("010-1"))
        .target("post", 1);
    let result = env.engine.send(&request, None).await;

    let err = assert_err!(result);
    assert!(matches!(err, DispatchError::Validation(_)));
    assert_eq!(env.store.stats().await.total_messages, 0);
    assert_eq!(env.deliveries.sms_builds.load(Ordering::SeqCst), 0);
    assert_eq!(env.deliveries.email_builds.load(Ordering::SeqCst), 0);
    assert!(env.deliveries.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_registered_codes_are_advertised() {
    let env = create_test_environment();

    let codes = env.engine.registry().for_source(&board()).codes();
    assert_eq!(codes.len(), 2);
    assert_eq!(codes[0].code(), "comment");
    assert_eq!(codes[1].get_channels(), &[Channel::InApp]);

    assert!(env.engine.registry().for_source(&forum()).codes().is_empty());
}
