//! Reconnect state machine tests, driven by a scripted in-memory
//! transport instead of a live gateway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use wirebot_client::lifecycle::{ClientEvent, EventHandler, LifecycleManager, RunOutcome};
use wirebot_client::reconnect::RetryPolicy;
use wirebot_client::transport::{
    CloseReason, ConnectError, Connection, ConnectionEvent, InboundMessage, MessageSender,
    Transport,
};
use wirebot_core::types::Jid;
use wirebot_session::store::{CredentialBundle, SessionStore};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// One scripted `connect` outcome.
enum Step {
    /// `connect` fails with this error.
    Fail(ConnectError),
    /// `connect` succeeds; the connection replays these events in order.
    Session(Vec<ConnectionEvent>),
}

/// Transport double that replays a fixed script of connect outcomes.
struct FakeTransport {
    script: Mutex<VecDeque<Step>>,
    connects: AtomicU32,
}

impl FakeTransport {
    fn scripted(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            connects: AtomicU32::new(0),
        }
    }

    fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _creds: &CredentialBundle) -> Result<Connection, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport script exhausted");

        match step {
            Step::Fail(e) => Err(e),
            Step::Session(events) => {
                let (event_tx, event_rx) = mpsc::channel(16);
                let (outbound_tx, mut outbound_rx) = mpsc::channel(16);

                tokio::spawn(async move {
                    for event in events {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                });
                // Drain outbound messages so sends never block.
                tokio::spawn(async move { while outbound_rx.recv().await.is_some() {} });

                Ok(Connection {
                    self_jid: "bot@wa".into(),
                    events: event_rx,
                    sender: MessageSender::new(outbound_tx),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Recording handler
// ---------------------------------------------------------------------------

/// Handler double that records hook invocations in order.
#[derive(Default)]
struct RecordingHandler {
    calls: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_open(&self, self_jid: &Jid, _sender: MessageSender) {
        self.calls.lock().unwrap().push(format!("open:{self_jid}"));
    }

    async fn on_message(&self, message: InboundMessage, _sender: MessageSender) {
        self.calls.lock().unwrap().push(format!("msg:{}", message.text));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        id: "3EB0".into(),
        chat: "chat@wa".into(),
        sender: "user@wa".into(),
        text: text.into(),
        timestamp: Utc::now(),
    }
}

fn bundle(bytes: &[u8]) -> CredentialBundle {
    CredentialBundle::from_bytes(bytes.to_vec())
}

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(10),
        cap: Duration::from_millis(40),
        max_retries,
    }
}

/// Collect every buffered lifecycle event after a finished run.
fn drain_events(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct Fixture {
    manager: LifecycleManager<FakeTransport>,
    handler: Arc<RecordingHandler>,
    store_dir: tempfile::TempDir,
}

impl Fixture {
    fn new(steps: Vec<Step>, policy: RetryPolicy) -> Self {
        let handler = Arc::new(RecordingHandler::default());
        let store_dir = tempfile::tempdir().unwrap();
        let manager = LifecycleManager::new(
            FakeTransport::scripted(steps),
            SessionStore::new(store_dir.path()),
            policy,
            handler.clone(),
        );
        Self {
            manager,
            handler,
            store_dir,
        }
    }

    fn transport(&self) -> &FakeTransport {
        self.manager.transport()
    }
}

// ---------------------------------------------------------------------------
// Terminal vs retryable classification
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn logout_stops_on_first_occurrence() {
    let fixture = Fixture::new(
        vec![Step::Session(vec![ConnectionEvent::Closed(
            CloseReason::LoggedOut,
        )])],
        quick_policy(5),
    );
    let cancel = CancellationToken::new();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::LoggedOut);
    assert_eq!(fixture.transport().connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_during_handshake_is_terminal() {
    let fixture = Fixture::new(vec![Step::Fail(ConnectError::LoggedOut)], quick_policy(5));
    let cancel = CancellationToken::new();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::LoggedOut);
    assert_eq!(fixture.transport().connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retryable_closes_exhaust_the_ceiling() {
    // Five retries are scheduled; the sixth failure gives up.
    let steps = (0..6)
        .map(|_| Step::Session(vec![ConnectionEvent::Closed(CloseReason::Unknown)]))
        .collect();
    let fixture = Fixture::new(steps, quick_policy(5));
    let cancel = CancellationToken::new();
    let mut events = fixture.manager.subscribe();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::RetriesExhausted);
    assert_eq!(fixture.transport().connect_count(), 6);

    // Every scheduled retry increments the attempt by exactly one and
    // the delays never shrink.
    let reconnects: Vec<(u32, Duration)> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Reconnecting { attempt, delay } => Some((attempt, delay)),
            _ => None,
        })
        .collect();

    assert_eq!(
        reconnects.iter().map(|(a, _)| *a).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    for pair in reconnects.windows(2) {
        assert!(pair[1].1 >= pair[0].1, "delays must be non-decreasing");
    }
}

#[tokio::test(start_paused = true)]
async fn connect_failures_count_against_the_ceiling() {
    let steps = vec![
        Step::Fail(ConnectError::Transport("refused".into())),
        Step::Fail(ConnectError::Transport("refused".into())),
        Step::Fail(ConnectError::Transport("refused".into())),
    ];
    let fixture = Fixture::new(steps, quick_policy(2));
    let cancel = CancellationToken::new();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::RetriesExhausted);
    assert_eq!(fixture.transport().connect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn open_resets_the_retry_counter() {
    // Two failures reach the ceiling, then a successful session resets
    // it, so two more retryable closes can be scheduled afterwards.
    let steps = vec![
        Step::Fail(ConnectError::Transport("refused".into())),
        Step::Fail(ConnectError::Transport("refused".into())),
        Step::Session(vec![ConnectionEvent::Closed(CloseReason::Unknown)]),
        Step::Session(vec![ConnectionEvent::Closed(CloseReason::Unknown)]),
        Step::Session(vec![ConnectionEvent::Closed(CloseReason::LoggedOut)]),
    ];
    let fixture = Fixture::new(steps, quick_policy(2));
    let cancel = CancellationToken::new();
    let mut events = fixture.manager.subscribe();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::LoggedOut);
    assert_eq!(fixture.transport().connect_count(), 5);

    let attempts: Vec<u32> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Reconnecting { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 1, 2]);
}

// ---------------------------------------------------------------------------
// Event routing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn messages_reach_the_handler_after_open() {
    let fixture = Fixture::new(
        vec![Step::Session(vec![
            ConnectionEvent::MessageReceived(inbound(".ping")),
            ConnectionEvent::MessageReceived(inbound(".menu")),
            ConnectionEvent::Closed(CloseReason::LoggedOut),
        ])],
        quick_policy(5),
    );
    let cancel = CancellationToken::new();

    fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(
        fixture.handler.calls(),
        vec!["open:bot@wa", "msg:.ping", "msg:.menu"]
    );
}

#[tokio::test(start_paused = true)]
async fn credential_rotations_each_overwrite_the_store() {
    let fixture = Fixture::new(
        vec![Step::Session(vec![
            ConnectionEvent::CredentialsUpdated(bundle(b"rotation-1")),
            ConnectionEvent::CredentialsUpdated(bundle(b"rotation-2")),
            ConnectionEvent::Closed(CloseReason::LoggedOut),
        ])],
        quick_policy(5),
    );
    let cancel = CancellationToken::new();

    fixture.manager.run(bundle(b"initial"), &cancel).await;

    let store = SessionStore::new(fixture.store_dir.path());
    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.as_bytes(), b"rotation-2");
}

#[tokio::test(start_paused = true)]
async fn state_events_are_ordered_per_connection() {
    let fixture = Fixture::new(
        vec![
            Step::Session(vec![ConnectionEvent::Closed(CloseReason::Unknown)]),
            Step::Session(vec![ConnectionEvent::Closed(CloseReason::LoggedOut)]),
        ],
        quick_policy(5),
    );
    let cancel = CancellationToken::new();
    let mut events = fixture.manager.subscribe();

    fixture.manager.run(bundle(b"creds"), &cancel).await;

    let observed = drain_events(&mut events);
    assert_matches!(observed[0], ClientEvent::Connected { .. });
    assert_matches!(
        observed[1],
        ClientEvent::Disconnected {
            reason: CloseReason::Unknown
        }
    );
    assert_matches!(observed[2], ClientEvent::Reconnecting { attempt: 1, .. });
    assert_matches!(observed[3], ClientEvent::Connected { .. });
    assert_matches!(
        observed[4],
        ClientEvent::Disconnected {
            reason: CloseReason::LoggedOut
        }
    );
    assert_eq!(observed.len(), 5);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_stops_before_connecting() {
    let fixture = Fixture::new(vec![], quick_policy(5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = fixture.manager.run(bundle(b"creds"), &cancel).await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(fixture.transport().connect_count(), 0);
}

#[tokio::test]
async fn cancellation_aborts_a_scheduled_retry() {
    let policy = RetryPolicy {
        base: Duration::from_secs(30),
        cap: Duration::from_secs(30),
        max_retries: 5,
    };
    let fixture = Fixture::new(
        vec![Step::Fail(ConnectError::Transport("refused".into()))],
        policy,
    );
    let cancel = CancellationToken::new();
    let mut events = fixture.manager.subscribe();

    let run = fixture.manager.run(bundle(b"creds"), &cancel);
    tokio::pin!(run);

    // Wait until the retry is scheduled, then cancel during the delay.
    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        event = events.recv() => {
            assert_matches!(event.unwrap(), ClientEvent::Reconnecting { attempt: 1, .. });
            cancel.cancel();
            run.await
        }
    };

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(fixture.transport().connect_count(), 1);
}
