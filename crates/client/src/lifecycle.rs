//! Connection lifecycle manager.
//!
//! [`LifecycleManager`] owns the reconnect state machine: connect,
//! pump connection events, classify the close, back off and try again.
//! An explicit logout ends the run immediately; any other drop retries
//! with capped-linear backoff until the attempt ceiling is hit. The
//! retry counter resets to zero on every successful handshake.
//!
//! Lifecycle transitions are broadcast as [`ClientEvent`]s; call
//! [`LifecycleManager::subscribe`] to observe them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wirebot_core::types::Jid;
use wirebot_session::store::{CredentialBundle, SessionStore};

use crate::reconnect::RetryPolicy;
use crate::transport::{
    CloseReason, Connection, ConnectionEvent, InboundMessage, MessageSender, Transport,
};

/// Broadcast channel capacity for lifecycle events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Collaborator hooks invoked from the lifecycle loop.
///
/// Both hooks are best-effort from the manager's point of view:
/// implementations log their own failures, and nothing they do can
/// abort the connection or the process.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Fires once per successful handshake (greeting, presence, etc.).
    async fn on_open(&self, self_jid: &Jid, sender: MessageSender);

    /// Fires for every inbound chat message (command dispatch).
    async fn on_message(&self, message: InboundMessage, sender: MessageSender);
}

/// Lifecycle transitions, broadcast to any number of observers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake succeeded; the retry counter was reset.
    Connected { self_jid: Jid },

    /// The connection ended (before any reconnect decision).
    Disconnected { reason: CloseReason },

    /// A retryable failure; reconnect attempt `attempt` is scheduled
    /// after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Why [`LifecycleManager::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The gateway logged the session out; retrying is pointless.
    LoggedOut,

    /// The retry ceiling was hit without regaining a connection.
    RetriesExhausted,

    /// Shutdown was requested through the cancellation token.
    Cancelled,
}

/// Drives one gateway connection and its reconnects for the lifetime
/// of the process.
pub struct LifecycleManager<T: Transport> {
    transport: T,
    store: SessionStore,
    policy: RetryPolicy,
    handler: Arc<dyn EventHandler>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl<T: Transport> LifecycleManager<T> {
    pub fn new(
        transport: T,
        store: SessionStore,
        policy: RetryPolicy,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            store,
            policy,
            handler,
            event_tx,
        }
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// The transport this manager connects through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the connect/pump/reconnect loop until a terminal condition.
    ///
    /// `initial` is the bundle produced by bootstrap; rotated bundles
    /// replace it for later reconnects and are persisted as they
    /// arrive.
    pub async fn run(&self, initial: CredentialBundle, cancel: &CancellationToken) -> RunOutcome {
        let mut creds = initial;
        let mut retries: u32 = 0;

        loop {
            tracing::info!(attempt = retries + 1, "Connecting to gateway");

            // Biased so a pending shutdown always wins the race.
            let connect_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RunOutcome::Cancelled,
                result = self.transport.connect(&creds) => result,
            };

            let conn = match connect_result {
                Ok(conn) => conn,
                Err(e) if e.is_terminal() => {
                    tracing::error!(error = %e, "Gateway rejected the session");
                    let _ = self.event_tx.send(ClientEvent::Disconnected {
                        reason: CloseReason::LoggedOut,
                    });
                    return RunOutcome::LoggedOut;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Connection attempt failed");
                    match self.backoff(&mut retries, cancel).await {
                        RetryStep::Scheduled => continue,
                        RetryStep::Exhausted => return RunOutcome::RetriesExhausted,
                        RetryStep::Cancelled => return RunOutcome::Cancelled,
                    }
                }
            };

            // Open: the counter resets even if it was at the ceiling.
            retries = 0;
            tracing::info!(self_jid = %conn.self_jid, "Connected to gateway");
            let _ = self.event_tx.send(ClientEvent::Connected {
                self_jid: conn.self_jid.clone(),
            });
            self.handler.on_open(&conn.self_jid, conn.sender.clone()).await;

            let reason = match self.pump(conn, &mut creds, cancel).await {
                Some(reason) => reason,
                None => return RunOutcome::Cancelled,
            };

            tracing::warn!(reason = ?reason, "Disconnected from gateway");
            let _ = self.event_tx.send(ClientEvent::Disconnected {
                reason: reason.clone(),
            });

            if reason.is_terminal() {
                return RunOutcome::LoggedOut;
            }

            match self.backoff(&mut retries, cancel).await {
                RetryStep::Scheduled => continue,
                RetryStep::Exhausted => return RunOutcome::RetriesExhausted,
                RetryStep::Cancelled => return RunOutcome::Cancelled,
            }
        }
    }

    /// Consume connection events until the link closes.
    ///
    /// Returns the close reason, or `None` when shutdown was requested
    /// mid-connection.
    async fn pump(
        &self,
        conn: Connection,
        creds: &mut CredentialBundle,
        cancel: &CancellationToken,
    ) -> Option<CloseReason> {
        let mut events = conn.events;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                event = events.recv() => event,
            };

            match event {
                Some(ConnectionEvent::CredentialsUpdated(bundle)) => {
                    if let Err(e) = self.store.persist(&bundle) {
                        tracing::error!(error = %e, "Failed to persist rotated credentials");
                    } else {
                        tracing::debug!("Rotated credentials persisted");
                    }
                    *creds = bundle;
                }
                Some(ConnectionEvent::MessageReceived(message)) => {
                    self.handler.on_message(message, conn.sender.clone()).await;
                }
                Some(ConnectionEvent::Closed(reason)) => return Some(reason),
                // Event channel dropped without a close frame.
                None => return Some(CloseReason::Unknown),
            }
        }
    }

    /// Record a retryable failure and wait out the backoff delay.
    async fn backoff(&self, retries: &mut u32, cancel: &CancellationToken) -> RetryStep {
        if *retries >= self.policy.max_retries {
            tracing::error!(
                retries = *retries,
                "Max reconnect attempts reached, giving up",
            );
            return RetryStep::Exhausted;
        }

        *retries += 1;
        let delay = self.policy.delay_for(*retries);
        tracing::info!(
            attempt = *retries,
            max = self.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect",
        );
        let _ = self.event_tx.send(ClientEvent::Reconnecting {
            attempt: *retries,
            delay,
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => RetryStep::Cancelled,
            _ = tokio::time::sleep(delay) => RetryStep::Scheduled,
        }
    }
}

/// Outcome of one backoff decision.
enum RetryStep {
    Scheduled,
    Exhausted,
    Cancelled,
}
