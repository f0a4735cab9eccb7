//! Transport seam between the lifecycle manager and the gateway.
//!
//! The actual messaging protocol (handshake crypto, session rotation,
//! message framing beyond the thin JSON codec) lives on the other side
//! of [`Transport`]. The lifecycle manager only consumes the ordered
//! event stream of a [`Connection`] and writes through its
//! [`MessageSender`], so tests can drive it with an in-memory fake.

use async_trait::async_trait;
use tokio::sync::mpsc;
use wirebot_core::types::{Jid, Timestamp};
use wirebot_session::store::CredentialBundle;

/// Buffer sizes for the per-connection event and outbound channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The gateway invalidated the session (explicit logout).
    LoggedOut,

    /// A transport-level failure (socket error, bad frame, timeout).
    Error(String),

    /// The link dropped without any stated reason.
    Unknown,
}

impl CloseReason {
    /// Only an explicit logout stops the reconnect loop; every other
    /// reason, including none at all, is eligible for retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// A chat message received from the gateway.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Gateway-assigned message id.
    pub id: String,
    /// Chat (user or group) the message arrived in.
    pub chat: Jid,
    /// Author of the message.
    pub sender: Jid,
    /// Plain-text body.
    pub text: String,
    /// Server-side receive time.
    pub timestamp: Timestamp,
}

/// A chat message to deliver through the gateway.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat: Jid,
    pub text: String,
    /// Optional image attached above the text (used by the greeting).
    pub image_url: Option<String>,
}

/// Events emitted by a live connection.
///
/// Delivered over a single channel per connection, so observers see
/// them in exactly the order the gateway produced them.
/// [`Closed`](ConnectionEvent::Closed) is always the final event.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The gateway rotated session material; the new bundle must be
    /// persisted, overwriting the previous one.
    CredentialsUpdated(CredentialBundle),

    /// A chat message arrived.
    MessageReceived(InboundMessage),

    /// The link ended.
    Closed(CloseReason),
}

/// Clonable handle for sending messages on one connection.
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<OutboundMessage>,
}

impl MessageSender {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Queue a message for delivery.
    ///
    /// Fails only when the connection behind this handle is gone.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.tx.send(message).await.map_err(|_| SendError)
    }
}

/// The connection behind a [`MessageSender`] has closed.
#[derive(Debug, thiserror::Error)]
#[error("Connection is closed")]
pub struct SendError;

/// A live, authenticated link to the gateway.
pub struct Connection {
    /// Address the session is authenticated as.
    pub self_jid: Jid,
    /// Ordered stream of connection events.
    pub events: mpsc::Receiver<ConnectionEvent>,
    /// Write half; clones stay valid until the connection closes.
    pub sender: MessageSender,
}

/// Error establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The gateway rejected the credentials as logged out. Terminal.
    #[error("Session is logged out")]
    LoggedOut,

    /// Dial or handshake failure. Retryable.
    #[error("Connection error: {0}")]
    Transport(String),
}

impl ConnectError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectError::LoggedOut)
    }
}

/// Factory for connections to the messaging gateway.
///
/// `connect` suspends until the transport handshake either succeeds or
/// fails; a returned [`Connection`] is already authenticated.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, creds: &CredentialBundle) -> Result<Connection, ConnectError>;
}
