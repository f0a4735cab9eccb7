//! WebSocket transport to the messaging gateway.
//!
//! [`GatewayTransport`] dials the gateway, presents the credential
//! bundle in an `auth` frame, waits for `ready`, then hands the socket
//! to a background pump that maps wire frames onto the transport-level
//! [`ConnectionEvent`] stream and drains the outbound message queue.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wirebot_core::types::Jid;
use wirebot_session::store::CredentialBundle;

use crate::messages::{
    parse_message, AuthData, ClientFrame, GatewayMessage, SendData, CLOSE_CODE_LOGGED_OUT,
};
use crate::transport::{
    CloseReason, ConnectError, Connection, ConnectionEvent, InboundMessage, MessageSender,
    OutboundMessage, Transport, EVENT_CHANNEL_CAPACITY, OUTBOUND_CHANNEL_CAPACITY,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a messaging gateway over WebSocket.
pub struct GatewayTransport {
    url: String,
}

impl GatewayTransport {
    /// Create a transport targeting `url`, e.g. `wss://gw.example.com`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// WebSocket base URL of the gateway.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Transport for GatewayTransport {
    async fn connect(&self, creds: &CredentialBundle) -> Result<Connection, ConnectError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.url, client_id);

        let (mut ws, _response) = connect_async(&url).await.map_err(|e| {
            ConnectError::Transport(format!(
                "Failed to connect to gateway at {}: {e}",
                self.url
            ))
        })?;

        // Present the session bundle as the first frame.
        let auth = ClientFrame::Auth(AuthData {
            bundle: creds.to_base64(),
        });
        let payload = serde_json::to_string(&auth)
            .map_err(|e| ConnectError::Transport(format!("Failed to encode auth frame: {e}")))?;
        ws.send(Message::Text(payload))
            .await
            .map_err(|e| ConnectError::Transport(format!("Failed to send auth frame: {e}")))?;

        // The gateway answers `ready`, or closes the socket.
        let self_jid = await_ready(&mut ws).await?;

        tracing::info!(
            client_id = %client_id,
            self_jid = %self_jid,
            "Connected to gateway at {}",
            self.url,
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        tokio::spawn(pump_connection(ws, event_tx, outbound_rx));

        Ok(Connection {
            self_jid,
            events: event_rx,
            sender: MessageSender::new(outbound_tx),
        })
    }
}

/// Wait for the post-auth `ready` frame.
async fn await_ready(ws: &mut WsStream) -> Result<Jid, ConnectError> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_message(&text) {
                Ok(GatewayMessage::Ready(data)) => return Ok(data.jid),
                Ok(GatewayMessage::Logout(data)) => {
                    tracing::error!(reason = ?data.reason, "Gateway rejected the session");
                    return Err(ConnectError::LoggedOut);
                }
                Ok(other) => {
                    tracing::debug!(frame = ?other, "Ignoring pre-ready frame");
                }
                Err(e) => {
                    return Err(ConnectError::Transport(format!("Bad handshake frame: {e}")));
                }
            },
            Ok(Message::Close(frame)) => return Err(handshake_close_error(frame)),
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(_) => {}
            Err(e) => return Err(ConnectError::Transport(e.to_string())),
        }
    }
    Err(ConnectError::Transport(
        "Gateway closed during handshake".into(),
    ))
}

/// Classify a close frame received before `ready`.
fn handshake_close_error(frame: Option<CloseFrame<'_>>) -> ConnectError {
    match frame {
        Some(f) if u16::from(f.code) == CLOSE_CODE_LOGGED_OUT => ConnectError::LoggedOut,
        Some(f) => ConnectError::Transport(format!(
            "Gateway closed during handshake: {} ({})",
            f.reason,
            u16::from(f.code),
        )),
        None => ConnectError::Transport("Gateway closed during handshake".into()),
    }
}

/// Classify a close frame on an established connection.
fn close_reason(frame: Option<CloseFrame<'_>>) -> CloseReason {
    match frame {
        Some(f) if u16::from(f.code) == CLOSE_CODE_LOGGED_OUT => CloseReason::LoggedOut,
        Some(f) => CloseReason::Error(format!("{} ({})", f.reason, u16::from(f.code))),
        None => CloseReason::Unknown,
    }
}

/// Read/write pump for an established connection.
///
/// Exits when the socket closes, a fatal receive/send error occurs, or
/// every [`MessageSender`] clone has been dropped. The final event on
/// the channel is always `Closed`.
async fn pump_connection(
    mut ws: WsStream,
    events: mpsc::Sender<ConnectionEvent>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) {
    loop {
        tokio::select! {
            frame = ws.next() => {
                let close = match frame {
                    Some(Ok(Message::Text(text))) => handle_text_frame(&text, &events).await,
                    Some(Ok(Message::Close(frame))) => Some(close_reason(frame)),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => None,
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        Some(CloseReason::Error(e.to_string()))
                    }
                    None => Some(CloseReason::Unknown),
                };
                if let Some(reason) = close {
                    let _ = events.send(ConnectionEvent::Closed(reason)).await;
                    return;
                }
            }
            message = outbound.recv() => match message {
                Some(out) => {
                    if let Some(reason) = send_frame(&mut ws, out).await {
                        let _ = events.send(ConnectionEvent::Closed(reason)).await;
                        return;
                    }
                }
                None => {
                    // The lifecycle dropped its sender; close politely.
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    }
}

/// Map one inbound text frame to events. Returns a reason to close.
async fn handle_text_frame(
    text: &str,
    events: &mpsc::Sender<ConnectionEvent>,
) -> Option<CloseReason> {
    match parse_message(text) {
        Ok(GatewayMessage::Message(data)) => {
            let _ = events
                .send(ConnectionEvent::MessageReceived(InboundMessage {
                    id: data.id,
                    chat: data.chat,
                    sender: data.sender,
                    text: data.text,
                    timestamp: data.timestamp,
                }))
                .await;
            None
        }
        Ok(GatewayMessage::Creds(data)) => {
            match CredentialBundle::from_base64(&data.bundle) {
                Ok(bundle) => {
                    let _ = events
                        .send(ConnectionEvent::CredentialsUpdated(bundle))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed creds frame");
                }
            }
            None
        }
        Ok(GatewayMessage::Logout(data)) => {
            tracing::warn!(reason = ?data.reason, "Gateway logged the session out");
            Some(CloseReason::LoggedOut)
        }
        Ok(GatewayMessage::Ready(_)) => {
            tracing::debug!("Ignoring duplicate ready frame");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_frame = %text, "Failed to parse gateway frame");
            None
        }
    }
}

/// Encode and send one outbound message. Returns a reason to close.
async fn send_frame(ws: &mut WsStream, out: OutboundMessage) -> Option<CloseReason> {
    let frame = ClientFrame::Send(SendData {
        chat: out.chat,
        text: out.text,
        image_url: out.image_url,
    });

    let payload = match serde_json::to_string(&frame) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode send frame");
            return None;
        }
    };

    match ws.send(Message::Text(payload)).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(error = %e, "WebSocket send error");
            Some(CloseReason::Error(e.to_string()))
        }
    }
}
