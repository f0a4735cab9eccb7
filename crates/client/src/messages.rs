//! Gateway wire format.
//!
//! The gateway speaks JSON frames shaped `{"type": "<kind>", "data":
//! {...}}` in both directions. Everything protocol-heavy (encryption,
//! delivery receipts, media) is handled gateway-side; this codec only
//! covers the frames the lifecycle core consumes and produces.

use serde::{Deserialize, Serialize};
use wirebot_core::types::Timestamp;

/// WebSocket close code the gateway uses for an explicit logout.
pub const CLOSE_CODE_LOGGED_OUT: u16 = 4401;

/// Frames received from the gateway.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayMessage {
    /// Handshake finished; the session is live.
    #[serde(rename = "ready")]
    Ready(ReadyData),

    /// A chat message addressed to the bot.
    #[serde(rename = "message")]
    Message(MessageData),

    /// The gateway rotated session material.
    #[serde(rename = "creds")]
    Creds(CredsData),

    /// The session was invalidated server-side.
    #[serde(rename = "logout")]
    Logout(LogoutData),
}

/// Payload for `ready` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyData {
    /// Address the session is authenticated as.
    pub jid: String,
}

/// Payload for `message` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageData {
    pub id: String,
    pub chat: String,
    pub sender: String,
    pub text: String,
    pub timestamp: Timestamp,
}

/// Payload for `creds` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct CredsData {
    /// Base64-encoded replacement credential bundle.
    pub bundle: String,
}

/// Payload for `logout` frames.
#[derive(Debug, Clone, Deserialize)]
pub struct LogoutData {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Frames sent to the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientFrame {
    /// First frame of every connection: presents the session bundle.
    #[serde(rename = "auth")]
    Auth(AuthData),

    /// Deliver a chat message.
    #[serde(rename = "send")]
    Send(SendData),
}

/// Payload for `auth` frames.
#[derive(Debug, Clone, Serialize)]
pub struct AuthData {
    /// Base64-encoded credential bundle.
    pub bundle: String,
}

/// Payload for `send` frames.
#[derive(Debug, Clone, Serialize)]
pub struct SendData {
    pub chat: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Parse a raw text frame into a typed [`GatewayMessage`].
pub fn parse_message(raw: &str) -> Result<GatewayMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ready_message() {
        let json = r#"{"type":"ready","data":{"jid":"923001112233@wa"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            GatewayMessage::Ready(data) => assert_eq!(data.jid, "923001112233@wa"),
            other => panic!("Expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_message() {
        let json = r#"{"type":"message","data":{"id":"3EB0","chat":"group@wa","sender":"user@wa","text":".ping","timestamp":"2026-08-01T10:15:00Z"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            GatewayMessage::Message(data) => {
                assert_eq!(data.id, "3EB0");
                assert_eq!(data.chat, "group@wa");
                assert_eq!(data.sender, "user@wa");
                assert_eq!(data.text, ".ping");
            }
            other => panic!("Expected Message, got {other:?}"),
        }
    }

    #[test]
    fn parse_creds_message() {
        let json = r#"{"type":"creds","data":{"bundle":"c2Vzc2lvbg=="}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            GatewayMessage::Creds(data) => assert_eq!(data.bundle, "c2Vzc2lvbg=="),
            other => panic!("Expected Creds, got {other:?}"),
        }
    }

    #[test]
    fn parse_logout_with_reason() {
        let json = r#"{"type":"logout","data":{"reason":"session revoked"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            GatewayMessage::Logout(data) => {
                assert_eq!(data.reason.as_deref(), Some("session revoked"));
            }
            other => panic!("Expected Logout, got {other:?}"),
        }
    }

    #[test]
    fn parse_logout_without_reason() {
        let json = r#"{"type":"logout","data":{}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            GatewayMessage::Logout(data) => assert!(data.reason.is_none()),
            other => panic!("Expected Logout, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        let json = r#"{"type":"presence","data":{}}"#;
        assert!(parse_message(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
    }

    #[test]
    fn auth_frame_serializes_with_tag_and_data() {
        let frame = ClientFrame::Auth(AuthData {
            bundle: "c2Vzc2lvbg==".into(),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "auth");
        assert_eq!(json["data"]["bundle"], "c2Vzc2lvbg==");
    }

    #[test]
    fn send_frame_omits_absent_image() {
        let frame = ClientFrame::Send(SendData {
            chat: "user@wa".into(),
            text: "pong".into(),
            image_url: None,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "send");
        assert!(json["data"].get("image_url").is_none());
    }
}
