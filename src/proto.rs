//! Wire protocol shared with the chat broker.
//!
//! The broker multiplexes logical channels ("destinations") over one
//! websocket connection. Each websocket text frame carries one tagged JSON
//! sub-protocol frame; chat and typing envelopes travel as JSON bodies
//! inside `send`/`message` frames. Field names on the envelope types are
//! part of the wire contract and must match the broker exactly.

use serde::{Deserialize, Serialize};

/// Well-known destination the join envelope is published to.
pub const DEST_ADD_USER: &str = "app/chat.addUser";
/// Outbound destination for public room messages.
pub const DEST_SEND_PUBLIC: &str = "app/chat.sendMessage";
/// Outbound destination for private 1:1 messages.
pub const DEST_SEND_PRIVATE: &str = "app/chat.private";
/// Outbound destination for project group messages.
pub const DEST_SEND_PROJECT: &str = "app/chat.project";
/// Outbound destination for typing signals (private mode only).
pub const DEST_SEND_TYPING: &str = "app/chat.typing";
/// Inbound broadcast destination for the public room.
pub const DEST_TOPIC_PUBLIC: &str = "broadcast/public";

/// Inbound destination carrying private messages addressed to `user_id`.
pub fn private_inbox(user_id: u64) -> String {
    format!("inbox/private/{user_id}")
}

/// Inbound destination carrying typing signals addressed to `user_id`.
pub fn typing_inbox(user_id: u64) -> String {
    format!("inbox/typing/{user_id}")
}

/// Inbound broadcast destination for a project group.
pub fn project_topic(project_id: u64) -> String {
    format!("broadcast/project/{project_id}")
}

/// Sub-protocol frames sent from client to broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving frames published to `destination`.
    Subscribe { destination: String },
    /// Stop receiving frames published to `destination`.
    Unsubscribe { destination: String },
    /// Publish a JSON envelope to `destination`.
    Send { destination: String, body: String },
}

/// Sub-protocol frames sent from broker to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerFrame {
    /// Broker accepted the connection; subscriptions may be issued.
    Connected,
    /// A frame published to a destination this client subscribed to.
    Message { destination: String, body: String },
    /// Broker-side failure; the connection is not usable afterwards.
    Error { message: String },
}

impl ClientFrame {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl BrokerFrame {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Chat message kind assigned by the broker on inbound envelopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Join,
    Leave,
    Chat,
    Typing,
}

/// Chat envelope carried inside `send`/`message` frame bodies.
///
/// Outbound envelopes omit `type` and `timestamp` (both server-assigned) and
/// carry `receiverId`/`projectId` only when the active conversation mode
/// requires them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    pub sender_id: u64,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// ISO-8601, assigned by the broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Ephemeral typing signal envelope.
///
/// Never persisted; each signal supersedes the previous one from the same
/// sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub user_id: u64,
    pub user_name: String,
    pub receiver_id: u64,
    pub is_typing: bool,
}

impl TypingSignal {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn subscribe_frame_wire_shape() {
        let frame = ClientFrame::Subscribe {
            destination: "inbox/private/1".to_string(),
        };
        let encoded: Value = serde_json::from_str(&frame.to_text().expect("encode")).expect("json");
        assert_eq!(
            encoded,
            json!({"type": "subscribe", "destination": "inbox/private/1"})
        );
    }

    #[test]
    fn send_frame_round_trip() {
        let frame = ClientFrame::Send {
            destination: DEST_SEND_PUBLIC.to_string(),
            body: "{}".to_string(),
        };
        let decoded = ClientFrame::from_text(&frame.to_text().expect("encode")).expect("decode");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn broker_connected_frame_decodes() {
        let frame = BrokerFrame::from_text(r#"{"type":"connected"}"#).expect("decode");
        assert_eq!(frame, BrokerFrame::Connected);
    }

    #[test]
    fn malformed_broker_frame_is_an_error() {
        assert!(BrokerFrame::from_text("not json").is_err());
        assert!(BrokerFrame::from_text(r#"{"type":"warp"}"#).is_err());
    }

    #[test]
    fn outbound_public_envelope_omits_optional_fields() {
        let message = ChatMessage {
            kind: None,
            sender_id: 1,
            sender_name: "A".to_string(),
            receiver_id: None,
            project_id: None,
            content: Some("hi".to_string()),
            timestamp: None,
        };
        let encoded: Value =
            serde_json::from_str(&message.to_text().expect("encode")).expect("json");
        assert_eq!(
            encoded,
            json!({"senderId": 1, "senderName": "A", "content": "hi"})
        );
    }

    #[test]
    fn inbound_chat_envelope_uses_camel_case_and_type_tag() {
        let message = ChatMessage::from_text(
            r#"{"type":"CHAT","senderId":2,"senderName":"B","receiverId":1,
                "content":"hello","timestamp":"2026-08-25T10:00:00Z"}"#,
        )
        .expect("decode");
        assert_eq!(message.kind, Some(MessageKind::Chat));
        assert_eq!(message.sender_id, 2);
        assert_eq!(message.receiver_id, Some(1));
        assert_eq!(message.timestamp.as_deref(), Some("2026-08-25T10:00:00Z"));
    }

    #[test]
    fn join_and_leave_kinds_decode() {
        let join =
            ChatMessage::from_text(r#"{"type":"JOIN","senderId":3,"senderName":"C"}"#).expect("join");
        assert_eq!(join.kind, Some(MessageKind::Join));
        let leave =
            ChatMessage::from_text(r#"{"type":"LEAVE","senderId":3,"senderName":"C"}"#)
                .expect("leave");
        assert_eq!(leave.kind, Some(MessageKind::Leave));
    }

    #[test]
    fn typing_signal_wire_shape() {
        let signal = TypingSignal {
            user_id: 1,
            user_name: "A".to_string(),
            receiver_id: 2,
            is_typing: true,
        };
        let encoded: Value =
            serde_json::from_str(&signal.to_text().expect("encode")).expect("json");
        assert_eq!(
            encoded,
            json!({"userId": 1, "userName": "A", "receiverId": 2, "isTyping": true})
        );
    }

    #[test]
    fn inbox_destinations_embed_the_user_id() {
        assert_eq!(private_inbox(7), "inbox/private/7");
        assert_eq!(typing_inbox(7), "inbox/typing/7");
        assert_eq!(project_topic(9), "broadcast/project/9");
    }
}
