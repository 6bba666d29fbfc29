//! JSON wire protocol spoken over the `/ws` socket.
//!
//! Every frame is a single JSON text message tagged by a `type` field.
//! There is no framing beyond what WebSocket provides and no delivery
//! guarantee beyond best effort.
//!
//! | `type`            | client → server                        | server → client          |
//! |-------------------|----------------------------------------|--------------------------|
//! | `chat`            | `{circleId, userId, content}`          | `{message: ChatMessage}` |
//! | `dm`              | `{conversationId, messageId}`          | `{message: DmMessage}`   |
//! | `refresh_circles` | no payload                             | n/a                      |
//! | `error`           | n/a                                    | `{message: String}`      |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, CircleId, ConversationId, DmMessage, MessageId, UserId};

/// A frame sent by a client to the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Post `content` to a circle. The relay persists it and fans it out.
    Chat {
        circle_id: CircleId,
        user_id: UserId,
        content: String,
    },
    /// Announce an already-persisted direct message to both participants.
    Dm {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// Ask the relay to re-read this connection's circle memberships.
    RefreshCircles,
}

impl ClientFrame {
    /// Serialize to the JSON text sent on the socket.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON text frame received from a client.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// A frame pushed by the relay to connected clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Chat { message: ChatMessage },
    Dm { message: DmMessage },
    /// A frame from this connection was rejected. Sent only to the sender.
    Error { message: String },
}

impl ServerFrame {
    /// The event type this frame is dispatched under.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Chat { .. } => FrameKind::Chat,
            Self::Dm { .. } => FrameKind::Dm,
            Self::Error { .. } => FrameKind::Error,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Event types a client can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Chat,
    Dm,
    Error,
}

impl FrameKind {
    /// The `type` tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Dm => "dm",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_client_chat_frame_shape() {
        let frame = ClientFrame::Chat {
            circle_id: CircleId::new("c1"),
            user_id: UserId::new("u1"),
            content: "hi".into(),
        };

        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "chat", "circleId": "c1", "userId": "u1", "content": "hi"})
        );
    }

    #[test]
    fn test_refresh_circles_has_no_payload() {
        let text = ClientFrame::RefreshCircles.encode().unwrap();
        assert_eq!(text, r#"{"type":"refresh_circles"}"#);
        assert_eq!(
            ClientFrame::decode(r#"{"type":"refresh_circles"}"#).unwrap(),
            ClientFrame::RefreshCircles
        );
    }

    #[test]
    fn test_dm_frame_decodes() {
        let frame =
            ClientFrame::decode(r#"{"type":"dm","conversationId":"d1","messageId":"m9"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Dm {
                conversation_id: ConversationId::new("d1"),
                message_id: MessageId::new("m9"),
            }
        );
    }

    #[test]
    fn test_server_chat_frame_decodes() {
        let text = json!({
            "type": "chat",
            "message": {
                "id": "m1",
                "circleId": "c1",
                "userId": "u1",
                "content": "hi",
                "createdAt": "2024-05-01T12:00:00Z"
            }
        })
        .to_string();

        let frame = ServerFrame::decode(&text).unwrap();
        assert_eq!(frame.kind(), FrameKind::Chat);
        let ServerFrame::Chat { message } = frame else {
            panic!("expected chat frame");
        };
        assert_eq!(message.id, MessageId::new("m1"));
        assert_eq!(
            message.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(ServerFrame::decode(r#"{"type":"typing","userId":"u1"}"#).is_err());
        assert!(ServerFrame::decode("not json").is_err());
    }
}
