//! Canonical message model and backend socket frames.
//!
//! These are the shapes exchanged with the backend as JSON, independent of
//! the underlying chat network. Field names follow the backend schema, so
//! serde renames are explicit where Rust naming differs.

use serde::{Deserialize, Deserializer, Serialize};

/// Platform identifier carried on every outbound frame.
pub const PLATFORM: &str = "whatsapp";

/// Bot identity used on frames emitted before the session handshake.
pub const UNAUTHENTICATED: &str = "unauthenticated";

/// A message sender, or the bridge's own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: String,
    pub is_bot: bool,
}

/// Chat classification, derived once from the native addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Private,
    Group,
}

/// A chat the backend can address messages to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Bare identifier, no domain suffix. The backend schema also permits
    /// numeric ids (including the legacy negative group convention), so
    /// deserialization accepts numbers and strings alike.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ConversationType,
}

impl Conversation {
    pub fn new(id: impl Into<String>, name: Option<String>, kind: ConversationType) -> Self {
        Self {
            id: id.into(),
            name,
            kind,
        }
    }
}

/// Canonical message content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Photo,
    Image,
    Video,
    Audio,
    Voice,
    Sticker,
    Document,
    /// Anything the backend sends that this bridge has no rendering for.
    #[serde(other)]
    Unsupported,
}

/// Optional rendering and semantic hints riding along with a message.
///
/// Never required for a valid message; unknown fields are preserved in
/// `rest` so hints pass through the bridge untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Bare user ids to mention explicitly, for media sends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<serde_json::Value>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// The backend-facing normalized representation of one chat event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation: Conversation,
    pub sender: User,
    /// Literal text, or a locator (URL or local path) for media.
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Unix timestamp (seconds).
    pub date: i64,
    /// Quoted message this one replies to. Inbound translation currently
    /// never populates it; see `translate::resolve_reply`.
    #[serde(default)]
    pub reply: Option<Box<Message>>,
    #[serde(default)]
    pub extra: Option<Extra>,
}

/// Frames the bridge writes to the backend socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Init {
        bot: String,
        platform: String,
        user: User,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<serde_json::Value>,
    },
    Ping {
        bot: String,
        platform: String,
    },
    Message {
        bot: String,
        platform: String,
        message: Message,
    },
}

impl OutboundFrame {
    pub fn init(user: User, config: Option<serde_json::Value>) -> Self {
        OutboundFrame::Init {
            bot: user.username.clone(),
            platform: PLATFORM.to_string(),
            user,
            config,
        }
    }

    pub fn ping(bot: impl Into<String>) -> Self {
        OutboundFrame::Ping {
            bot: bot.into(),
            platform: PLATFORM.to_string(),
        }
    }

    pub fn message(bot: impl Into<String>, message: Message) -> Self {
        OutboundFrame::Message {
            bot: bot.into(),
            platform: PLATFORM.to_string(),
            message,
        }
    }
}

/// Frames the backend writes to the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendFrame {
    /// Send request: render and deliver through the protocol client.
    Message { message: Message },
    /// Heartbeat ack; ignored.
    Pong,
    #[serde(other)]
    Unknown,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "204987".to_string(),
            first_name: Some("Bridge".to_string()),
            last_name: None,
            username: "204987".to_string(),
            is_bot: false,
        }
    }

    #[test]
    fn init_frame_shape() {
        let frame = OutboundFrame::init(sample_user(), Some(serde_json::json!({"k": 1})));
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();

        assert_eq!(json["type"], "init");
        assert_eq!(json["platform"], "whatsapp");
        assert_eq!(json["bot"], "204987");
        assert_eq!(json["user"]["firstName"], "Bridge");
        assert_eq!(json["user"]["isBot"], false);
        assert_eq!(json["config"]["k"], 1);
    }

    #[test]
    fn ping_frame_omits_user() {
        let frame = OutboundFrame::ping(UNAUTHENTICATED);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();

        assert_eq!(json["type"], "ping");
        assert_eq!(json["bot"], "unauthenticated");
        assert!(json.get("user").is_none());
    }

    #[test]
    fn backend_message_frame_parses() {
        let raw = r#"{
            "type": "message",
            "message": {
                "id": "abc",
                "conversation": {"id": -100200, "type": "group"},
                "sender": {"id": "1", "firstName": null, "lastName": null,
                           "username": "1", "isBot": true},
                "content": "hi",
                "type": "text",
                "date": 1700000000
            }
        }"#;

        match serde_json::from_str::<BackendFrame>(raw).unwrap() {
            BackendFrame::Message { message } => {
                // Numeric legacy ids come through as strings.
                assert_eq!(message.conversation.id, "-100200");
                assert_eq!(message.kind, MessageType::Text);
                assert!(message.reply.is_none());
                assert!(message.extra.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn pong_and_foreign_frames_parse() {
        assert!(matches!(
            serde_json::from_str::<BackendFrame>(r#"{"type": "pong"}"#).unwrap(),
            BackendFrame::Pong
        ));
        assert!(matches!(
            serde_json::from_str::<BackendFrame>(r#"{"type": "broadcast"}"#).unwrap(),
            BackendFrame::Unknown
        ));
    }

    #[test]
    fn unknown_message_type_deserializes_as_unsupported() {
        let kind: MessageType = serde_json::from_str(r#""contact_card""#).unwrap();
        assert_eq!(kind, MessageType::Unsupported);
    }

    #[test]
    fn extra_preserves_foreign_fields() {
        let raw = r#"{"format": "HTML", "customHint": {"x": 1}}"#;
        let extra: Extra = serde_json::from_str(raw).unwrap();
        assert_eq!(extra.format.as_deref(), Some("HTML"));
        assert_eq!(extra.rest["customHint"]["x"], 1);

        let back = serde_json::to_value(&extra).unwrap();
        assert_eq!(back["customHint"]["x"], 1);
    }
}
