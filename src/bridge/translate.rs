//! Inbound translation: native protocol events to canonical messages.
//!
//! `translate` is pure so the mapping can be tested without any client.
//! The acknowledgement side effects the original read path performed inline
//! (mark read, presence available) are modeled as an explicit effect list
//! applied afterwards, best-effort.

use super::model::{Conversation, ConversationType, Extra, Message, MessageType, User};
use crate::whatsapp::traits::{MessageKey, NativeContent, NativeMessage, WhatsAppClient};
use tracing::warn;

/// Acknowledgement side effects owed after translating an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum PostEffect {
    MarkRead(MessageKey),
    PresenceAvailable,
}

/// Translate one native event into a canonical message.
///
/// `group_subject` is the pre-fetched group display name, if the event came
/// from a group and the lookup succeeded. Returns `None` when the native
/// payload has no canonical equivalent; that is a skip, not an error.
pub fn translate(native: &NativeMessage, group_subject: Option<&str>) -> Option<Message> {
    let (content, kind) = match &native.content {
        NativeContent::Conversation(text) => (text.clone(), MessageType::Text),
        NativeContent::ExtendedText { text } => (text.clone(), MessageType::Text),
        NativeContent::Image { url } => (url.clone(), MessageType::Image),
        NativeContent::Video { url } => (url.clone(), MessageType::Video),
        NativeContent::Audio { url } => (url.clone(), MessageType::Audio),
        NativeContent::Sticker { url } => (url.clone(), MessageType::Sticker),
        NativeContent::Document { url } => (url.clone(), MessageType::Document),
        NativeContent::Unrecognized => return None,
    };

    let conversation_id = native.key.remote_jid.user().to_string();
    let kind_of_chat = if native.key.remote_jid.is_group() {
        ConversationType::Group
    } else {
        ConversationType::Private
    };

    // Display name: group subject, else sender push name, else the bare id.
    let push_name = native.push_name.as_deref().filter(|n| !n.is_empty());
    let name = group_subject
        .filter(|s| !s.is_empty())
        .or(push_name)
        .unwrap_or(&conversation_id)
        .to_string();

    let conversation = Conversation::new(conversation_id.clone(), Some(name), kind_of_chat);

    // Group messages carry a distinct participant; private chats collapse
    // sender and conversation into the same identity.
    let sender_id = native
        .key
        .participant
        .as_ref()
        .map(|jid| jid.user())
        .filter(|id| !id.is_empty())
        .unwrap_or(&conversation_id)
        .to_string();

    let sender = User {
        id: sender_id.clone(),
        first_name: native.push_name.clone(),
        last_name: None,
        username: sender_id,
        is_bot: false,
    };

    Some(Message {
        id: native.key.id.clone(),
        conversation,
        sender,
        content,
        kind,
        date: native.timestamp,
        reply: resolve_reply(native),
        extra: Some(Extra::default()),
    })
}

/// Quoted-message reconstruction is not wired up yet; every inbound message
/// surfaces without a reply back-reference.
fn resolve_reply(_native: &NativeMessage) -> Option<Box<Message>> {
    None
}

/// The acknowledgements owed for one inbound event.
pub fn post_effects(native: &NativeMessage) -> Vec<PostEffect> {
    vec![
        PostEffect::MarkRead(native.key.clone()),
        PostEffect::PresenceAvailable,
    ]
}

/// Run acknowledgement effects against the client. Failures are logged and
/// never propagate; message delivery must not depend on them.
pub async fn apply_effects<C: WhatsAppClient>(client: &C, effects: Vec<PostEffect>) {
    for effect in effects {
        match effect {
            PostEffect::MarkRead(key) => {
                if let Err(e) = client.read_messages(std::slice::from_ref(&key)).await {
                    warn!(message_id = %key.id, error = %e, "mark-read failed");
                }
            }
            PostEffect::PresenceAvailable => {
                if let Err(e) = client.send_presence_available().await {
                    warn!(error = %e, "presence update failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whatsapp::jid::Jid;
    use crate::whatsapp::mock::MockWhatsAppClient;

    fn native(content: NativeContent) -> NativeMessage {
        NativeMessage {
            key: MessageKey {
                id: "WAMID1".to_string(),
                remote_jid: Jid::new("555123@lid"),
                participant: None,
                from_me: false,
            },
            push_name: Some("Ada".to_string()),
            timestamp: 1_700_000_000,
            content,
        }
    }

    fn group_native(content: NativeContent) -> NativeMessage {
        NativeMessage {
            key: MessageKey {
                id: "WAMID2".to_string(),
                remote_jid: Jid::new("120363abc@g.us"),
                participant: Some(Jid::new("555999@lid")),
                from_me: false,
            },
            push_name: Some("Grace".to_string()),
            timestamp: 1_700_000_001,
            content,
        }
    }

    #[test]
    fn text_variants_map_to_text() {
        let msg = translate(&native(NativeContent::Conversation("hi".into())), None).unwrap();
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.content, "hi");

        let msg = translate(
            &native(NativeContent::ExtendedText { text: "quoted".into() }),
            None,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.content, "quoted");
    }

    #[test]
    fn media_variants_keep_locator_and_kind() {
        let cases = [
            (
                NativeContent::Image { url: "https://cdn/i".into() },
                MessageType::Image,
                "https://cdn/i",
            ),
            (
                NativeContent::Video { url: "https://cdn/v".into() },
                MessageType::Video,
                "https://cdn/v",
            ),
            (
                NativeContent::Audio { url: "https://cdn/a".into() },
                MessageType::Audio,
                "https://cdn/a",
            ),
            (
                NativeContent::Sticker { url: "https://cdn/s".into() },
                MessageType::Sticker,
                "https://cdn/s",
            ),
            (
                NativeContent::Document { url: "https://cdn/d".into() },
                MessageType::Document,
                "https://cdn/d",
            ),
        ];

        for (content, kind, locator) in cases {
            let msg = translate(&native(content), None).unwrap();
            assert_eq!(msg.kind, kind);
            assert_eq!(msg.content, locator);
        }
    }

    #[test]
    fn unrecognized_content_is_dropped() {
        assert!(translate(&native(NativeContent::Unrecognized), None).is_none());
    }

    #[test]
    fn private_chat_sender_equals_conversation() {
        let msg = translate(&native(NativeContent::Conversation("hi".into())), None).unwrap();
        assert_eq!(msg.conversation.id, "555123");
        assert_eq!(msg.conversation.kind, ConversationType::Private);
        assert_eq!(msg.sender.id, "555123");
        // No group subject: push name wins over the bare id.
        assert_eq!(msg.conversation.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn group_chat_uses_participant_and_subject() {
        let msg = translate(
            &group_native(NativeContent::Conversation("hi".into())),
            Some("Lab"),
        )
        .unwrap();
        assert_eq!(msg.conversation.id, "120363abc");
        assert_eq!(msg.conversation.kind, ConversationType::Group);
        assert_eq!(msg.conversation.name.as_deref(), Some("Lab"));
        assert_eq!(msg.sender.id, "555999");
        assert_eq!(msg.sender.username, "555999");
    }

    #[test]
    fn name_falls_back_to_bare_id() {
        let mut event = native(NativeContent::Conversation("hi".into()));
        event.push_name = None;
        let msg = translate(&event, None).unwrap();
        assert_eq!(msg.conversation.name.as_deref(), Some("555123"));
    }

    #[test]
    fn reply_is_always_absent() {
        let msg = translate(
            &native(NativeContent::ExtendedText { text: "re: earlier".into() }),
            None,
        )
        .unwrap();
        assert!(msg.reply.is_none());
    }

    #[test]
    fn effects_cover_read_and_presence() {
        let event = native(NativeContent::Conversation("hi".into()));
        let effects = post_effects(&event);
        assert_eq!(effects.len(), 2);
        assert!(matches!(&effects[0], PostEffect::MarkRead(key) if key.id == "WAMID1"));
        assert!(matches!(effects[1], PostEffect::PresenceAvailable));
    }

    #[tokio::test]
    async fn effects_are_applied_against_the_client() {
        let client = MockWhatsAppClient::new("1@lid", None);
        let event = native(NativeContent::Conversation("hi".into()));

        apply_effects(&client, post_effects(&event)).await;

        assert_eq!(client.read_receipts().len(), 1);
        assert_eq!(client.presence_updates(), 1);
    }

    #[tokio::test]
    async fn effect_failures_do_not_propagate() {
        let client = MockWhatsAppClient::new("1@lid", None);
        client.fail_read_receipts(true);
        let event = native(NativeContent::Conversation("hi".into()));

        // Mark-read fails; presence must still go through.
        apply_effects(&client, post_effects(&event)).await;

        assert!(client.read_receipts().is_empty());
        assert_eq!(client.presence_updates(), 1);
    }
}
