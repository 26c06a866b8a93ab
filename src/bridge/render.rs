//! Outbound rendering: canonical messages to protocol client commands.
//!
//! Covers destination addressing, HTML to WhatsApp markdown, `@id` mention
//! extraction and media resolution. Message types with no WhatsApp
//! rendering yield no command at all; the caller treats that as a skip.

use super::model::{Extra, Message, MessageType};
use crate::whatsapp::jid::{self, Jid};
use crate::whatsapp::traits::MediaReference;
use base64::Engine;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// One fully resolved protocol send.
#[derive(Debug)]
pub struct OutboundCommand {
    pub chat: Jid,
    pub message_id: String,
    pub payload: OutboundPayload,
    /// Backing file for media decoded out of an embedded payload. Held so
    /// the file outlives the send; dropping the command removes it.
    temp: Option<NamedTempFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Text {
        text: String,
        mentions: Vec<Jid>,
    },
    Image {
        media: MediaReference,
        caption: Option<String>,
        mentions: Vec<Jid>,
    },
    Audio {
        media: MediaReference,
        voice_note: bool,
    },
}

/// Render a backend send request into a protocol command.
///
/// Returns `None` for message types this bridge cannot send and for media
/// that fails to resolve; both are logged skips, never errors.
pub async fn render(message: &Message, message_id: String) -> Option<OutboundCommand> {
    let chat = jid::format_chat_id(&message.conversation.id, message.conversation.kind);

    match message.kind {
        MessageType::Text => {
            let mut text = message.content.clone();
            if message
                .extra
                .as_ref()
                .and_then(|e| e.format.as_deref())
                .is_some_and(|f| f == "HTML")
            {
                text = html_to_whatsapp_markdown(&text);
            }
            let text = text.trim().to_string();
            let mentions = extract_mentions(&text);
            Some(OutboundCommand {
                chat,
                message_id,
                payload: OutboundPayload::Text { text, mentions },
                temp: None,
            })
        }
        MessageType::Photo | MessageType::Image => {
            let (media, temp) = resolve_media(&message.content).await?;
            let caption = message.extra.as_ref().and_then(|e| e.caption.clone());
            let mentions = explicit_mentions(message.extra.as_ref());
            Some(OutboundCommand {
                chat,
                message_id,
                payload: OutboundPayload::Image {
                    media,
                    caption,
                    mentions,
                },
                temp,
            })
        }
        MessageType::Audio | MessageType::Voice => {
            let (media, temp) = resolve_media(&message.content).await?;
            Some(OutboundCommand {
                chat,
                message_id,
                payload: OutboundPayload::Audio {
                    media,
                    voice_note: message.kind == MessageType::Voice,
                },
                temp,
            })
        }
        other => {
            debug!(kind = ?other, "no outbound rendering for message type, skipping");
            None
        }
    }
}

/// Resolve message content to a sendable media reference.
///
/// A network locator passes through for the protocol client to fetch; an
/// embedded base64 payload is decoded into a temp file; anything starting
/// with a path separator is an already-resolved local file.
async fn resolve_media(content: &str) -> Option<(MediaReference, Option<NamedTempFile>)> {
    if content.starts_with("http") {
        return Some((MediaReference::Url(content.to_string()), None));
    }
    if !content.starts_with('/') {
        let bytes = match base64::engine::general_purpose::STANDARD.decode(content) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "embedded media payload is not valid base64, skipping");
                return None;
            }
        };
        let file = match NamedTempFile::new() {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "failed to create temp file for media, skipping");
                return None;
            }
        };
        if let Err(e) = tokio::fs::write(file.path(), &bytes).await {
            warn!(error = %e, "failed to write decoded media, skipping");
            return None;
        }
        let path = file.path().to_path_buf();
        return Some((MediaReference::File(path), Some(file)));
    }
    Some((MediaReference::File(PathBuf::from(content)), None))
}

/// Scan rendered text for `@<digits>` tokens, in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<Jid> {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    let re = MENTION.get_or_init(|| Regex::new(r"@\d+").unwrap());
    re.find_iter(text)
        .map(|m| jid::mention(&m.as_str()[1..]))
        .collect()
}

fn explicit_mentions(extra: Option<&Extra>) -> Vec<Jid> {
    extra
        .and_then(|e| e.mentions.as_ref())
        .map(|ids| ids.iter().map(|id| jid::mention(id)).collect())
        .unwrap_or_default()
}

/// Convert backend HTML formatting to WhatsApp markdown.
///
/// Known inline tags become their markdown counterparts, every remaining
/// tag is stripped, and common entities are decoded.
pub fn html_to_whatsapp_markdown(html: &str) -> String {
    const TAGS: &[(&str, &str)] = &[
        ("<b>", "*"),
        ("</b>", "*"),
        ("<strong>", "*"),
        ("</strong>", "*"),
        ("<i>", "_"),
        ("</i>", "_"),
        ("<em>", "_"),
        ("</em>", "_"),
        ("<s>", "~"),
        ("</s>", "~"),
        ("<del>", "~"),
        ("</del>", "~"),
        ("<strike>", "~"),
        ("</strike>", "~"),
        ("<code>", "`"),
        ("</code>", "`"),
        ("<pre>", "```"),
        ("</pre>", "```"),
        ("<br>", "\n"),
        ("<br/>", "\n"),
        ("<br />", "\n"),
    ];

    let mut text = html.to_string();
    for (tag, replacement) in TAGS {
        text = text.replace(tag, replacement);
    }

    static RESIDUAL: OnceLock<Regex> = OnceLock::new();
    let re = RESIDUAL.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    let text = re.replace_all(&text, "");

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::model::{Conversation, ConversationType, User};

    fn sender() -> User {
        User {
            id: "1".to_string(),
            first_name: None,
            last_name: None,
            username: "1".to_string(),
            is_bot: true,
        }
    }

    fn message(kind: MessageType, content: &str, extra: Option<Extra>) -> Message {
        Message {
            id: "m1".to_string(),
            conversation: Conversation::new("555123", None, ConversationType::Private),
            sender: sender(),
            content: content.to_string(),
            kind,
            date: 1_700_000_000,
            reply: None,
            extra,
        }
    }

    #[tokio::test]
    async fn html_text_renders_as_markdown() {
        let extra = Extra {
            format: Some("HTML".to_string()),
            ..Extra::default()
        };
        let msg = message(MessageType::Text, "<b>hi</b>", Some(extra));

        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Text { text, .. } => {
                assert_eq!(text, "*hi*");
                assert!(!text.contains('<'));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_is_trimmed_not_reformatted() {
        let msg = message(MessageType::Text, "  <b>kept</b>  ", None);
        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Text { text, .. } => assert_eq!(text, "<b>kept</b>"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mentions_are_extracted_in_order() {
        let msg = message(MessageType::Text, "hello @12345 and @67890", None);
        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Text { mentions, .. } => {
                assert_eq!(
                    mentions,
                    vec![Jid::new("12345@lid"), Jid::new("67890@lid")]
                );
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_without_mentions_has_empty_list() {
        let msg = message(MessageType::Text, "no mentions here", None);
        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Text { mentions, .. } => assert!(mentions.is_empty()),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_types_yield_no_command() {
        for kind in [
            MessageType::Sticker,
            MessageType::Document,
            MessageType::Video,
            MessageType::Unsupported,
        ] {
            let msg = message(kind, "whatever", None);
            assert!(render(&msg, "ID1".to_string()).await.is_none());
        }
    }

    #[tokio::test]
    async fn photo_carries_caption_and_explicit_mentions() {
        let extra = Extra {
            caption: Some("sunset".to_string()),
            mentions: Some(vec!["12345".to_string()]),
            ..Extra::default()
        };
        let msg = message(MessageType::Photo, "https://cdn/pic.jpg", Some(extra));

        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Image {
                media,
                caption,
                mentions,
            } => {
                assert_eq!(media, MediaReference::Url("https://cdn/pic.jpg".to_string()));
                assert_eq!(caption.as_deref(), Some("sunset"));
                assert_eq!(mentions, vec![Jid::new("12345@lid")]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn voice_sets_the_voice_note_flag() {
        let msg = message(MessageType::Voice, "/tmp/note.ogg", None);
        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Audio { media, voice_note } => {
                assert!(voice_note);
                assert_eq!(media, MediaReference::File(PathBuf::from("/tmp/note.ogg")));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let msg = message(MessageType::Audio, "/tmp/song.mp3", None);
        let cmd = render(&msg, "ID2".to_string()).await.unwrap();
        match cmd.payload {
            OutboundPayload::Audio { voice_note, .. } => assert!(!voice_note),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn embedded_payload_is_decoded_to_a_temp_file() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"media-bytes");
        let msg = message(MessageType::Image, &payload, None);

        let cmd = render(&msg, "ID1".to_string()).await.unwrap();
        let path = match &cmd.payload {
            OutboundPayload::Image {
                media: MediaReference::File(path),
                ..
            } => path.clone(),
            other => panic!("unexpected payload: {other:?}"),
        };

        assert_eq!(std::fs::read(&path).unwrap(), b"media-bytes");

        // The file's lifetime is tied to the command.
        drop(cmd);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn invalid_embedded_payload_is_skipped() {
        let msg = message(MessageType::Image, "not base64!!!", None);
        assert!(render(&msg, "ID1".to_string()).await.is_none());
    }

    #[test]
    fn markdown_conversion_table() {
        assert_eq!(html_to_whatsapp_markdown("<i>em</i>"), "_em_");
        assert_eq!(html_to_whatsapp_markdown("<s>gone</s>"), "~gone~");
        assert_eq!(html_to_whatsapp_markdown("<code>x</code>"), "`x`");
        assert_eq!(html_to_whatsapp_markdown("a<br>b"), "a\nb");
        assert_eq!(html_to_whatsapp_markdown("<a href=\"u\">link</a>"), "link");
        assert_eq!(html_to_whatsapp_markdown("5 &gt; 3 &amp;&amp; 2 &lt; 4"), "5 > 3 && 2 < 4");
    }
}
