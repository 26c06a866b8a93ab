//! Protocol Client Trait Abstractions
//!
//! The WhatsApp wire protocol, key management and pairing are handled by an
//! external protocol client. These traits pin down the narrow contract the
//! bridge depends on, and let `MockWhatsAppClient` stand in for the real
//! thing in tests.

use super::jid::Jid;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// The bridge's own account as reported by the protocol client.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    /// Full account address, device suffix included (e.g. `204987:12@lid`).
    pub lid: String,
    /// Display name, if the account has one set.
    pub name: Option<String>,
}

/// Identifies one native message for acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub id: String,
    pub remote_jid: Jid,
    /// Distinct sender address, present for group messages only.
    pub participant: Option<Jid>,
    pub from_me: bool,
}

/// Native message payload variants the bridge understands.
///
/// Exactly one variant applies per message. Anything the protocol client
/// surfaces that has no canonical equivalent arrives as `Unrecognized` and
/// is dropped by translation rather than guessed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeContent {
    /// Plain text.
    Conversation(String),
    /// Text with link previews, quotes or formatting attached.
    ExtendedText { text: String },
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    Sticker { url: String },
    Document { url: String },
    Unrecognized,
}

/// One inbound chat event from the protocol client.
#[derive(Debug, Clone)]
pub struct NativeMessage {
    pub key: MessageKey,
    /// Sender display name as pushed by the network.
    pub push_name: Option<String>,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    pub content: NativeContent,
}

/// Why the protocol connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit logout; terminal, requires re-pairing.
    LoggedOut,
    /// Server asked for a restart (e.g. after pairing).
    RestartRequired,
    ConnectionLost,
    ConnectionReplaced,
    TimedOut,
    Unknown,
}

impl DisconnectReason {
    /// Everything except an explicit logout warrants a reconnect attempt.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DisconnectReason::LoggedOut)
    }
}

/// Connection-state and message events emitted by the protocol client.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    ConnectionOpened,
    ConnectionClosed { reason: DisconnectReason },
    /// Pairing QR payload; surfaced to the operator via logs.
    QrCode(String),
    /// Authentication material changed and should be persisted.
    CredsUpdated,
    MessageReceived(NativeMessage),
}

/// Resolved media attachment for an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// Remote locator the protocol client fetches itself.
    Url(String),
    /// Local file path.
    File(PathBuf),
}

/// Result type for protocol client operations.
pub type WaResult<T> = Result<T, ProtocolError>;

/// Protocol client errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid address: {0}")]
    InvalidJid(String),

    #[error("media error: {0}")]
    Media(String),
}

impl ProtocolError {
    /// Transient failures worth retrying; everything else is a logic error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::Network(_))
    }
}

/// Live connection to the chat network.
///
/// Implementations wrap the external protocol library; `MockWhatsAppClient`
/// implements the same surface in memory.
#[async_trait]
pub trait WhatsAppClient: Clone + Send + Sync + 'static {
    /// The authenticated account behind this connection.
    async fn account(&self) -> WaResult<AccountInfo>;

    /// Mint a fresh message id for an outbound send.
    fn generate_message_id(&self) -> String;

    async fn send_text(
        &self,
        chat: &Jid,
        text: &str,
        mentions: &[Jid],
        message_id: &str,
    ) -> WaResult<()>;

    async fn send_image(
        &self,
        chat: &Jid,
        media: &MediaReference,
        caption: Option<&str>,
        mentions: &[Jid],
        message_id: &str,
    ) -> WaResult<()>;

    /// `voice_note` marks the payload as a push-to-talk voice note rather
    /// than a plain audio file.
    async fn send_audio(
        &self,
        chat: &Jid,
        media: &MediaReference,
        voice_note: bool,
        message_id: &str,
    ) -> WaResult<()>;

    /// Group display name ("subject"), if the group has one.
    async fn group_subject(&self, chat: &Jid) -> WaResult<Option<String>>;

    /// Acknowledge messages as read.
    async fn read_messages(&self, keys: &[MessageKey]) -> WaResult<()>;

    async fn send_presence_available(&self) -> WaResult<()>;
}

/// Builds protocol connections.
///
/// `connect` performs the full dial/handshake and hands back the live client
/// together with its event stream. The lifecycle manager calls it again
/// after every recoverable disconnect.
#[async_trait]
pub trait WhatsAppConnector: Send + Sync {
    type Client: WhatsAppClient;

    async fn connect(
        &self,
    ) -> WaResult<(Self::Client, mpsc::UnboundedReceiver<ProtocolEvent>)>;
}
