//! Bridge session: one authenticated account, one backend socket.
//!
//! The session object is constructed once at startup and threaded through
//! every handler; there is no process-global state. Frames go out through a
//! channel drained by a single socket writer, so concurrent senders (the
//! heartbeat, inbound forwarding) never interleave partial writes.

use super::model::{BackendFrame, Message, OutboundFrame, User, UNAUTHENTICATED};
use super::render::{self, OutboundCommand, OutboundPayload};
use super::translate;
use super::BridgeError;
use crate::whatsapp::jid;
use crate::whatsapp::traits::{NativeMessage, WaResult, WhatsAppClient};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Write handle for the backend socket.
pub type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

/// Swappable protocol client handle.
///
/// The lifecycle manager replaces the inner client after a reconnect while
/// the session (and its exactly-once init) stays alive.
#[derive(Clone)]
pub struct ClientHandle<C: WhatsAppClient>(Arc<RwLock<C>>);

impl<C: WhatsAppClient> ClientHandle<C> {
    pub fn new(client: C) -> Self {
        Self(Arc::new(RwLock::new(client)))
    }

    /// Clone out the current client; never hold the lock across an await.
    pub fn current(&self) -> C {
        self.0.read().unwrap().clone()
    }

    pub fn replace(&self, client: C) {
        *self.0.write().unwrap() = client;
    }
}

/// Ties one protocol connection to one backend socket connection.
pub struct BridgeSession<C: WhatsAppClient> {
    client: ClientHandle<C>,
    socket: FrameSender,
    user: Arc<RwLock<Option<User>>>,
    config: Option<serde_json::Value>,
}

impl<C: WhatsAppClient> BridgeSession<C> {
    pub fn new(
        client: ClientHandle<C>,
        socket: FrameSender,
        config: Option<serde_json::Value>,
    ) -> Self {
        Self {
            client,
            socket,
            user: Arc::new(RwLock::new(None)),
            config,
        }
    }

    /// Shared view of the authenticated account, for the heartbeat.
    pub fn user_slot(&self) -> Arc<RwLock<Option<User>>> {
        self.user.clone()
    }

    /// Handshake with the backend. Called exactly once, after both the
    /// protocol connection and the backend socket are live.
    pub async fn init(&self) -> Result<(), BridgeError> {
        let client = self.client.current();
        let account = client.account().await?;
        let id = jid::account_id(&account.lid).to_string();
        let user = User {
            id: id.clone(),
            first_name: account.name,
            last_name: None,
            username: id,
            is_bot: false,
        };
        *self.user.write().unwrap() = Some(user.clone());

        client.send_presence_available().await?;
        let username = user.username.clone();
        self.send(OutboundFrame::init(user, self.config.clone()))?;
        info!("connected as @{username}");
        Ok(())
    }

    /// Emit one heartbeat frame.
    pub fn ping(&self) -> Result<(), BridgeError> {
        debug!("ping");
        self.send(heartbeat_frame(&self.user.read().unwrap()))
    }

    /// Route one inbound native event: translate, forward, acknowledge.
    pub async fn on_inbound_event(&self, native: NativeMessage) {
        let client = self.client.current();

        // Group subject lookup is best-effort; a failed fetch just falls
        // back to the next name source.
        let subject = if native.key.remote_jid.is_group() {
            match client.group_subject(&native.key.remote_jid).await {
                Ok(subject) => subject,
                Err(e) => {
                    warn!(chat = %native.key.remote_jid, error = %e, "group metadata lookup failed");
                    None
                }
            }
        } else {
            None
        };

        match translate::translate(&native, subject.as_deref()) {
            Some(message) => {
                if let Err(e) = self.send(OutboundFrame::message(self.bot_name(), message)) {
                    error!(error = %e, "failed to forward inbound message");
                }
            }
            None => debug!(message_id = %native.key.id, "no canonical equivalent, dropping event"),
        }

        translate::apply_effects(&client, translate::post_effects(&native)).await;
    }

    /// Route one backend frame.
    pub async fn on_backend_frame(&self, frame: BackendFrame) {
        match frame {
            BackendFrame::Message { message } => {
                info!(message_id = %message.id, kind = ?message.kind, "send request from backend");
                self.send_message(message).await;
            }
            // Heartbeat acks are expected traffic; keep them out of the logs.
            BackendFrame::Pong => {}
            BackendFrame::Unknown => debug!("ignoring unhandled backend frame"),
        }
    }

    async fn send_message(&self, message: Message) {
        let client = self.client.current();
        let message_id = client.generate_message_id();
        match render::render(&message, message_id).await {
            Some(command) => {
                if let Err(e) = dispatch(&client, &command).await {
                    error!(chat = %command.chat, error = %e, "outbound send failed");
                }
            }
            None => debug!(kind = ?message.kind, "send request not renderable, ignoring"),
        }
    }

    fn bot_name(&self) -> String {
        self.user
            .read()
            .unwrap()
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| UNAUTHENTICATED.to_string())
    }

    fn send(&self, frame: OutboundFrame) -> Result<(), BridgeError> {
        self.socket
            .send(frame)
            .map_err(|_| BridgeError::SocketClosed)
    }
}

/// Heartbeat frame for the current authentication state. Never depends on
/// a session existing; pre-handshake pings identify as unauthenticated.
pub fn heartbeat_frame(user: &Option<User>) -> OutboundFrame {
    let bot = user
        .as_ref()
        .map(|u| u.username.clone())
        .unwrap_or_else(|| UNAUTHENTICATED.to_string());
    OutboundFrame::ping(bot)
}

/// Hand a rendered command to the protocol client.
pub async fn dispatch<C: WhatsAppClient>(client: &C, command: &OutboundCommand) -> WaResult<()> {
    match &command.payload {
        OutboundPayload::Text { text, mentions } => {
            client
                .send_text(&command.chat, text, mentions, &command.message_id)
                .await
        }
        OutboundPayload::Image {
            media,
            caption,
            mentions,
        } => {
            client
                .send_image(
                    &command.chat,
                    media,
                    caption.as_deref(),
                    mentions,
                    &command.message_id,
                )
                .await
        }
        OutboundPayload::Audio { media, voice_note } => {
            client
                .send_audio(&command.chat, media, *voice_note, &command.message_id)
                .await
        }
    }
}
