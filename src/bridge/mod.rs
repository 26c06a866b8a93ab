//! Bridge core: canonical model, translation, and the connection lifecycle.

pub mod lifecycle;
pub mod model;
pub mod render;
pub mod session;
pub mod translate;

use crate::storage::StoreError;
use crate::whatsapp::retry::RetryError;
use crate::whatsapp::traits::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

pub use lifecycle::Lifecycle;
pub use model::{BackendFrame, Conversation, Message, MessageType, OutboundFrame, User};
pub use session::BridgeSession;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("chat network connection failed: {0}")]
    Connect(#[source] RetryError<ProtocolError>),

    #[error("backend connection failed: {0}")]
    Backend(#[source] RetryError<WsError>),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("logged out from the chat network; re-pairing required")]
    LoggedOut,

    #[error("backend socket closed")]
    SocketClosed,
}
