//! WhatsApp protocol-client integration.
//!
//! The wire protocol itself lives in an external client; this module owns
//! the contract the bridge holds it to (`traits`), WhatsApp addressing
//! (`jid`), reconnect policy (`retry`) and the in-memory stand-in used by
//! tests and loopback runs (`mock`).

pub mod jid;
pub mod mock;
pub mod retry;
pub mod traits;

pub use jid::Jid;
pub use traits::{
    AccountInfo, DisconnectReason, MediaReference, MessageKey, NativeContent, NativeMessage,
    ProtocolError, ProtocolEvent, WaResult, WhatsAppClient, WhatsAppConnector,
};
