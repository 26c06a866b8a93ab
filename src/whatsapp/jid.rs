//! WhatsApp addressing (JIDs)
//!
//! A JID is `user@server` with an optional `:device` suffix on the user
//! part. Group chats live on the `g.us` server; one-to-one chats use `lid`.
//! Canonical conversation ids are the bare user part, so both directions of
//! the bridge go through the helpers here.

use crate::bridge::model::ConversationType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server suffix for group chats.
pub const GROUP_SERVER: &str = "g.us";

/// Server suffix for one-to-one chats.
pub const USER_SERVER: &str = "lid";

/// A full WhatsApp address, e.g. `123456789@g.us` or `555123:4@lid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid(pub String);

impl Jid {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The bare identifier: everything before the device suffix and server.
    ///
    /// `"555123:4@lid"` and `"555123@lid"` both yield `"555123"`.
    pub fn user(&self) -> &str {
        let end = self
            .0
            .find([':', '@'])
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// The server part, if any (`g.us`, `lid`, ...).
    pub fn server(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, server)| server)
    }

    /// Whether this address denotes a group chat.
    pub fn is_group(&self) -> bool {
        self.server() == Some(GROUP_SERVER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip the device suffix and server from an account address.
///
/// The protocol client reports the own account as e.g. `"204987:12@lid"`;
/// the backend-facing account id is the leading numeric part.
pub fn account_id(raw: &str) -> &str {
    let end = raw.find([':', '@']).unwrap_or(raw.len());
    &raw[..end]
}

/// Build the mention address for a bare user id.
pub fn mention(id: &str) -> Jid {
    Jid(format!("{id}@{USER_SERVER}"))
}

/// Resolve a canonical conversation id to a sendable chat address.
///
/// Group ids get the group server suffix. Ids carrying the legacy leading
/// minus sign (inherited from the canonical schema) are treated as groups
/// regardless of the declared type, with the sign stripped. Everything else
/// is a one-to-one chat on the user server.
pub fn format_chat_id(id: &str, kind: ConversationType) -> Jid {
    let legacy_group = id.starts_with('-');
    if kind != ConversationType::Private || legacy_group {
        let bare = if legacy_group { &id[1..] } else { id };
        Jid(format!("{bare}@{GROUP_SERVER}"))
    } else {
        Jid(format!("{id}@{USER_SERVER}"))
    }
}
