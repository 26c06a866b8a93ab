//! Mock WhatsApp Client for Testing
//!
//! In-memory implementation of the protocol client contract. Records every
//! outbound command for assertions and replays scripted events through the
//! connector's event stream. Also used by the `run` command as a loopback
//! client when no real protocol client is linked in.

use super::jid::Jid;
use super::traits::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock WhatsApp client.
#[derive(Clone)]
pub struct MockWhatsAppClient {
    state: Arc<Mutex<MockState>>,
    account: AccountInfo,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SentCommand>,
    read_receipts: Vec<MessageKey>,
    presence_updates: u32,
    group_subjects: HashMap<String, String>,
    next_message_id: u64,
    fail_read_receipts: bool,
}

/// Outbound command recorded by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum SentCommand {
    Text {
        chat: Jid,
        text: String,
        mentions: Vec<Jid>,
        message_id: String,
    },
    Image {
        chat: Jid,
        media: MediaReference,
        caption: Option<String>,
        mentions: Vec<Jid>,
        message_id: String,
    },
    Audio {
        chat: Jid,
        media: MediaReference,
        voice_note: bool,
        message_id: String,
    },
}

impl MockWhatsAppClient {
    pub fn new(lid: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            account: AccountInfo {
                lid: lid.into(),
                name: name.map(str::to_string),
            },
        }
    }

    /// Register a group subject returned by `group_subject`.
    pub fn set_group_subject(&self, chat: &Jid, subject: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .group_subjects
            .insert(chat.as_str().to_string(), subject.to_string());
    }

    /// Make `read_messages` fail, for exercising best-effort paths.
    pub fn fail_read_receipts(&self, fail: bool) {
        self.state.lock().unwrap().fail_read_receipts = fail;
    }

    /// Commands sent so far, for assertions.
    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Message keys acknowledged as read.
    pub fn read_receipts(&self) -> Vec<MessageKey> {
        self.state.lock().unwrap().read_receipts.clone()
    }

    /// Number of presence-available signals sent.
    pub fn presence_updates(&self) -> u32 {
        self.state.lock().unwrap().presence_updates
    }

    /// Clear all recorded state.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState::default();
    }
}

#[async_trait::async_trait]
impl WhatsAppClient for MockWhatsAppClient {
    async fn account(&self) -> WaResult<AccountInfo> {
        Ok(self.account.clone())
    }

    fn generate_message_id(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        format!("3EB0MOCK{:08X}", state.next_message_id)
    }

    async fn send_text(
        &self,
        chat: &Jid,
        text: &str,
        mentions: &[Jid],
        message_id: &str,
    ) -> WaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(SentCommand::Text {
            chat: chat.clone(),
            text: text.to_string(),
            mentions: mentions.to_vec(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn send_image(
        &self,
        chat: &Jid,
        media: &MediaReference,
        caption: Option<&str>,
        mentions: &[Jid],
        message_id: &str,
    ) -> WaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(SentCommand::Image {
            chat: chat.clone(),
            media: media.clone(),
            caption: caption.map(str::to_string),
            mentions: mentions.to_vec(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn send_audio(
        &self,
        chat: &Jid,
        media: &MediaReference,
        voice_note: bool,
        message_id: &str,
    ) -> WaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(SentCommand::Audio {
            chat: chat.clone(),
            media: media.clone(),
            voice_note,
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn group_subject(&self, chat: &Jid) -> WaResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.group_subjects.get(chat.as_str()).cloned())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> WaResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_read_receipts {
            return Err(ProtocolError::Network("read receipt rejected".into()));
        }
        state.read_receipts.extend_from_slice(keys);
        Ok(())
    }

    async fn send_presence_available(&self) -> WaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.presence_updates += 1;
        Ok(())
    }
}

/// Connector yielding `MockWhatsAppClient` instances.
///
/// Keeps a counter of connect attempts and a budget of injected failures so
/// reconnect behavior can be asserted. Events pushed via `push_event` reach
/// the receiver of the most recent successful connect.
pub struct MockConnector {
    client: MockWhatsAppClient,
    attempts: Arc<AtomicU32>,
    failures_left: Arc<AtomicU32>,
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<ProtocolEvent>>>>,
}

impl MockConnector {
    pub fn new(client: MockWhatsAppClient) -> Self {
        Self {
            client,
            attempts: Arc::new(AtomicU32::new(0)),
            failures_left: Arc::new(AtomicU32::new(0)),
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail the next `n` connect attempts with a network error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Deliver an event through the current connection's stream.
    pub fn push_event(&self, event: ProtocolEvent) {
        let sender = self.sender.lock().unwrap();
        if let Some(tx) = sender.as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait::async_trait]
impl WhatsAppConnector for MockConnector {
    type Client = MockWhatsAppClient;

    async fn connect(
        &self,
    ) -> WaResult<(Self::Client, mpsc::UnboundedReceiver<ProtocolEvent>)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ProtocolError::Network("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok((self.client.clone(), rx))
    }
}
