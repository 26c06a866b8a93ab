//! Connection lifecycle: protocol reconnects, backend socket, heartbeat.
//!
//! Two independent connections are managed here. The protocol connection
//! reconnects on any recoverable close; an explicit logout is terminal. The
//! backend socket is established once per process; after a close the run
//! loop returns and the process exits, leaving recovery to the supervisor.

use super::model::{BackendFrame, OutboundFrame, User, PLATFORM};
use super::session::{heartbeat_frame, BridgeSession, ClientHandle, FrameSender};
use super::BridgeError;
use crate::storage::auth::AuthState;
use crate::whatsapp::retry::{retry_with_backoff, BackoffPolicy};
use crate::whatsapp::traits::{
    DisconnectReason, ProtocolError, ProtocolEvent, WhatsAppClient, WhatsAppConnector,
};
use crate::whatsapp::jid;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Protocol connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolConnection {
    Disconnected,
    Connecting,
    Open,
    Closed,
    /// Terminal; requires operator re-pairing.
    LoggedOut,
}

/// Backend socket states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSocket {
    Idle,
    Connecting,
    Open,
    Closed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Heartbeat interval on the backend socket.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Owns both connections for the process lifetime.
pub struct Lifecycle {
    server_url: String,
    config: Option<serde_json::Value>,
    policy: BackoffPolicy,
    heartbeat_period: Duration,
}

impl Lifecycle {
    pub fn new(server_url: impl Into<String>, config: Option<serde_json::Value>) -> Self {
        Self {
            server_url: server_url.into(),
            config,
            policy: BackoffPolicy::default(),
            heartbeat_period: HEARTBEAT_PERIOD,
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Run the bridge until the backend socket closes (normal shutdown,
    /// `Ok`) or a terminal failure occurs (`Err`).
    pub async fn run<N: WhatsAppConnector>(
        &self,
        connector: &N,
        auth: Option<&AuthState>,
    ) -> Result<(), BridgeError> {
        let (client, mut events) = self.connect_protocol(connector).await?;

        let account = client.account().await?;
        let account_id = jid::account_id(&account.lid).to_string();
        // A bare authority URL ("ws://host:port") has an empty path; the
        // websocket handshake request line needs at least "/".
        let needs_path = self
            .server_url
            .splitn(2, "://")
            .nth(1)
            .is_some_and(|rest| !rest.contains('/'));
        let url = format!(
            "{}{}?platform={PLATFORM}&accountId={account_id}",
            self.server_url,
            if needs_path { "/" } else { "" }
        );

        let ws = self.connect_backend(&url).await?;
        let (sink, mut reader) = ws.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(rx, sink));

        let handle = ClientHandle::new(client);
        let session = BridgeSession::new(handle.clone(), tx.clone(), self.config.clone());
        session.init().await?;

        let heartbeat = spawn_heartbeat(tx.clone(), session.user_slot(), self.heartbeat_period);

        let result = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ProtocolEvent::MessageReceived(native)) => {
                        session.on_inbound_event(native).await;
                    }
                    Some(ProtocolEvent::CredsUpdated) => {
                        debug!("credential update from protocol client");
                        if let Some(auth) = auth {
                            if let Err(e) = auth.save_creds().await {
                                break Err(e.into());
                            }
                        }
                    }
                    Some(ProtocolEvent::QrCode(code)) => {
                        info!(%code, "pairing QR received; link the account from the app");
                    }
                    Some(ProtocolEvent::ConnectionOpened) => {
                        debug!(state = ?ProtocolConnection::Open, "protocol connection open");
                    }
                    Some(ProtocolEvent::ConnectionClosed { reason }) => {
                        match self.handle_protocol_close(connector, reason).await {
                            Ok((client, new_events)) => {
                                handle.replace(client);
                                events = new_events;
                            }
                            Err(e) => break Err(e),
                        }
                    }
                    // Stream gone without a close event: same as a lost connection.
                    None => {
                        match self
                            .handle_protocol_close(connector, DisconnectReason::ConnectionLost)
                            .await
                        {
                            Ok((client, new_events)) => {
                                handle.replace(client);
                                events = new_events;
                            }
                            Err(e) => break Err(e),
                        }
                    }
                },
                frame = reader.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<BackendFrame>(&text) {
                            Ok(frame) => session.on_backend_frame(frame).await,
                            Err(e) => error!(error = %e, "undecodable backend frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(close))) => {
                        log_socket_close(close);
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "backend socket error");
                        break Ok(());
                    }
                    None => {
                        warn!(state = ?BackendSocket::Closed, "backend socket closed");
                        break Ok(());
                    }
                },
            }
        };

        // Teardown: stop the heartbeat, signal presence one last time, let
        // the writer drain whatever is queued.
        heartbeat.abort();
        let client = handle.current();
        if let Err(e) = client.send_presence_available().await {
            debug!(error = %e, "final presence update failed");
        }
        drop(session);
        drop(tx);
        let _ = writer.await;

        result
    }

    /// Dial the chat network through the connector, with bounded backoff.
    pub async fn connect_protocol<N: WhatsAppConnector>(
        &self,
        connector: &N,
    ) -> Result<(N::Client, mpsc::UnboundedReceiver<ProtocolEvent>), BridgeError> {
        info!(state = ?ProtocolConnection::Connecting, "connecting to chat network");
        let connected = retry_with_backoff(
            self.policy,
            || connector.connect(),
            ProtocolError::is_transient,
        )
        .await
        .map_err(BridgeError::Connect)?;
        info!(state = ?ProtocolConnection::Open, "chat network connected");
        Ok(connected)
    }

    async fn handle_protocol_close<N: WhatsAppConnector>(
        &self,
        connector: &N,
        reason: DisconnectReason,
    ) -> Result<(N::Client, mpsc::UnboundedReceiver<ProtocolEvent>), BridgeError> {
        if !reason.is_recoverable() {
            error!(
                state = ?ProtocolConnection::LoggedOut,
                "connection closed: logged out, re-pairing required"
            );
            return Err(BridgeError::LoggedOut);
        }
        warn!(
            ?reason,
            state = ?ProtocolConnection::Closed,
            "protocol connection closed, reconnecting"
        );
        self.connect_protocol(connector).await
    }

    async fn connect_backend(&self, url: &str) -> Result<WsStream, BridgeError> {
        info!(state = ?BackendSocket::Connecting, "connecting to backend");
        let ws = retry_with_backoff(
            self.policy,
            || async move { connect_async(url).await.map(|(ws, _response)| ws) },
            is_ws_error_retryable,
        )
        .await
        .map_err(BridgeError::Backend)?;
        info!(state = ?BackendSocket::Open, "backend socket open");
        Ok(ws)
    }
}

/// Connection refused means the backend is not up yet; worth waiting for.
fn is_ws_error_retryable(err: &WsError) -> bool {
    matches!(err, WsError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused)
}

fn log_socket_close(close: Option<CloseFrame<'_>>) {
    match close {
        Some(frame) if u16::from(frame.code) == 1005 => warn!("backend disconnected"),
        Some(frame) if u16::from(frame.code) == 1006 => warn!("backend terminated"),
        Some(frame) => warn!(code = u16::from(frame.code), "backend closed the socket"),
        None => warn!("backend closed the socket"),
    }
}

/// Drain the frame queue into the socket. A single writer task keeps
/// concurrent senders from interleaving partial writes.
async fn write_frames(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sink: futures::stream::SplitSink<WsStream, WsMessage>,
) {
    while let Some(frame) = rx.recv().await {
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if let Err(e) = sink.send(WsMessage::Text(json)).await {
                    error!(error = %e, "backend socket write failed");
                    break;
                }
            }
            Err(e) => error!(error = %e, "failed to encode outbound frame"),
        }
    }
}

/// Periodic heartbeat toward the backend. Runs from before the handshake;
/// the frame identity follows whatever the shared user slot holds.
pub fn spawn_heartbeat(
    tx: FrameSender,
    user: Arc<RwLock<Option<User>>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick fires immediately; the heartbeat starts one period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let frame = heartbeat_frame(&user.read().unwrap());
            if tx.send(frame).is_err() {
                break;
            }
        }
    })
}
