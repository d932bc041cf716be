//! WebSocket presence client: the connection manager for one session.
//!
//! Provides:
//! - One connection per session, opened with the display name and held
//!   until [`PresenceClient::disconnect`] or drop
//! - An ordered stream of [`PresenceEvent`]s for the session container
//! - Throttled cursor publishing, status and chat sends
//!
//! There is no reconnect: a lost connection surfaces as
//! [`PresenceEvent::Disconnected`] and the caller decides what to do.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::PresenceError;
use crate::message_log::MessageRecord;
use crate::presence::{SessionId, UserPatch, UserRecord, DEFAULT_NAME};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::throttle::{CursorPublisher, CURSOR_THROTTLE_INTERVAL};

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoint, e.g. `ws://127.0.0.1:9300`
    pub url: String,
    /// Display name sent in the hello
    pub name: String,
    /// Outbound cursor cadence
    pub throttle_interval: Duration,
    /// Buffer for inbound events and outbound frames
    pub event_capacity: usize,
    /// Upper bound for connect + hello/welcome
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9300".to_string(),
            name: DEFAULT_NAME.to_string(),
            throttle_interval: CURSOR_THROTTLE_INTERVAL,
            event_capacity: 256,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Inbound events, in per-connection arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// Full replacement of the registry
    Snapshot(Vec<UserRecord>),
    /// Partial update for one participant
    Delta(UserPatch),
    /// Chat line
    Message(MessageRecord),
    /// A participant disconnected
    Left(SessionId),
    /// Our own connection is gone
    Disconnected,
}

impl PresenceEvent {
    /// Map a downstream frame to an event. `Welcome` is handshake-only.
    fn from_frame(frame: ServerMessage) -> Option<Self> {
        match frame {
            ServerMessage::Welcome { .. } => None,
            ServerMessage::PresenceSnapshot(records) => Some(PresenceEvent::Snapshot(records)),
            ServerMessage::PresenceDelta(patch) => Some(PresenceEvent::Delta(patch)),
            ServerMessage::Message(record) => Some(PresenceEvent::Message(record)),
            ServerMessage::PresenceLeave { id } => Some(PresenceEvent::Left(id)),
        }
    }
}

/// Handle to a live presence connection.
///
/// Only [`PresenceClient::connect`] creates one, and only after the relay
/// has issued a session id, so nothing can publish before the connection
/// is up. Dropping the handle tears the connection down.
pub struct PresenceClient {
    session_id: SessionId,
    name: String,
    outgoing: mpsc::Sender<Message>,
    publisher: CursorPublisher,
    state: Arc<RwLock<ConnectionState>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PresenceClient {
    /// Connect, say hello, and wait for the session id.
    ///
    /// Returns the handle plus the receiver for inbound events.
    pub async fn connect(
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<PresenceEvent>), PresenceError> {
        log::debug!("Connecting to {}", config.url);
        let connect = tokio_tungstenite::connect_async(config.url.as_str());
        let (ws_stream, _) = tokio::time::timeout(config.handshake_timeout, connect)
            .await
            .map_err(|_| PresenceError::Timeout("connect"))??;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let hello = ClientMessage::Hello {
            name: config.name.clone(),
        };
        ws_writer.send(Message::Binary(hello.encode()?.into())).await?;

        let welcome = await_welcome(&mut ws_reader);
        let session_id = tokio::time::timeout(config.handshake_timeout, welcome)
            .await
            .map_err(|_| PresenceError::Timeout("welcome"))??;
        log::info!("Connected to {} as {} ({})", config.url, config.name, session_id.short());

        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let capacity = config.event_capacity.max(1);
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        // Writer task: forward outgoing frames; a Close frame is the last one.
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_writer.send(msg).await {
                    log::debug!("Writer stopping: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Reader task: decode frames into events, in arrival order.
        let reader_state = state.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match ServerMessage::decode(&data) {
                        Ok(frame) => {
                            log::trace!("received {}", frame.kind());
                            let Some(event) = PresenceEvent::from_frame(frame) else {
                                continue;
                            };
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Failed to decode relay frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::warn!("Connection error: {e}");
                        break;
                    }
                    Ok(_) => {}
                }
            }

            *reader_state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(PresenceEvent::Disconnected).await;
            log::info!("Disconnected from relay");
        });

        let publisher =
            CursorPublisher::spawn(session_id.clone(), config.throttle_interval, out_tx.clone());

        let client = Self {
            session_id,
            name: config.name.clone(),
            outgoing: out_tx,
            publisher,
            state,
            reader,
            writer,
        };
        Ok((client, event_rx))
    }

    /// Queue a cursor position. Coalesced to one send per throttle window.
    pub fn publish_cursor(&self, x: f32, y: f32) {
        self.publisher.publish(x, y);
    }

    /// Update where we are. `None` leaves a field as the relay has it.
    pub async fn set_status(
        &self,
        location: Option<String>,
        flag: Option<String>,
    ) -> Result<(), PresenceError> {
        self.send(&ClientMessage::Status { location, flag }).await
    }

    /// Send a chat line. Empty content is not sent.
    pub async fn send_chat(&self, content: impl Into<String>) -> Result<(), PresenceError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Ok(());
        }
        self.send(&ClientMessage::Chat { content }).await
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), PresenceError> {
        let encoded = msg.encode()?;
        self.outgoing
            .send(Message::Binary(encoded.into()))
            .await
            .map_err(|_| PresenceError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the connection and wait (briefly) for the close frame to go out.
    pub async fn disconnect(mut self) {
        if self.outgoing.send(Message::Close(None)).await.is_ok() {
            let _ = tokio::time::timeout(Duration::from_secs(1), &mut self.writer).await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
        log::info!("Closed connection {}", self.session_id.short());
    }
}

impl Drop for PresenceClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Read frames until the relay's `Welcome`.
async fn await_welcome(ws_reader: &mut WsReader) -> Result<SessionId, PresenceError> {
    while let Some(msg) = ws_reader.next().await {
        match msg? {
            Message::Binary(data) => {
                return match ServerMessage::decode(&data)? {
                    ServerMessage::Welcome { session_id } if !session_id.is_empty() => {
                        Ok(session_id)
                    }
                    other => Err(PresenceError::Handshake(format!(
                        "expected welcome, got {}",
                        other.kind()
                    ))),
                };
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(PresenceError::ConnectionClosed)
}
