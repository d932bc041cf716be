//! WebSocket presence relay.
//!
//! Architecture:
//! ```text
//! Client A ──┐                         ┌──► Client A
//!             ├── handle_connection ──► BroadcastGroup ──┼──► Client B
//! Client B ──┘        │                 └──► Client C
//!                     ▼
//!              PresenceRegistry (authoritative)
//!                     ▲
//!        snapshot ticker (every snapshot_interval)
//! ```
//!
//! The relay owns the authoritative registry. Every accepted frame is
//! applied to it and then fanned out to everyone, the sender included;
//! clients hide their own cursor themselves. Nothing outlives the process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::BroadcastGroup;
use crate::error::PresenceError;
use crate::message_log::MessageRecord;
use crate::presence::{PresenceRegistry, SessionId, UserPatch, UserRecord, DEFAULT_NAME};
use crate::protocol::{ClientMessage, ServerMessage};

type WsSender = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReceiver = SplitStream<WebSocketStream<TcpStream>>;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames a slow connection may lag before losing the oldest
    pub broadcast_capacity: usize,
    /// How often the full registry is re-broadcast
    pub snapshot_interval: Duration,
    /// How long a new connection has to send its hello
    pub hello_timeout: Duration,
    /// Chat lines longer than this are cut (in characters)
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9300".to_string(),
            broadcast_capacity: 256,
            snapshot_interval: Duration::from_secs(5),
            hello_timeout: Duration::from_secs(5),
            max_message_chars: 280,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    /// Frames that failed to decode or claimed someone else's id
    pub rejected_frames: u64,
    pub chat_messages: u64,
}

/// State shared by every connection task.
struct RelayState {
    registry: RwLock<PresenceRegistry>,
    broadcast: BroadcastGroup,
    stats: RwLock<ServerStats>,
}

impl RelayState {
    fn new(broadcast_capacity: usize) -> Self {
        Self {
            registry: RwLock::new(PresenceRegistry::new()),
            broadcast: BroadcastGroup::new(broadcast_capacity),
            stats: RwLock::new(ServerStats::default()),
        }
    }

    /// Fan out the registry as it stands. The read guard is held until the
    /// frame is queued, so no delta applied later can be overtaken by it.
    async fn broadcast_snapshot(&self) {
        let registry = self.registry.read().await;
        let records: Vec<UserRecord> = registry.list().cloned().collect();
        if let Err(e) = self.broadcast.broadcast(&ServerMessage::PresenceSnapshot(records)) {
            log::error!("Failed to encode presence snapshot: {e}");
        }
    }

    /// Apply a patch to the registry and fan it out as a delta, both under
    /// the write guard so frame order matches registry order.
    async fn apply_and_relay(&self, patch: UserPatch) {
        let mut registry = self.registry.write().await;
        if let Err(e) = registry.apply_incremental(patch.clone()) {
            log::warn!("Dropping presence patch: {e}");
            return;
        }
        if let Err(e) = self.broadcast.broadcast(&ServerMessage::PresenceDelta(patch)) {
            log::error!("Failed to encode presence delta: {e}");
        }
    }

    /// Drop a participant and announce it under the same write guard.
    async fn remove_and_announce(&self, id: &SessionId) {
        let mut registry = self.registry.write().await;
        registry.remove(id);
        if let Err(e) = self.broadcast.broadcast(&ServerMessage::PresenceLeave { id: id.clone() }) {
            log::error!("Failed to encode leave: {e}");
        }
    }

    async fn reject_frame(&self) {
        self.stats.write().await.rejected_frames += 1;
    }
}

/// The presence relay.
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<RelayState>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(RelayState::new(config.broadcast_capacity));
        Self { config, state }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind to the configured address and serve forever.
    pub async fn run(&self) -> Result<(), PresenceError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Presence relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), PresenceError> {
        let period = self.config.snapshot_interval.max(Duration::from_millis(1));
        let mut snapshots = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::warn!("Failed to accept connection: {e}");
                            continue;
                        }
                    };
                    log::debug!("New TCP connection from {addr}");

                    let state = self.state.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state, config).await {
                            log::error!("Connection error from {addr}: {e}");
                        }
                    });
                }

                _ = snapshots.tick() => {
                    if self.state.broadcast.receiver_count() > 0 {
                        self.state.broadcast_snapshot().await;
                    }
                }
            }
        }
    }

    pub async fn stats(&self) -> ServerStats {
        self.state.stats.read().await.clone()
    }

    /// Everyone currently connected.
    pub async fn online(&self) -> Vec<UserRecord> {
        self.state.registry.read().await.list().cloned().collect()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RelayState>,
    config: ServerConfig,
) -> Result<(), PresenceError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_sender, ws_receiver) = ws_stream.split();
    log::info!("WebSocket connection established from {addr}");

    {
        let mut s = state.stats.write().await;
        s.total_connections += 1;
        s.active_connections += 1;
    }

    let result = relay_session(ws_sender, ws_receiver, &state, &config).await;

    state.stats.write().await.active_connections -= 1;
    result
}

async fn relay_session(
    mut ws_sender: WsSender,
    mut ws_receiver: WsReceiver,
    state: &RelayState,
    config: &ServerConfig,
) -> Result<(), PresenceError> {
    let name = tokio::time::timeout(config.hello_timeout, read_hello(&mut ws_receiver))
        .await
        .map_err(|_| PresenceError::Timeout("hello"))??;

    let session_id = SessionId::generate();
    let welcome = ServerMessage::Welcome {
        session_id: session_id.clone(),
    };
    ws_sender.send(Message::Binary(welcome.encode()?.into())).await?;

    // Subscribe before joining so the join snapshot reaches us too.
    let mut broadcast_rx = state.broadcast.subscribe();
    let record = UserRecord::new(session_id.clone(), name);
    log::info!("{} ({}) joined", record.name, session_id.short());
    state.apply_and_relay(UserPatch::from(record)).await;
    state.broadcast_snapshot().await;

    let outcome = loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        {
                            let mut s = state.stats.write().await;
                            s.total_frames += 1;
                            s.total_bytes += data.len() as u64;
                        }
                        match ClientMessage::decode(&data) {
                            Ok(frame) => handle_frame(frame, &session_id, state, config).await,
                            Err(e) => {
                                let short = session_id.short();
                                log::warn!("Failed to decode frame from {short}: {e}");
                                state.reject_frame().await;
                            }
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Connection closed by {}", session_id.short());
                        break Ok(());
                    }

                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                            break Err(e.into());
                        }
                    }

                    Some(Err(e)) => {
                        log::warn!("WebSocket error from {}: {e}", session_id.short());
                        break Ok(());
                    }

                    Some(Ok(_)) => {}
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(data) => {
                        let frame = Message::Binary(data.to_vec().into());
                        if let Err(e) = ws_sender.send(frame).await {
                            break Err(e.into());
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("{} lagged by {n} frames", session_id.short());
                        state.broadcast.record_dropped(n);
                    }
                    Err(RecvError::Closed) => break Ok(()),
                }
            }
        }
    };

    state.remove_and_announce(&session_id).await;
    state.broadcast_snapshot().await;
    log::info!("{} left", session_id.short());

    outcome
}

/// Wait for the opening `Hello` and return the display name.
async fn read_hello(ws_receiver: &mut WsReceiver) -> Result<String, PresenceError> {
    while let Some(msg) = ws_receiver.next().await {
        match msg? {
            Message::Binary(data) => {
                return match ClientMessage::decode(&data)? {
                    ClientMessage::Hello { name } => {
                        let name = name.trim();
                        Ok(if name.is_empty() { DEFAULT_NAME } else { name }.to_string())
                    }
                    other => Err(PresenceError::Handshake(format!(
                        "expected hello, got {}",
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

async fn handle_frame(
    frame: ClientMessage,
    session_id: &SessionId,
    state: &RelayState,
    config: &ServerConfig,
) {
    match frame {
        ClientMessage::Hello { .. } => {
            log::debug!("Ignoring repeated hello from {}", session_id.short());
        }

        ClientMessage::CursorUpdate { sender_id, position } => {
            if &sender_id != session_id {
                log::warn!(
                    "{} sent a cursor update for {}",
                    session_id.short(),
                    sender_id.short()
                );
                state.reject_frame().await;
                return;
            }
            log::trace!("cursor {} -> ({}, {})", session_id.short(), position.x, position.y);
            state
                .apply_and_relay(UserPatch::for_user(sender_id).with_position(position))
                .await;
        }

        ClientMessage::Status { location, flag } => {
            if location.is_none() && flag.is_none() {
                return;
            }
            let patch = UserPatch {
                location,
                flag,
                ..UserPatch::for_user(session_id.clone())
            };
            state.apply_and_relay(patch).await;
        }

        ClientMessage::Chat { content } => {
            let content = cap_chars(content.trim(), config.max_message_chars);
            if content.is_empty() {
                return;
            }
            let sender_name = state
                .registry
                .read()
                .await
                .get(session_id)
                .map(|record| record.name.clone())
                .unwrap_or_else(|| DEFAULT_NAME.to_string());
            log::debug!("chat from {sender_name}: {} chars", content.chars().count());

            let record = MessageRecord::new(session_id.clone(), sender_name, content);
            match state.broadcast.broadcast(&ServerMessage::Message(record)) {
                Ok(_) => state.stats.write().await.chat_messages += 1,
                Err(e) => log::error!("Failed to encode chat message: {e}"),
            }
        }
    }
}

fn cap_chars(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content.to_string(),
    }
}
