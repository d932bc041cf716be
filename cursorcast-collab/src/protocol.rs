//! Binary wire protocol between presence clients and the relay.
//!
//! Every WebSocket binary frame carries exactly one bincode-encoded enum:
//! [`ClientMessage`] upstream, [`ServerMessage`] downstream.
//!
//! ```text
//! client                                   relay
//!   │ ── Hello { name } ─────────────────►  │
//!   │ ◄──────────────── Welcome { id } ──── │
//!   │ ◄──────────── PresenceSnapshot(..) ── │  (to everyone)
//!   │ ── CursorUpdate { id, pos } ───────►  │
//!   │ ◄─────────────── PresenceDelta(..) ── │  (to everyone)
//!   │ ── Chat { content } ───────────────►  │
//!   │ ◄───────────────────── Message(..) ── │  (to everyone)
//!   │                                       │
//!   │ ◄──────────── PresenceLeave { id } ── │  (someone disconnected)
//! ```
//!
//! A cursor update encodes to roughly 45 bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PresenceError;
use crate::message_log::MessageRecord;
use crate::presence::{SessionId, UserPatch, UserRecord, Vec2};

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First frame on every connection; the display name is the only
    /// connection metadata.
    Hello { name: String },

    /// Throttled cursor position.
    CursorUpdate { sender_id: SessionId, position: Vec2 },

    /// Where on the site the sender is, and where in the world.
    Status {
        location: Option<String>,
        flag: Option<String>,
    },

    /// Ephemeral chat line.
    Chat { content: String },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>, PresenceError> {
        encode_frame(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PresenceError> {
        decode_frame(bytes)
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::CursorUpdate { .. } => "cursor-update",
            ClientMessage::Status { .. } => "status",
            ClientMessage::Chat { .. } => "chat",
        }
    }
}

/// Frames sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Issues the session identity; always the first downstream frame.
    Welcome { session_id: SessionId },

    /// Full replacement of everyone's presence.
    PresenceSnapshot(Vec<UserRecord>),

    /// Partial update for one participant.
    PresenceDelta(UserPatch),

    /// Chat line from a participant.
    Message(MessageRecord),

    /// A participant disconnected.
    PresenceLeave { id: SessionId },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, PresenceError> {
        encode_frame(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PresenceError> {
        decode_frame(bytes)
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::PresenceSnapshot(_) => "presence-snapshot",
            ServerMessage::PresenceDelta(_) => "presence-delta",
            ServerMessage::Message(_) => "message",
            ServerMessage::PresenceLeave { .. } => "presence-leave",
        }
    }
}

#[inline]
fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, PresenceError> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

#[inline]
fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PresenceError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}
