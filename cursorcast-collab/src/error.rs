//! Error type shared by the protocol, client and relay layers.
//!
//! None of these errors ever reach the person looking at the page: the
//! session and renderer log them and fall back to showing fewer (or no)
//! remote cursors.

use tokio_tungstenite::tungstenite;

/// Everything that can go wrong while moving presence frames around.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// A frame could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A frame could not be deserialized.
    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// An incremental update arrived without a session id.
    #[error("presence patch has no session id")]
    MissingId,

    /// The peer spoke out of turn during the hello/welcome exchange.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The transport is gone (or the local channel feeding it is).
    #[error("connection closed")]
    ConnectionClosed,

    /// A bounded wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// WebSocket-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
