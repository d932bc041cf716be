//! # cursorcast-collab — Live cursor presence for shared pages
//!
//! Broadcasts each visitor's cursor, coarse location and short chat lines
//! to everyone else on the page, and decides how remote cursors are drawn.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     WebSocket      ┌─────────────┐
//! │ PresenceClient │ ◄────────────────► │ RelayServer │
//! │ (per visitor)  │    Binary Proto    │ (central)   │
//! └───────┬────────┘                    └──────┬──────┘
//!         │ PresenceEvent                      │
//!         ▼                                    ▼
//! ┌────────────────┐                   ┌───────────────┐
//! │PresenceSession │                   │BroadcastGroup │
//! │ registry / log │                   │ (fan-out)     │
//! │ CursorRenderer │                   └───────────────┘
//! └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded frames)
//! - [`presence`] — Participant records and the presence registry
//! - [`message_log`] — Append-only chat log
//! - [`throttle`] — 200 ms trailing-edge cursor throttle
//! - [`decay`] — Tooltip and message-bubble state machines
//! - [`render`] — Remote cursor renderer
//! - [`session`] — Root state container
//! - [`broadcast`] — Fan-out with backpressure
//! - [`server`] — WebSocket relay
//! - [`client`] — WebSocket client / connection manager
//!
//! ## Performance Targets
//!
//! | Metric | Target |
//! |--------|--------|
//! | Cursor frame size | <50 bytes |
//! | Outbound cursor rate | ≤5 frames/s |
//! | Frame build, 100 remote cursors | <50µs |

pub mod error;
pub mod protocol;
pub mod presence;
pub mod message_log;
pub mod throttle;
pub mod decay;
pub mod render;
pub mod session;
pub mod broadcast;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use error::PresenceError;
pub use protocol::{ClientMessage, ServerMessage};
pub use presence::{
    CursorColor, PresenceRegistry, SessionId, UserPatch, UserRecord, Vec2, DEFAULT_NAME,
};
pub use message_log::{MessageLog, MessageRecord};
pub use throttle::{CursorPublisher, Throttle, CURSOR_THROTTLE_INTERVAL};
pub use decay::{
    bubble_duration, truncate_message, Bubble, BubbleState, Tooltip, TooltipState,
    TOOLTIP_TIMEOUT,
};
pub use render::{CursorRenderer, CursorView, PositionTween, TooltipView};
pub use session::PresenceSession;
pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use server::{RelayServer, ServerConfig, ServerStats};
pub use client::{ClientConfig, ConnectionState, PresenceClient, PresenceEvent};
