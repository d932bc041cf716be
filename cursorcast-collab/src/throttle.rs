//! Outbound cursor throttle.
//!
//! Native pointer events can fire hundreds of times per second; the relay
//! sees at most one `CursorUpdate` per [`CURSOR_THROTTLE_INTERVAL`].
//!
//! ```text
//! publish(x, y) ──► watch channel ──► CursorPublisher task
//!                                        │  Throttle::offer()
//!                                        │  sleep_until(deadline)
//!                                        │  Throttle::poll()
//!                                        ▼
//!                               ClientMessage::CursorUpdate ──► writer task
//! ```
//!
//! The first call in an idle period opens a window; calls inside the
//! window overwrite the pending value; when the window closes the latest
//! value goes out and the throttle is idle again. Nothing is queued and
//! nothing is acknowledged.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use crate::presence::{SessionId, Vec2};
use crate::protocol::ClientMessage;

/// Fixed cadence for outbound cursor updates.
pub const CURSOR_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);

/// Clock-injected trailing-edge coalescer.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    interval: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            deadline: None,
        }
    }

    /// Record the latest value. Opens a window if none is open.
    pub fn offer(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    /// Emit the coalesced value if the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// When the open window closes, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Fire-and-forget cursor publisher backed by a [`Throttle`].
///
/// Dropping it stops the task.
#[derive(Debug)]
pub struct CursorPublisher {
    latest: watch::Sender<Option<Vec2>>,
    task: JoinHandle<()>,
}

impl CursorPublisher {
    /// Spawn the publishing task. Frames go to `outgoing`, which the
    /// connection's writer task drains.
    pub fn spawn(
        sender_id: SessionId,
        interval: Duration,
        outgoing: mpsc::Sender<Message>,
    ) -> Self {
        let (latest, rx) = watch::channel(None);
        let task = tokio::spawn(run_publisher(sender_id, Throttle::new(interval), rx, outgoing));
        Self { latest, task }
    }

    /// Non-blocking; the value may be coalesced with later calls.
    pub fn publish(&self, x: f32, y: f32) {
        // Only fails once the task is gone, at which point there is nobody to tell.
        let _ = self.latest.send(Some(Vec2::new(x, y)));
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CursorPublisher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_publisher(
    sender_id: SessionId,
    mut throttle: Throttle<Vec2>,
    mut latest: watch::Receiver<Option<Vec2>>,
    outgoing: mpsc::Sender<Message>,
) {
    loop {
        let deadline = throttle.deadline();
        tokio::select! {
            changed = latest.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *latest.borrow_and_update();
                if let Some(position) = value {
                    throttle.offer(position, Instant::now());
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                let Some(position) = throttle.poll(Instant::now()) else {
                    continue;
                };
                let frame = ClientMessage::CursorUpdate {
                    sender_id: sender_id.clone(),
                    position,
                };
                match frame.encode() {
                    Ok(bytes) => {
                        if outgoing.send(Message::Binary(bytes.into())).await.is_err() {
                            log::debug!("cursor publisher stopping: connection writer gone");
                            break;
                        }
                        log::trace!("cursor update sent ({}, {})", position.x, position.y);
                    }
                    Err(e) => log::warn!("failed to encode cursor update: {e}"),
                }
            }
        }
    }
}
