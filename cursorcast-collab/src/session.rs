//! Root state container for one presence session.
//!
//! Owns everything the page knows about other participants: the registry,
//! the message log and the cursor renderer. The connection task feeds it
//! [`PresenceEvent`]s in arrival order; the UI asks it for a frame.
//! Dropping the session drops every timer with it.

use tokio::time::Instant;

use crate::client::{ConnectionState, PresenceEvent};
use crate::message_log::MessageLog;
use crate::presence::{PresenceRegistry, SessionId};
use crate::render::{CursorRenderer, CursorView};

#[derive(Debug)]
pub struct PresenceSession {
    local_id: Option<SessionId>,
    registry: PresenceRegistry,
    log: MessageLog,
    renderer: CursorRenderer,
    state: ConnectionState,
}

impl Default for PresenceSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PresenceSession {
    /// `local_id` is `None` until the relay has issued one.
    pub fn new(local_id: Option<SessionId>) -> Self {
        let state = if local_id.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        };
        Self {
            renderer: CursorRenderer::new(local_id.clone()),
            local_id,
            registry: PresenceRegistry::new(),
            log: MessageLog::new(),
            state,
        }
    }

    /// The relay issued our session id.
    pub fn set_local_id(&mut self, id: SessionId) {
        self.renderer.set_local_id(id.clone());
        self.local_id = Some(id);
        self.state = ConnectionState::Connected;
    }

    /// Apply one inbound event. Never fails: bad input is logged and dropped.
    pub fn apply(&mut self, event: PresenceEvent, now: Instant) {
        match event {
            PresenceEvent::Snapshot(records) => {
                log::debug!("presence snapshot: {} participants", records.len());
                self.registry.apply_snapshot(records);
            }
            PresenceEvent::Delta(patch) => {
                if let Err(e) = self.registry.apply_incremental(patch) {
                    log::warn!("Ignoring presence delta: {e}");
                    return;
                }
            }
            PresenceEvent::Message(record) => {
                log::debug!("message from {}", record.sender_name);
                self.log.append(record);
            }
            PresenceEvent::Left(id) => {
                self.registry.remove(&id);
            }
            PresenceEvent::Disconnected => {
                // No connection, no remote cursors.
                self.state = ConnectionState::Disconnected;
                self.registry.apply_snapshot(Vec::new());
            }
        }
        self.renderer.reconcile(&self.registry, now);
        self.renderer.sync_messages(&self.log, now);
    }

    /// Views for every remote cursor at `now`.
    pub fn frame(&mut self, now: Instant) -> Vec<CursorView> {
        self.renderer.frame(&self.registry, now)
    }

    pub fn pointer_enter(&mut self, id: &SessionId, now: Instant) {
        self.renderer.pointer_enter(id, now);
    }

    pub fn pointer_leave(&mut self, id: &SessionId) {
        self.renderer.pointer_leave(id);
    }

    /// Expire due timers. Returns `true` if the picture changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.renderer.tick(now)
    }

    /// When the UI should wake up next, absent new events.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.renderer.next_deadline(now)
    }

    /// Throw away all per-cursor UI state and rebuild it, as after a
    /// remount. Only the newest logged message may raise a bubble again.
    pub fn remount(&mut self, now: Instant) {
        self.renderer = CursorRenderer::resume(self.local_id.clone(), &self.log);
        self.renderer.reconcile(&self.registry, now);
        self.renderer.sync_messages(&self.log, now);
    }

    pub fn local_id(&self) -> Option<&SessionId> {
        self.local_id.as_ref()
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn renderer(&self) -> &CursorRenderer {
        &self.renderer
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_log::MessageRecord;
    use crate::presence::{UserPatch, UserRecord, Vec2};
    use std::time::Duration;

    fn id(raw: &str) -> SessionId {
        SessionId::from(raw)
    }

    fn joined(now: Instant) -> PresenceSession {
        let mut session = PresenceSession::new(Some(id("me")));
        session.apply(
            PresenceEvent::Snapshot(vec![
                UserRecord::new(id("me"), "Me"),
                UserRecord::new(id("ann"), "Ann"),
                UserRecord::new(id("bo"), "Bo"),
            ]),
            now,
        );
        session
    }

    #[test]
    fn test_snapshot_populates_frame_without_self() {
        let now = Instant::now();
        let mut session = joined(now);

        assert_eq!(session.registry().len(), 3);
        let mut names: Vec<String> = session.frame(now).into_iter().map(|v| v.name).collect();
        names.sort();
        assert_eq!(names, vec!["Ann", "Bo"]);
        assert!(session.is_connected());
    }

    #[test]
    fn test_delta_merges_and_shows_tooltip() {
        let now = Instant::now();
        let mut session = joined(now);
        // Ann joined without a position; her first move counts.
        let patch = UserPatch::for_user(id("ann")).with_position(Vec2::new(100.0, 200.0));
        session.apply(PresenceEvent::Delta(patch), now);

        let ann = session.registry().get(&id("ann")).unwrap();
        assert_eq!(ann.name, "Ann");
        assert_eq!(ann.position, Some(Vec2::new(100.0, 200.0)));
        assert!(session.renderer().is_tooltip_visible(&id("ann")));

        let views = session.frame(now + Duration::from_millis(100));
        let view = views.iter().find(|v| v.id == id("ann")).unwrap();
        assert!(view.tooltip.is_some());
        assert!(view.position.x > 0.0 && view.position.x < 100.0);
    }

    #[test]
    fn test_malformed_delta_is_ignored() {
        let now = Instant::now();
        let mut session = joined(now);
        session.apply(PresenceEvent::Delta(UserPatch::default().with_name("nobody")), now);
        assert_eq!(session.registry().len(), 3);
    }

    #[test]
    fn test_leave_removes_cursor() {
        let now = Instant::now();
        let mut session = joined(now);
        session.apply(PresenceEvent::Left(id("bo")), now);

        assert!(!session.registry().contains(&id("bo")));
        assert_eq!(session.frame(now).len(), 1);
        assert_eq!(session.renderer().cursor_count(), 1);
    }

    #[test]
    fn test_disconnect_clears_remote_cursors() {
        let now = Instant::now();
        let mut session = joined(now);
        session.apply(PresenceEvent::Disconnected, now);

        assert!(session.frame(now).is_empty());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(session.next_deadline(now), None);
    }

    #[test]
    fn test_message_raises_bubble() {
        let now = Instant::now();
        let mut session = joined(now);
        session.apply(
            PresenceEvent::Message(MessageRecord::new(id("bo"), "Bo", "hello")),
            now,
        );

        assert_eq!(session.messages().len(), 1);
        let views = session.frame(now);
        let bo = views.iter().find(|v| v.id == id("bo")).unwrap();
        assert_eq!(bo.tooltip.as_ref().unwrap().message.as_deref(), Some("hello"));
        assert_eq!(session.next_deadline(now), Some(now + Duration::from_millis(1000)));
    }

    #[test]
    fn test_remount_rebuilds_from_tail() {
        let now = Instant::now();
        let mut session = joined(now);
        let first = MessageRecord::new(id("ann"), "Ann", "first");
        let second = MessageRecord::new(id("bo"), "Bo", "second");
        session.apply(PresenceEvent::Message(first), now);
        session.apply(PresenceEvent::Message(second), now);

        let later = now + Duration::from_millis(5000);
        assert!(session.tick(later));
        session.remount(later);

        assert_eq!(session.renderer().bubble_text(&id("bo")), Some("second"));
        assert_eq!(session.renderer().bubble_text(&id("ann")), None);
    }

    #[test]
    fn test_local_id_assigned_later() {
        let now = Instant::now();
        let mut session = PresenceSession::default();
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        session.apply(
            PresenceEvent::Snapshot(vec![
                UserRecord::new(id("me"), "Me"),
                UserRecord::new(id("ann"), "Ann"),
            ]),
            now,
        );
        assert_eq!(session.frame(now).len(), 2);

        session.set_local_id(id("me"));
        assert_eq!(session.frame(now).len(), 1);
        assert_eq!(session.local_id(), Some(&id("me")));
    }
}
