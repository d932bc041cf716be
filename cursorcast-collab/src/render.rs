//! Remote cursor renderer.
//!
//! Turns the registry and message log into one [`CursorView`] per remote
//! participant: where to paint the glyph, in which color, and whether the
//! tooltip (location, flag, message bubble) is up.
//!
//! ## Data flow
//!
//! ```text
//!  PresenceRegistry ──► CursorRenderer::reconcile()      create / tear down CursorState
//!  MessageLog       ──► CursorRenderer::sync_messages()  arm bubble + tooltip
//!  pointer hover    ──► CursorRenderer::pointer_enter/leave()
//!  timer wheel      ──► CursorRenderer::next_deadline() / tick()
//!                               │
//!                               ▼
//!                     CursorRenderer::frame() ──► Vec<CursorView>
//! ```
//!
//! All per-cursor state is ephemeral and rebuilt from scratch on remount.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::decay::{Bubble, Tooltip};
use crate::message_log::MessageLog;
use crate::presence::{CursorColor, PresenceRegistry, SessionId, Vec2};

/// How long a cursor glides to its new position.
pub const MOVE_ANIMATION: Duration = Duration::from_millis(200);

// ───────────────────────────────────────────────────────────────────
// Position animation
// ───────────────────────────────────────────────────────────────────

/// Ease-out glide from the last drawn position to the latest target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTween {
    from: Vec2,
    to: Vec2,
    start: Instant,
    duration: Duration,
}

impl PositionTween {
    /// A tween already at rest on `at`.
    pub fn settled(at: Vec2, now: Instant) -> Self {
        Self {
            from: at,
            to: at,
            start: now,
            duration: MOVE_ANIMATION,
        }
    }

    /// Start gliding toward `target` from wherever the cursor is drawn now.
    pub fn retarget(&mut self, target: Vec2, now: Instant) {
        if target == self.to {
            return;
        }
        self.from = self.sample(now);
        self.to = target;
        self.start = now;
    }

    pub fn sample(&self, now: Instant) -> Vec2 {
        self.from.lerp(&self.to, ease_out_cubic(self.progress(now)))
    }

    pub fn target(&self) -> Vec2 {
        self.to
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    /// When the glide finishes.
    pub fn end(&self) -> Instant {
        self.start + self.duration
    }

    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() || self.from == self.to {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t;
    1.0 - inv * inv * inv
}

// ───────────────────────────────────────────────────────────────────
// Per-cursor state
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct CursorState {
    tooltip: Tooltip,
    bubble: Bubble,
    tween: Option<PositionTween>,
    last_position: Option<Vec2>,
}

impl CursorState {
    /// State for a cursor seen for the first time. A position it already
    /// has is where it rests; it does not count as a move.
    fn sighted(position: Option<Vec2>, now: Instant) -> Self {
        Self {
            tween: position.map(|at| PositionTween::settled(at, now)),
            last_position: position,
            ..Self::default()
        }
    }

    /// Feed the registry's position for this cursor. Any change starts a
    /// glide from where the cursor is drawn and shows the tooltip.
    fn observe_position(&mut self, position: Option<Vec2>, now: Instant) {
        if position == self.last_position {
            return;
        }
        self.last_position = position;

        let Some(target) = position else {
            return;
        };
        // Without a position the cursor is drawn at the origin.
        self.tween
            .get_or_insert_with(|| PositionTween::settled(Vec2::ZERO, now))
            .retarget(target, now);
        self.tooltip.show(now);
    }

    fn tick(&mut self, now: Instant) -> bool {
        let tooltip = self.tooltip.tick(now);
        let bubble = self.bubble.tick(now);
        tooltip || bubble
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let gliding = self
            .tween
            .filter(|tween| !tween.is_settled(now))
            .map(|tween| tween.end());
        [self.tooltip.deadline(), self.bubble.deadline(), gliding]
            .into_iter()
            .flatten()
            .min()
    }
}

// ───────────────────────────────────────────────────────────────────
// Views
// ───────────────────────────────────────────────────────────────────

/// What to paint for one remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorView {
    pub id: SessionId,
    pub name: String,
    /// Animated position (falls back to the origin if never reported).
    pub position: Vec2,
    /// Record color, or [`CursorColor::default`] if absent.
    pub color: CursorColor,
    /// `Some` only while the tooltip is visible.
    pub tooltip: Option<TooltipView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipView {
    pub location: String,
    pub flag: String,
    /// Truncated bubble text while the bubble is showing.
    pub message: Option<String>,
}

// ───────────────────────────────────────────────────────────────────
// Renderer
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CursorRenderer {
    local_id: Option<SessionId>,
    cursors: HashMap<SessionId, CursorState>,
    /// Number of log entries already handled.
    messages_seen: usize,
}

impl CursorRenderer {
    pub fn new(local_id: Option<SessionId>) -> Self {
        Self {
            local_id,
            ..Self::default()
        }
    }

    /// Renderer for a remount: history before the log's tail is treated
    /// as already seen, so only the latest message can raise a bubble.
    pub fn resume(local_id: Option<SessionId>, log: &MessageLog) -> Self {
        Self {
            local_id,
            messages_seen: log.len().saturating_sub(1),
            ..Self::default()
        }
    }

    /// Set (or change) which session is "self" and drop any state for it.
    pub fn set_local_id(&mut self, id: SessionId) {
        self.cursors.remove(&id);
        self.local_id = Some(id);
    }

    /// Bring per-cursor state in line with the registry: tear down state
    /// for ids that are gone, create it for new ids, feed positions.
    pub fn reconcile(&mut self, registry: &PresenceRegistry, now: Instant) {
        let local = self.local_id.as_ref();
        self.cursors
            .retain(|id, _| Some(id) != local && registry.contains(id));

        for record in registry.remotes(local) {
            match self.cursors.entry(record.id.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().observe_position(record.position, now);
                }
                Entry::Vacant(entry) => {
                    entry.insert(CursorState::sighted(record.position, now));
                }
            }
        }
    }

    /// Handle every log entry appended since the last call, in order.
    /// A message from a cursor we draw arms its bubble and tooltip;
    /// everything else (self, unknown senders) is skipped.
    pub fn sync_messages(&mut self, log: &MessageLog, now: Instant) {
        for message in log.since(self.messages_seen) {
            let Some(state) = self.cursors.get_mut(&message.sender_id) else {
                continue;
            };
            if state.bubble.show(&message.content, now).is_some() {
                state.tooltip.show(now);
            }
        }
        self.messages_seen = log.len();
    }

    /// Pointer entered a remote cursor. Unknown ids are ignored.
    pub fn pointer_enter(&mut self, id: &SessionId, now: Instant) {
        if let Some(state) = self.cursors.get_mut(id) {
            state.tooltip.show(now);
        }
    }

    /// Pointer left a remote cursor. Unknown ids are ignored.
    pub fn pointer_leave(&mut self, id: &SessionId) {
        if let Some(state) = self.cursors.get_mut(id) {
            state.tooltip.hide();
        }
    }

    /// Expire due timers. Returns `true` if anything became hidden.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.cursors
            .values_mut()
            .fold(false, |changed, state| state.tick(now) || changed)
    }

    /// Earliest moment something on screen changes on its own.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.cursors
            .values()
            .filter_map(|state| state.next_deadline(now))
            .min()
    }

    /// Build the views for this instant. Self is never included.
    pub fn frame(&mut self, registry: &PresenceRegistry, now: Instant) -> Vec<CursorView> {
        self.tick(now);

        registry
            .remotes(self.local_id.as_ref())
            .map(|record| {
                let state = self.cursors.get(&record.id);
                let position = state
                    .and_then(|s| s.tween)
                    .map(|tween| tween.sample(now))
                    .or(record.position)
                    .unwrap_or_default();
                let tooltip = state
                    .filter(|s| s.tooltip.is_visible())
                    .map(|s| TooltipView {
                        location: record.location.clone(),
                        flag: record.flag.clone(),
                        message: s.bubble.text().map(str::to_owned),
                    });
                CursorView {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    position,
                    color: record.color.unwrap_or_default(),
                    tooltip,
                }
            })
            .collect()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_tooltip_visible(&self, id: &SessionId) -> bool {
        self.cursors
            .get(id)
            .is_some_and(|state| state.tooltip.is_visible())
    }

    pub fn bubble_text(&self, id: &SessionId) -> Option<&str> {
        self.cursors.get(id).and_then(|state| state.bubble.text())
    }

    pub fn local_id(&self) -> Option<&SessionId> {
        self.local_id.as_ref()
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_log::MessageRecord;
    use crate::presence::{UserPatch, UserRecord};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn id(raw: &str) -> SessionId {
        SessionId::from(raw)
    }

    fn user(raw: &str, x: f32, y: f32) -> UserRecord {
        let mut record = UserRecord::new(id(raw), raw.to_uppercase());
        record.position = Some(Vec2::new(x, y));
        record.location = "/home".into();
        record.flag = "FR".into();
        record
    }

    fn chat(sender: &str, content: &str) -> MessageRecord {
        MessageRecord::new(id(sender), sender.to_uppercase(), content)
    }

    fn setup(now: Instant) -> (CursorRenderer, PresenceRegistry) {
        let mut registry = PresenceRegistry::new();
        registry.apply_snapshot(vec![user("me", 0.0, 0.0), user("bob", 10.0, 10.0)]);
        let mut renderer = CursorRenderer::new(Some(id("me")));
        renderer.reconcile(&registry, now);
        (renderer, registry)
    }

    fn move_to(registry: &mut PresenceRegistry, raw: &str, x: f32, y: f32) {
        registry
            .apply_incremental(UserPatch::for_user(id(raw)).with_position(Vec2::new(x, y)))
            .unwrap();
    }

    // ── Tween ────────────────────────────────────────────────────

    #[test]
    fn test_tween_glides_and_settles() {
        let start = Instant::now();
        let mut tween = PositionTween::settled(Vec2::ZERO, start);
        tween.retarget(Vec2::new(100.0, 0.0), start);

        let mid = tween.sample(start + ms(100));
        assert!(mid.x > 50.0 && mid.x < 100.0, "ease-out past halfway: {}", mid.x);
        assert!(!tween.is_settled(start + ms(100)));

        assert_eq!(tween.sample(start + ms(200)), Vec2::new(100.0, 0.0));
        assert!(tween.is_settled(start + ms(200)));
        assert_eq!(tween.end(), start + MOVE_ANIMATION);
    }

    #[test]
    fn test_tween_retarget_mid_flight_starts_from_drawn_position() {
        let start = Instant::now();
        let mut tween = PositionTween::settled(Vec2::ZERO, start);
        tween.retarget(Vec2::new(100.0, 0.0), start);
        let drawn = tween.sample(start + ms(100));

        tween.retarget(Vec2::new(0.0, 100.0), start + ms(100));
        assert_eq!(tween.sample(start + ms(100)), drawn);
        assert_eq!(tween.target(), Vec2::new(0.0, 100.0));
    }

    // ── Self exclusion / lifecycle ───────────────────────────────

    #[test]
    fn test_frame_excludes_self() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);

        let views = renderer.frame(&registry, now);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, id("bob"));
        assert!(views.iter().all(|v| v.id != id("me")));
        assert_eq!(renderer.cursor_count(), 1);
    }

    #[test]
    fn test_frame_without_local_id_shows_everyone() {
        let now = Instant::now();
        let mut registry = PresenceRegistry::new();
        registry.apply_snapshot(vec![user("a", 0.0, 0.0), user("b", 1.0, 1.0)]);
        let mut renderer = CursorRenderer::new(None);
        renderer.reconcile(&registry, now);
        assert_eq!(renderer.frame(&registry, now).len(), 2);

        renderer.set_local_id(id("a"));
        assert_eq!(renderer.frame(&registry, now).len(), 1);
        assert_eq!(renderer.local_id(), Some(&id("a")));
    }

    #[test]
    fn test_reconcile_tears_down_removed_users() {
        let now = Instant::now();
        let (mut renderer, mut registry) = setup(now);
        renderer.pointer_enter(&id("bob"), now);

        registry.apply_snapshot(vec![user("me", 0.0, 0.0)]);
        renderer.reconcile(&registry, now);

        assert_eq!(renderer.cursor_count(), 0);
        assert_eq!(renderer.next_deadline(now), None);
        assert!(renderer.frame(&registry, now).is_empty());
    }

    #[test]
    fn test_events_for_unknown_ids_are_noops() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);

        renderer.pointer_enter(&id("ghost"), now);
        renderer.pointer_leave(&id("ghost"));
        assert!(!renderer.is_tooltip_visible(&id("ghost")));
        assert!(!renderer.tick(now + ms(10_000)));
        assert_eq!(renderer.frame(&registry, now).len(), 1);
    }

    // ── Tooltip ──────────────────────────────────────────────────

    #[test]
    fn test_tooltip_hidden_initially_visible_on_move() {
        let now = Instant::now();
        let (mut renderer, mut registry) = setup(now);
        assert!(!renderer.is_tooltip_visible(&id("bob")));
        assert!(renderer.frame(&registry, now)[0].tooltip.is_none());

        move_to(&mut registry, "bob", 50.0, 60.0);
        renderer.reconcile(&registry, now + ms(100));

        let views = renderer.frame(&registry, now + ms(100));
        let tooltip = views[0].tooltip.as_ref().unwrap();
        assert_eq!(tooltip.location, "/home");
        assert_eq!(tooltip.flag, "FR");
        assert_eq!(tooltip.message, None);
    }

    #[test]
    fn test_tooltip_times_out_after_last_move() {
        let start = Instant::now();
        let (mut renderer, mut registry) = setup(start);

        move_to(&mut registry, "bob", 20.0, 20.0);
        renderer.reconcile(&registry, start);
        move_to(&mut registry, "bob", 30.0, 30.0);
        renderer.reconcile(&registry, start + ms(1000));

        assert!(renderer.frame(&registry, start + ms(3999))[0].tooltip.is_some());
        assert!(renderer.frame(&registry, start + ms(4000))[0].tooltip.is_none());
    }

    #[test]
    fn test_unchanged_position_does_not_reshow_tooltip() {
        let start = Instant::now();
        let (mut renderer, mut registry) = setup(start);
        move_to(&mut registry, "bob", 20.0, 20.0);
        renderer.reconcile(&registry, start);
        assert!(renderer.tick(start + ms(3000)));

        // A delta that only renames keeps the position as it was.
        registry
            .apply_incremental(UserPatch::for_user(id("bob")).with_name("Robert"))
            .unwrap();
        renderer.reconcile(&registry, start + ms(3100));
        assert!(!renderer.is_tooltip_visible(&id("bob")));
    }

    #[test]
    fn test_pointer_enter_and_leave() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);

        renderer.pointer_enter(&id("bob"), now);
        assert!(renderer.is_tooltip_visible(&id("bob")));
        renderer.pointer_leave(&id("bob"));
        assert!(!renderer.is_tooltip_visible(&id("bob")));
        assert!(renderer.frame(&registry, now)[0].tooltip.is_none());
    }

    // ── Message bubble ───────────────────────────────────────────

    #[test]
    fn test_message_from_remote_shows_bubble_and_tooltip() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);
        let mut log = MessageLog::new();
        log.append(chat("bob", "this message is definitely longer than thirty chars"));
        renderer.sync_messages(&log, now);

        let views = renderer.frame(&registry, now);
        let tooltip = views[0].tooltip.as_ref().unwrap();
        assert_eq!(
            tooltip.message.as_deref(),
            Some("this message is definitely lon...")
        );
    }

    #[test]
    fn test_bubble_duration_and_expiry() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);
        let mut log = MessageLog::new();
        log.append(chat("bob", "eight ch")); // 8 chars → 1000ms
        renderer.sync_messages(&log, now);

        assert_eq!(renderer.bubble_text(&id("bob")), Some("eight ch"));
        renderer.frame(&registry, now + ms(999));
        assert!(renderer.bubble_text(&id("bob")).is_some());
        renderer.frame(&registry, now + ms(1000));
        assert!(renderer.bubble_text(&id("bob")).is_none());
        // Tooltip outlives the bubble.
        assert!(renderer.is_tooltip_visible(&id("bob")));
    }

    #[test]
    fn test_new_message_restarts_bubble() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);
        let mut log = MessageLog::new();
        log.append(chat("bob", &"x".repeat(35))); // cut to 33 chars, 3300ms
        renderer.sync_messages(&log, now);

        log.append(chat("bob", "again")); // 1000ms from +3000
        renderer.sync_messages(&log, now + ms(3000));

        renderer.frame(&registry, now + ms(3600));
        assert_eq!(renderer.bubble_text(&id("bob")), Some("again"));
        renderer.frame(&registry, now + ms(4000));
        assert_eq!(renderer.bubble_text(&id("bob")), None);
    }

    #[test]
    fn test_messages_processed_once() {
        let now = Instant::now();
        let (mut renderer, _registry) = setup(now);
        let mut log = MessageLog::new();
        log.append(chat("bob", "hi there"));
        renderer.sync_messages(&log, now);
        renderer.tick(now + ms(5000));

        // Same log, no new entries: nothing re-arms.
        renderer.sync_messages(&log, now + ms(5000));
        assert_eq!(renderer.bubble_text(&id("bob")), None);
    }

    #[test]
    fn test_message_from_self_or_unknown_ignored() {
        let now = Instant::now();
        let (mut renderer, _registry) = setup(now);
        let mut log = MessageLog::new();
        log.append(chat("me", "talking to myself"));
        log.append(chat("ghost", "boo"));
        renderer.sync_messages(&log, now);

        assert_eq!(renderer.bubble_text(&id("me")), None);
        assert_eq!(renderer.next_deadline(now), None);
    }

    #[test]
    fn test_resume_only_considers_tail() {
        let now = Instant::now();
        let mut registry = PresenceRegistry::new();
        registry.apply_snapshot(vec![
            user("me", 0.0, 0.0),
            user("bob", 1.0, 1.0),
            user("eve", 2.0, 2.0),
        ]);
        let mut log = MessageLog::new();
        log.append(chat("eve", "old news"));
        log.append(chat("bob", "latest"));

        let mut renderer = CursorRenderer::resume(Some(id("me")), &log);
        renderer.reconcile(&registry, now);
        renderer.sync_messages(&log, now);

        assert_eq!(renderer.bubble_text(&id("bob")), Some("latest"));
        assert_eq!(renderer.bubble_text(&id("eve")), None);
    }

    // ── Rendering fallbacks / animation ──────────────────────────

    #[test]
    fn test_missing_color_and_position_fall_back() {
        let now = Instant::now();
        let mut registry = PresenceRegistry::new();
        registry
            .apply_incremental(UserPatch::for_user(id("bare")))
            .unwrap();
        let mut renderer = CursorRenderer::new(Some(id("me")));
        renderer.reconcile(&registry, now);

        let views = renderer.frame(&registry, now);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].color, CursorColor::default());
        assert_eq!(views[0].position, Vec2::ZERO);
    }

    #[test]
    fn test_cursor_animates_instead_of_teleporting() {
        let start = Instant::now();
        let (mut renderer, mut registry) = setup(start);

        move_to(&mut registry, "bob", 110.0, 10.0);
        renderer.reconcile(&registry, start);

        let early = renderer.frame(&registry, start + ms(50))[0].position;
        assert!(early.x > 10.0 && early.x < 110.0);
        assert_eq!(renderer.next_deadline(start + ms(50)), Some(start + MOVE_ANIMATION));

        let settled = renderer.frame(&registry, start + ms(200))[0].position;
        assert_eq!(settled, Vec2::new(110.0, 10.0));
        // Glide done: only the tooltip deadline is left.
        assert_eq!(
            renderer.next_deadline(start + ms(200)),
            Some(start + crate::decay::TOOLTIP_TIMEOUT)
        );
    }

    #[test]
    fn test_first_move_from_unknown_position_glides_and_shows_tooltip() {
        let start = Instant::now();
        let mut registry = PresenceRegistry::new();
        registry.apply_snapshot(vec![
            user("me", 0.0, 0.0),
            UserRecord::new(id("bob"), "BOB"),
        ]);
        let mut renderer = CursorRenderer::new(Some(id("me")));
        renderer.reconcile(&registry, start);
        assert_eq!(renderer.frame(&registry, start)[0].position, Vec2::ZERO);
        assert!(!renderer.is_tooltip_visible(&id("bob")));

        move_to(&mut registry, "bob", 100.0, 200.0);
        renderer.reconcile(&registry, start);

        let view = &renderer.frame(&registry, start + ms(100))[0];
        assert!(view.tooltip.is_some());
        assert!(view.position.x > 0.0 && view.position.x < 100.0);
        assert!(view.position.y > 0.0 && view.position.y < 200.0);
        let settled = renderer.frame(&registry, start + ms(200))[0].position;
        assert_eq!(settled, Vec2::new(100.0, 200.0));
    }

    #[test]
    fn test_position_known_at_first_sighting_rests_without_tooltip() {
        let now = Instant::now();
        let (mut renderer, registry) = setup(now);

        let view = &renderer.frame(&registry, now)[0];
        assert_eq!(view.position, Vec2::new(10.0, 10.0));
        assert!(view.tooltip.is_none());
        assert_eq!(renderer.next_deadline(now), None);
    }
}
