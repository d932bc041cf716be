//! Per-cursor decay state machines.
//!
//! Each remote cursor owns two independent timers:
//!
//! ```text
//! Tooltip:  Hidden ──(move / enter / new message)──► Visible{until}
//!           Visible ──(until reached / pointer leave)──► Hidden
//!
//! Bubble:   Idle ──(message from this sender)──► Showing{text, until}
//!           Showing ──(until reached)──► Idle
//! ```
//!
//! A timer is just the deadline stored in the state. Re-arming overwrites
//! it, so a burst of events never leaves stacked timeouts behind, and
//! dropping the state drops the timer with it.

use std::time::Duration;

use tokio::time::Instant;

/// Tooltip hides this long after the last qualifying event.
pub const TOOLTIP_TIMEOUT: Duration = Duration::from_millis(3000);

/// Longest message shown in a bubble before it is cut.
pub const BUBBLE_MAX_CHARS: usize = 30;

/// Appended to cut messages.
pub const ELLIPSIS: &str = "...";

pub const BUBBLE_MIN_DURATION: Duration = Duration::from_millis(1000);
pub const BUBBLE_MAX_DURATION: Duration = Duration::from_millis(4000);
pub const BUBBLE_PER_CHAR: Duration = Duration::from_millis(100);

/// Cut `content` to [`BUBBLE_MAX_CHARS`] characters plus [`ELLIPSIS`].
/// Shorter messages come back unchanged.
pub fn truncate_message(content: &str) -> String {
    match content.char_indices().nth(BUBBLE_MAX_CHARS) {
        Some((cut, _)) => {
            let mut shown = String::with_capacity(cut + ELLIPSIS.len());
            shown.push_str(&content[..cut]);
            shown.push_str(ELLIPSIS);
            shown
        }
        None => content.to_owned(),
    }
}

/// How long a bubble with `displayed` text stays up:
/// `clamp(chars × 100ms, 1s, 4s)`.
pub fn bubble_duration(displayed: &str) -> Duration {
    let chars = u32::try_from(displayed.chars().count()).unwrap_or(u32::MAX);
    BUBBLE_PER_CHAR
        .saturating_mul(chars)
        .clamp(BUBBLE_MIN_DURATION, BUBBLE_MAX_DURATION)
}

// ───────────────────────────────────────────────────────────────────
// Tooltip
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TooltipState {
    #[default]
    Hidden,
    Visible { until: Instant },
}

#[derive(Debug, Clone, Default)]
pub struct Tooltip {
    state: TooltipState,
}

impl Tooltip {
    /// Show (or keep showing) for another [`TOOLTIP_TIMEOUT`] from `now`.
    pub fn show(&mut self, now: Instant) {
        self.state = TooltipState::Visible {
            until: now + TOOLTIP_TIMEOUT,
        };
    }

    /// Hide immediately (pointer left).
    pub fn hide(&mut self) {
        self.state = TooltipState::Hidden;
    }

    /// Expire if the deadline has passed. Returns `true` on a transition.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.state {
            TooltipState::Visible { until } if now >= until => {
                self.state = TooltipState::Hidden;
                true
            }
            _ => false,
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.state, TooltipState::Visible { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TooltipState::Visible { until } => Some(until),
            TooltipState::Hidden => None,
        }
    }

    pub fn state(&self) -> TooltipState {
        self.state
    }
}

// ───────────────────────────────────────────────────────────────────
// Message bubble
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BubbleState {
    #[default]
    Idle,
    Showing { text: String, until: Instant },
}

#[derive(Debug, Clone, Default)]
pub struct Bubble {
    state: BubbleState,
}

impl Bubble {
    /// Start showing `content`, cancelling whatever was showing before.
    ///
    /// Returns the display duration, or `None` for an empty message
    /// (which leaves the bubble as it was).
    pub fn show(&mut self, content: &str, now: Instant) -> Option<Duration> {
        if content.is_empty() {
            return None;
        }
        let text = truncate_message(content);
        let duration = bubble_duration(&text);
        self.state = BubbleState::Showing {
            text,
            until: now + duration,
        };
        Some(duration)
    }

    /// Expire if the deadline has passed. Returns `true` on a transition.
    pub fn tick(&mut self, now: Instant) -> bool {
        match &self.state {
            BubbleState::Showing { until, .. } if now >= *until => {
                self.state = BubbleState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Text currently on screen.
    pub fn text(&self) -> Option<&str> {
        match &self.state {
            BubbleState::Showing { text, .. } => Some(text),
            BubbleState::Idle => None,
        }
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.state, BubbleState::Showing { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            BubbleState::Showing { until, .. } => Some(*until),
            BubbleState::Idle => None,
        }
    }

    pub fn state(&self) -> &BubbleState {
        &self.state
    }
}
