//! Presence data model and the client-local registry of who is online.
//!
//! ## Reconciliation
//!
//! ```text
//! PresenceSnapshot(records) ──► PresenceRegistry::apply_snapshot()    (atomic replace)
//! PresenceDelta(patch)      ──► PresenceRegistry::apply_incremental() (insert or merge)
//! PresenceLeave { id }      ──► PresenceRegistry::remove()
//! ```
//!
//! The registry holds every participant the transport told us about,
//! including the local session. Filtering out self is the renderer's job
//! (see [`PresenceRegistry::remotes`]).

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::PresenceError;

/// Name given to a participant whose first sighting carried no name.
pub const DEFAULT_NAME: &str = "Anonymous";

// ───────────────────────────────────────────────────────────────────
// Identity
// ───────────────────────────────────────────────────────────────────

/// Opaque session token issued by the relay on connect.
///
/// Stable for one connection, never persisted; a reconnect gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty token is treated the same as a missing one.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First eight characters, for log lines and placeholder labels.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

// ───────────────────────────────────────────────────────────────────
// Geometry & color
// ───────────────────────────────────────────────────────────────────

/// 2D position in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation toward `target` by factor `t` ∈ [0, 1].
    pub fn lerp(&self, target: &Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }
}

impl Default for Vec2 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// RGBA accent color for a remote cursor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Stable, vivid color derived from an arbitrary seed (the session id).
    ///
    /// Same seed, same color, on every client.
    pub fn from_seed(seed: &str) -> Self {
        let hue = (fnv1a(seed.as_bytes()) % 360) as f32 / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// `#rrggbb` form, alpha dropped.
    pub fn to_hex(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            channel_to_byte(self.r),
            channel_to_byte(self.g),
            channel_to_byte(self.b)
        )
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 } // Default blue
    }
}

fn channel_to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// 64-bit FNV-1a; stable across processes, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l); // Achromatic
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────────

/// Everything we know about one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: SessionId,
    pub name: String,
    /// `None` renders with [`CursorColor::default`].
    pub color: Option<CursorColor>,
    /// `None` until the participant first moves.
    pub position: Option<Vec2>,
    /// Free-text page/section description.
    pub location: String,
    /// Country/region indicator.
    pub flag: String,
}

impl UserRecord {
    /// Fresh record with a color derived from the id.
    pub fn new(id: SessionId, name: impl Into<String>) -> Self {
        let color = Some(CursorColor::from_seed(id.as_str()));
        Self {
            id,
            name: name.into(),
            color,
            position: None,
            location: String::new(),
            flag: String::new(),
        }
    }

    /// Build a record for an id we have never seen, from whatever the
    /// patch carries. Absent fields fall back to defaults.
    fn from_patch(id: SessionId, patch: UserPatch) -> Self {
        Self {
            id,
            name: patch.name.unwrap_or_else(|| DEFAULT_NAME.to_owned()),
            color: patch.color,
            position: patch.position,
            location: patch.location.unwrap_or_default(),
            flag: patch.flag.unwrap_or_default(),
        }
    }

    /// Shallow merge: every field present in `patch` wins, every absent
    /// field keeps its current value. The id never changes.
    pub fn merge(&mut self, patch: UserPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(color) = patch.color {
            self.color = Some(color);
        }
        if let Some(position) = patch.position {
            self.position = Some(position);
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(flag) = patch.flag {
            self.flag = flag;
        }
    }
}

/// Partial update for one participant. Every field is optional,
/// including the id (a patch without one is rejected on apply).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    pub id: Option<SessionId>,
    pub name: Option<String>,
    pub color: Option<CursorColor>,
    pub position: Option<Vec2>,
    pub location: Option<String>,
    pub flag: Option<String>,
}

impl UserPatch {
    /// Empty patch addressed to `id`.
    pub fn for_user(id: SessionId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: CursorColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }
}

impl From<UserRecord> for UserPatch {
    fn from(record: UserRecord) -> Self {
        Self {
            id: Some(record.id),
            name: Some(record.name),
            color: record.color,
            position: record.position,
            location: Some(record.location),
            flag: Some(record.flag),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────────

/// Client-local map of session id → last known record.
///
/// Keys track the transport: a snapshot replaces the whole map, a delta
/// inserts or merges one entry, a leave removes one.
#[derive(Debug, Default, Clone)]
pub struct PresenceRegistry {
    users: HashMap<SessionId, UserRecord>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire registry. Afterwards it holds exactly the ids in
    /// `records`; on duplicate ids the later record wins.
    pub fn apply_snapshot(&mut self, records: Vec<UserRecord>) {
        let mut next = HashMap::with_capacity(records.len());
        for record in records {
            if record.id.is_empty() {
                log::warn!("snapshot entry without session id dropped");
                continue;
            }
            next.insert(record.id.clone(), record);
        }
        self.users = next;
    }

    /// Insert a new record (unseen id) or shallow-merge onto the existing one.
    ///
    /// # Errors
    ///
    /// [`PresenceError::MissingId`] when the patch has no (or an empty) id;
    /// the registry is left untouched.
    pub fn apply_incremental(
        &mut self,
        mut patch: UserPatch,
    ) -> Result<&UserRecord, PresenceError> {
        let id = match patch.id.take() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(PresenceError::MissingId),
        };

        match self.users.entry(id) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.merge(patch);
                Ok(record)
            }
            Entry::Vacant(entry) => {
                let record = UserRecord::from_patch(entry.key().clone(), patch);
                Ok(entry.insert(record))
            }
        }
    }

    /// Drop one participant (explicit leave).
    pub fn remove(&mut self, id: &SessionId) -> Option<UserRecord> {
        self.users.remove(id)
    }

    /// All known records, in no particular order.
    pub fn list(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    /// All records except the local session's.
    pub fn remotes<'a>(
        &'a self,
        local_id: Option<&'a SessionId>,
    ) -> impl Iterator<Item = &'a UserRecord> + 'a {
        self.users
            .values()
            .filter(move |record| Some(&record.id) != local_id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&UserRecord> {
        self.users.get(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.users.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// ===================================================================
// Tests
// ===================================================================
