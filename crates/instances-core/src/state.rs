//! Persisted document types.
//!
//! The on-disk field names match the document written by earlier releases
//! (`LastInstance`, `RecentInstances`, `InstanceId`, ...), so an existing
//! `InstancesModConfig.json` keeps loading. Rust-side names follow the
//! session vocabulary used everywhere else in the workspace.
//!
//! The list operations here are pure: they mutate the document and report
//! what changed. Saving and event emission live in `instances-runtime`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CURRENT_CONFIG_VERSION;

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// A 3-component vector, used for positions and Euler rotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// Build a vector from its components.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where a participant stands and which way they face.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// World-space position.
    pub position: Vec3,
    /// Euler rotation in degrees.
    pub rotation_euler: Vec3,
}

impl Pose {
    /// Keep only the yaw component of the rotation.
    ///
    /// Pitch and roll come from head tracking and must not be restored,
    /// otherwise the participant lands tilted after a teleport.
    #[must_use]
    pub fn upright(self) -> Self {
        Self {
            position: self.position,
            rotation_euler: Vec3::new(0.0, self.rotation_euler.y, 0.0),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A session the participant has been in. Identity key: `session_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRecord {
    /// World the session runs.
    pub world_id: String,
    /// Thumbnail of the world, backfilled after creation.
    #[serde(default)]
    pub world_image_url: Option<String>,
    /// Session identifier.
    #[serde(rename = "InstanceId")]
    pub session_id: String,
    /// Human-readable session name.
    #[serde(rename = "InstanceName", default)]
    pub display_name: String,
}

impl SessionRecord {
    /// Create a record without a world image.
    pub fn new(
        session_id: impl Into<String>,
        world_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            world_id: world_id.into(),
            world_image_url: None,
            session_id: session_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Builder: attach a world image URL.
    #[must_use]
    pub fn with_world_image(mut self, url: impl Into<String>) -> Self {
        self.world_image_url = Some(url.into());
        self
    }
}

/// Snapshot of where the participant stood when the process last closed
/// inside a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RejoinLocation {
    /// Session the snapshot was taken in.
    #[serde(rename = "InstanceId")]
    pub session_id: String,
    /// Whether a rejoin should try to restore this location.
    pub attempt_to_teleport: bool,
    /// When the snapshot was taken.
    #[serde(rename = "ClosedDateTime")]
    pub closed_at: DateTime<Utc>,
    /// Stored position.
    pub position: Vec3,
    /// Stored Euler rotation.
    pub rotation_euler: Vec3,
}

impl RejoinLocation {
    /// Snapshot `pose` for `session_id`, marked for teleport.
    pub fn capture(session_id: impl Into<String>, pose: Pose, closed_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            attempt_to_teleport: true,
            closed_at,
            position: pose.position,
            rotation_euler: pose.rotation_euler,
        }
    }

    /// The stored pose.
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            rotation_euler: self.rotation_euler,
        }
    }

    /// Time elapsed between the snapshot and `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.closed_at
    }

    /// Whether strictly more than `minutes` have passed since the snapshot.
    ///
    /// A bound too large for a `TimeDelta` is never exceeded.
    pub fn older_than_minutes(&self, now: DateTime<Utc>, minutes: i64) -> bool {
        TimeDelta::try_minutes(minutes).is_some_and(|limit| self.elapsed(now) > limit)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Root document
// ─────────────────────────────────────────────────────────────────────────────

fn current_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

/// The single root document persisted by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersistedState {
    /// Document schema version.
    #[serde(default = "current_config_version")]
    pub config_version: u32,
    /// Session to attempt on the next startup.
    #[serde(rename = "LastInstance", default)]
    pub last_session: Option<SessionRecord>,
    /// Most-recent-first, deduplicated history.
    #[serde(rename = "RecentInstances", default)]
    pub recent_sessions: Vec<SessionRecord>,
    /// Last known location inside `last_session`.
    #[serde(default)]
    pub rejoin_location: Option<RejoinLocation>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            last_session: None,
            recent_sessions: Vec::new(),
            rejoin_location: None,
        }
    }
}

impl PersistedState {
    /// Parse a document.
    pub fn from_document(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize to the indented on-disk form.
    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Session id of `last_session`, if any.
    pub fn last_session_id(&self) -> Option<&str> {
        self.last_session.as_ref().map(|s| s.session_id.as_str())
    }

    /// World image already known for `world_id`, taken from history.
    pub fn cached_world_image(&self, world_id: &str) -> Option<&str> {
        self.recent_sessions
            .iter()
            .filter(|s| s.world_id == world_id)
            .find_map(|s| s.world_image_url.as_deref())
    }

    /// Make `record` the last session and the head of the history.
    ///
    /// Any existing entry with the same session id is removed first and the
    /// list is truncated to `max` from the tail. When the incoming record has
    /// no world image, the image of the replaced entry is kept.
    pub fn record_session(&mut self, mut record: SessionRecord, max: usize) {
        if record.world_image_url.is_none() {
            record.world_image_url = self
                .recent_sessions
                .iter()
                .find(|s| s.session_id == record.session_id)
                .and_then(|s| s.world_image_url.clone());
        }
        self.recent_sessions
            .retain(|s| s.session_id != record.session_id);
        self.recent_sessions.insert(0, record.clone());
        let _ = self.apply_history_limit(max);
        self.last_session = Some(record);
    }

    /// Forget `session_id`. Returns whether anything was removed.
    ///
    /// `last_session` is cleared only when it is the same session.
    pub fn invalidate_session(&mut self, session_id: &str) -> bool {
        let before = self.recent_sessions.len();
        self.recent_sessions.retain(|s| s.session_id != session_id);
        let mut changed = before != self.recent_sessions.len();
        if self.last_session_id() == Some(session_id) {
            self.last_session = None;
            changed = true;
        }
        changed
    }

    /// Backfill `url` on every record of `world_id`. Ordering is untouched.
    ///
    /// Returns the number of records updated.
    pub fn update_world_image(&mut self, world_id: &str, url: &str) -> usize {
        let mut updated = 0;
        let records = self
            .last_session
            .iter_mut()
            .chain(self.recent_sessions.iter_mut());
        for record in records.filter(|r| r.world_id == world_id) {
            record.world_image_url = Some(url.to_owned());
            updated += 1;
        }
        updated
    }

    /// Truncate history to `max` entries. Returns how many were dropped.
    pub fn apply_history_limit(&mut self, max: usize) -> usize {
        let dropped = self.recent_sessions.len().saturating_sub(max);
        self.recent_sessions.truncate(max);
        dropped
    }

    /// Rejoin location only if it belongs to `session_id`.
    pub fn rejoin_location_for(&self, session_id: &str) -> Option<&RejoinLocation> {
        self.rejoin_location
            .as_ref()
            .filter(|loc| loc.session_id == session_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
