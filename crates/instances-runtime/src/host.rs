//! Seams to the embedding host.
//!
//! The runtime never talks to the host's networking or movement systems
//! directly. The integration layer implements [`SessionApi`] and [`Host`]
//! and hands them to [`crate::Instances::open`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use instances_core::Pose;
use instances_settings::{SessionRegion, SessionVisibility};

use crate::errors::ApiError;

/// Details of a live session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDetails {
    /// Session identifier.
    pub id: String,
    /// Human-readable session name.
    pub name: String,
    /// World the session runs.
    pub world_id: String,
    /// Thumbnail of the world.
    pub world_image_url: Option<String>,
}

/// Answer of a session lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionLookup {
    /// The session exists and can be joined.
    Found(SessionDetails),
    /// The session does not exist (or is not visible), with the API's reason.
    NotFound(String),
}

/// Parameters of a session creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateSessionRequest {
    /// World to start.
    pub world_id: String,
    /// Who may join.
    pub visibility: SessionVisibility,
    /// Server region.
    pub region: SessionRegion,
    /// Content group.
    pub group_id: String,
}

/// A freshly created session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedSession {
    /// Session identifier.
    pub id: String,
    /// Human-readable session name.
    pub name: String,
    /// Region the session was created in.
    pub region: String,
}

/// Host-provided session API.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Look up a session by id.
    async fn session_details(&self, session_id: &str) -> Result<SessionLookup, ApiError>;

    /// Create a new session.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, ApiError>;
}

/// The session the participant is currently in, as reported by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentSession {
    /// Session identifier.
    pub session_id: String,
    /// World the session runs.
    pub world_id: String,
    /// Human-readable session name.
    pub name: String,
}

/// Host-side effects and queries.
///
/// Every method is fire-and-forget or a cheap query; none may block on I/O.
pub trait Host: Send + Sync {
    /// Direct the host's networking layer to join a session.
    fn set_join_target(&self, session_id: &str, world_id: &str);

    /// Load a world offline.
    fn load_offline_world(&self, world_id: &str);

    /// World used for offline fallback and for created sessions.
    fn home_world_id(&self) -> String;

    /// Show a transient notice to the participant.
    fn show_notice(&self, title: &str, message: &str);

    /// The session the participant is in, if any.
    fn current_session(&self) -> Option<CurrentSession>;

    /// Current pose, or `None` while the participant cannot move freely
    /// (seated, in a vehicle, loading).
    fn participant_pose(&self) -> Option<Pose>;

    /// Move the participant.
    fn teleport(&self, pose: &Pose);

    /// Apply the relaxed content policy requested by a restart marker.
    fn apply_relaxed_content_policy(&self);
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
