//! Events emitted by the rejoin subsystem.
//!
//! Observers (a history UI, diagnostics, tests) subscribe to these through
//! the runtime's broadcast emitter. Emission never blocks the emitter.

use serde::{Deserialize, Serialize};

/// Something observable happened inside the subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstancesEvent {
    /// The persisted document changed and a save was queued.
    StateChanged,
    /// A join directive was issued to the host.
    JoinIssued {
        /// Session joined.
        session_id: String,
        /// World of the session.
        world_id: String,
    },
    /// The host was sent to the offline destination.
    OfflineFallback {
        /// Offline world loaded.
        world_id: String,
    },
    /// A session was dropped from history because it no longer exists.
    SessionInvalidated {
        /// Session removed.
        session_id: String,
    },
    /// A user-selected session could not be joined.
    SessionUnavailable {
        /// Session that was requested.
        session_id: String,
    },
    /// The participant was moved to the stored rejoin location.
    Teleported {
        /// Session the teleport happened in.
        session_id: String,
    },
}

impl InstancesEvent {
    /// Stable snake_case name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged => "state_changed",
            Self::JoinIssued { .. } => "join_issued",
            Self::OfflineFallback { .. } => "offline_fallback",
            Self::SessionInvalidated { .. } => "session_invalidated",
            Self::SessionUnavailable { .. } => "session_unavailable",
            Self::Teleported { .. } => "teleported",
        }
    }

    /// Session the event refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::JoinIssued { session_id, .. }
            | Self::SessionInvalidated { session_id }
            | Self::SessionUnavailable { session_id }
            | Self::Teleported { session_id } => Some(session_id),
            Self::StateChanged | Self::OfflineFallback { .. } => None,
        }
    }
}
