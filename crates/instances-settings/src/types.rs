//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a partial `settings.json` only needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of sessions kept in history.
pub const DEFAULT_HISTORY_MAX_COUNT: usize = 10;
/// Default rejoin timeout in minutes.
pub const DEFAULT_REJOIN_TIMEOUT_MINUTES: i64 = 15;
/// Default base interval between post-create availability checks.
pub const DEFAULT_CREATION_RETRY_BASE_SECS: f64 = 1.0;
/// Largest accepted base interval between post-create availability checks.
pub const MAX_CREATION_RETRY_BASE_SECS: f64 = 600.0;
/// Default interval of the rejoin-location snapshot job.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: f64 = 10.0;
/// Default directory holding the persisted document and `settings.json`.
pub const DEFAULT_DATA_DIR: &str = "UserData/Instances";

/// Root settings for the rejoin subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstancesSettings {
    /// Rejoin the last session when the process restarts.
    pub rejoin_on_restart: bool,
    /// Restore the previous position inside a rejoined session.
    pub rejoin_previous_position: bool,
    /// Start in a freshly created online session instead of offline.
    pub start_in_online_session: bool,
    /// Maximum number of sessions kept in history.
    pub history_max_count: usize,
    /// Skip rejoining after this many minutes. Negative disables the check.
    pub rejoin_timeout_minutes: i64,
    /// Base interval (seconds) of the linear backoff after creating a session.
    pub creation_retry_base_interval_secs: f64,
    /// Interval (seconds) of the rejoin-location snapshot job.
    pub snapshot_interval_secs: f64,
    /// Policy for sessions created at startup.
    pub starting_session: StartingSessionSettings,
    /// Directory holding the persisted document.
    pub data_dir: String,
}

impl Default for InstancesSettings {
    fn default() -> Self {
        Self {
            rejoin_on_restart: true,
            rejoin_previous_position: true,
            start_in_online_session: true,
            history_max_count: DEFAULT_HISTORY_MAX_COUNT,
            rejoin_timeout_minutes: DEFAULT_REJOIN_TIMEOUT_MINUTES,
            creation_retry_base_interval_secs: DEFAULT_CREATION_RETRY_BASE_SECS,
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            starting_session: StartingSessionSettings::default(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
        }
    }
}

impl InstancesSettings {
    /// Correct out-of-range values in place.
    ///
    /// Called automatically during loading. Bad values are corrected with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        let base = self.creation_retry_base_interval_secs;
        if !base.is_finite() || base < 0.0 {
            tracing::warn!("creation_retry_base_interval_secs invalid ({base}), clamped to 0");
            self.creation_retry_base_interval_secs = 0.0;
        } else if base > MAX_CREATION_RETRY_BASE_SECS {
            tracing::warn!(
                "creation_retry_base_interval_secs too large ({base}), clamped to {MAX_CREATION_RETRY_BASE_SECS}"
            );
            self.creation_retry_base_interval_secs = MAX_CREATION_RETRY_BASE_SECS;
        }

        let snapshot = self.snapshot_interval_secs;
        if !snapshot.is_finite() || snapshot <= 0.0 {
            tracing::warn!(
                "snapshot_interval_secs invalid ({snapshot}), reset to {DEFAULT_SNAPSHOT_INTERVAL_SECS}"
            );
            self.snapshot_interval_secs = DEFAULT_SNAPSHOT_INTERVAL_SECS;
        }
    }

    /// Rejoin timeout in minutes, or `None` when the check is disabled.
    pub fn rejoin_timeout(&self) -> Option<i64> {
        (self.rejoin_timeout_minutes >= 0).then_some(self.rejoin_timeout_minutes)
    }

    /// Base interval of the post-create backoff.
    pub fn creation_retry_base_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.creation_retry_base_interval_secs).unwrap_or_default()
    }

    /// Interval of the snapshot job.
    pub fn snapshot_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.snapshot_interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_SNAPSHOT_INTERVAL_SECS))
    }

    /// Directory holding the persisted document.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Whether position snapshots and teleports are enabled.
    pub fn rejoin_position_enabled(&self) -> bool {
        self.rejoin_on_restart && self.rejoin_previous_position
    }
}

/// Policy for the online session created at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartingSessionSettings {
    /// Who may see and join the created session.
    pub visibility: SessionVisibility,
    /// Server region the session is created in.
    pub region: SessionRegion,
}

/// Who may see and join a created session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionVisibility {
    /// Anyone.
    Public,
    /// Friends and their friends.
    FriendsOfFriends,
    /// Friends only.
    Friends,
    /// Group members.
    Group,
    /// Invite-only, any member can invite.
    EveryoneCanInvite,
    /// Invite-only, only the owner can invite.
    #[default]
    OwnerMustInvite,
}

impl SessionVisibility {
    /// Name sent to the session API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::FriendsOfFriends => "FriendsOfFriends",
            Self::Friends => "Friends",
            Self::Group => "Group",
            Self::EveryoneCanInvite => "EveryoneCanInvite",
            Self::OwnerMustInvite => "OwnerMustInvite",
        }
    }
}

/// Server region of a created session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionRegion {
    /// Europe.
    #[default]
    Europe,
    /// US west coast.
    UsWest,
    /// US east coast.
    UsEast,
    /// Asia.
    Asia,
}

impl SessionRegion {
    /// Numeric code sent to the session API.
    pub fn code(self) -> u8 {
        match self {
            Self::Europe => 0,
            Self::UsWest => 1,
            Self::UsEast => 2,
            Self::Asia => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = InstancesSettings::default();
        assert!(s.rejoin_on_restart);
        assert!(s.rejoin_previous_position);
        assert!(s.start_in_online_session);
        assert_eq!(s.history_max_count, 10);
        assert_eq!(s.rejoin_timeout(), Some(15));
        assert_eq!(s.creation_retry_base_interval(), Duration::from_secs(1));
        assert_eq!(s.snapshot_interval(), Duration::from_secs(10));
        assert_eq!(s.starting_session.visibility, SessionVisibility::OwnerMustInvite);
        assert_eq!(s.starting_session.region, SessionRegion::Europe);
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(InstancesSettings::default()).unwrap();
        assert!(json.get("rejoinOnRestart").is_some());
        assert!(json.get("historyMaxCount").is_some());
        assert!(json.get("creationRetryBaseIntervalSecs").is_some());
        assert_eq!(json["startingSession"]["visibility"], "ownerMustInvite");
        assert_eq!(json["startingSession"]["region"], "europe");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: InstancesSettings =
            serde_json::from_str(r#"{"historyMaxCount": 3, "startingSession": {"region": "asia"}}"#)
                .unwrap();
        assert_eq!(s.history_max_count, 3);
        assert_eq!(s.starting_session.region, SessionRegion::Asia);
        assert_eq!(s.starting_session.visibility, SessionVisibility::OwnerMustInvite);
        assert!(s.rejoin_on_restart);
    }

    #[test]
    fn negative_timeout_disables_check() {
        let s = InstancesSettings {
            rejoin_timeout_minutes: -1,
            ..InstancesSettings::default()
        };
        assert_eq!(s.rejoin_timeout(), None);
    }

    #[test]
    fn validate_clamps_bad_intervals() {
        let mut s = InstancesSettings {
            creation_retry_base_interval_secs: -2.0,
            snapshot_interval_secs: 0.0,
            ..InstancesSettings::default()
        };
        s.validate();
        assert_eq!(s.creation_retry_base_interval_secs, 0.0);
        assert_eq!(s.snapshot_interval_secs, DEFAULT_SNAPSHOT_INTERVAL_SECS);
        assert_eq!(s.creation_retry_base_interval(), Duration::ZERO);
    }

    #[test]
    fn validate_caps_huge_retry_interval() {
        let mut s = InstancesSettings {
            creation_retry_base_interval_secs: 1e19,
            ..InstancesSettings::default()
        };
        s.validate();
        assert_eq!(s.creation_retry_base_interval_secs, MAX_CREATION_RETRY_BASE_SECS);
        assert_eq!(s.creation_retry_base_interval(), Duration::from_secs(600));
    }

    #[test]
    fn rejoin_position_needs_both_flags() {
        let mut s = InstancesSettings::default();
        assert!(s.rejoin_position_enabled());
        s.rejoin_on_restart = false;
        assert!(!s.rejoin_position_enabled());
    }

    #[test]
    fn region_codes_are_distinct() {
        let codes = [
            SessionRegion::Europe.code(),
            SessionRegion::UsWest.code(),
            SessionRegion::UsEast.code(),
            SessionRegion::Asia.code(),
        ];
        assert_eq!(codes, [0, 1, 2, 3]);
        assert_eq!(SessionVisibility::Friends.as_str(), "Friends");
    }
}
