//! Post-join teleport to the stored rejoin location.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use instances_core::InstancesEvent;
use instances_core::constants::TELEPORT_TIMEOUT_MINUTES;
use tracing::{debug, info};

use crate::context::RejoinContext;

/// What [`TeleportGate::try_teleport`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeleportDecision {
    /// The participant was moved.
    Teleported,
    /// All conditions held but the snapshot was too old.
    Stale,
    /// A teleport was already attempted since the last world enter.
    AlreadyConsumed,
    /// Some precondition did not hold.
    NotApplicable,
}

/// Allows at most one teleport attempt per world enter.
pub struct TeleportGate {
    ctx: Arc<RejoinContext>,
    consumed: AtomicBool,
}

impl TeleportGate {
    /// Create a gate over `ctx`. Starts un-consumed.
    pub fn new(ctx: Arc<RejoinContext>) -> Self {
        Self {
            ctx,
            consumed: AtomicBool::new(false),
        }
    }

    /// The host entered a new world. Re-arms the gate.
    pub fn reset(&self) {
        self.consumed.store(false, Ordering::Release);
    }

    /// Whether an attempt already happened since the last reset.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Teleport to the stored location if it belongs to `session_id`.
    ///
    /// Requires both rejoin toggles, a location marked for teleport in this
    /// session, and a participant able to move freely. The gate is consumed
    /// only once those hold; a snapshot older than
    /// [`TELEPORT_TIMEOUT_MINUTES`] then consumes it without moving.
    pub fn try_teleport(&self, session_id: &str) -> TeleportDecision {
        if self.is_consumed() {
            return TeleportDecision::AlreadyConsumed;
        }
        if !self.ctx.settings().rejoin_position_enabled() {
            return TeleportDecision::NotApplicable;
        }
        let Some(location) = self.ctx.read(|state| {
            state
                .rejoin_location_for(session_id)
                .filter(|loc| loc.attempt_to_teleport)
                .cloned()
        }) else {
            return TeleportDecision::NotApplicable;
        };
        if self.ctx.host().participant_pose().is_none() {
            debug!(session_id, "participant can't move freely, not teleporting");
            return TeleportDecision::NotApplicable;
        }

        if self
            .consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TeleportDecision::AlreadyConsumed;
        }

        if location.older_than_minutes(self.ctx.now(), TELEPORT_TIMEOUT_MINUTES) {
            info!(
                session_id,
                timeout_minutes = TELEPORT_TIMEOUT_MINUTES,
                "previous location is too old, not teleporting"
            );
            return TeleportDecision::Stale;
        }

        info!(session_id, "teleporting to previous location");
        self.ctx.host().teleport(&location.pose());
        let _ = self.ctx.emitter().emit(InstancesEvent::Teleported {
            session_id: session_id.to_owned(),
        });
        TeleportDecision::Teleported
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use instances_core::{PersistedState, Pose, RejoinLocation, Vec3};
    use instances_settings::InstancesSettings;

    use super::*;
    use crate::testutil::TestHarness;

    fn stored_pose() -> Pose {
        Pose {
            position: Vec3::new(4.0, 1.0, -2.0),
            rotation_euler: Vec3::new(0.0, 90.0, 0.0),
        }
    }

    fn state_with_location(session_id: &str, age: TimeDelta) -> PersistedState {
        PersistedState {
            rejoin_location: Some(RejoinLocation::capture(
                session_id,
                stored_pose(),
                TestHarness::start_time() - age,
            )),
            ..PersistedState::default()
        }
    }

    fn harness(state: PersistedState, settings: InstancesSettings) -> (TestHarness, TeleportGate) {
        let harness = TestHarness::with_state(state, settings);
        harness.host.set_pose(Some(Pose::default()));
        let gate = TeleportGate::new(Arc::clone(&harness.ctx));
        (harness, gate)
    }

    #[test]
    fn teleports_once_per_world_enter() {
        let (harness, gate) = harness(
            state_with_location("s1", TimeDelta::minutes(1)),
            InstancesSettings::default(),
        );

        assert_eq!(gate.try_teleport("s1"), TeleportDecision::Teleported);
        assert_eq!(gate.try_teleport("s1"), TeleportDecision::AlreadyConsumed);
        assert_eq!(harness.host.teleports(), vec![stored_pose()]);

        gate.reset();
        assert_eq!(gate.try_teleport("s1"), TeleportDecision::Teleported);
        assert_eq!(harness.host.teleports().len(), 2);
    }

    #[test]
    fn location_of_another_session_is_never_applied() {
        let (harness, gate) = harness(
            state_with_location("s-old", TimeDelta::minutes(1)),
            InstancesSettings::default(),
        );

        assert_eq!(gate.try_teleport("s-new"), TeleportDecision::NotApplicable);
        assert!(!gate.is_consumed());
        assert!(harness.host.teleports().is_empty());
    }

    #[test]
    fn stale_location_consumes_without_moving() {
        let (harness, gate) = harness(
            state_with_location("s1", TimeDelta::minutes(6)),
            InstancesSettings::default(),
        );

        assert_eq!(gate.try_teleport("s1"), TeleportDecision::Stale);
        assert!(gate.is_consumed());
        assert!(harness.host.teleports().is_empty());
    }

    #[test]
    fn requires_free_movement() {
        let (harness, gate) = harness(
            state_with_location("s1", TimeDelta::minutes(1)),
            InstancesSettings::default(),
        );
        harness.host.set_pose(None);

        assert_eq!(gate.try_teleport("s1"), TeleportDecision::NotApplicable);
        assert!(!gate.is_consumed());
    }

    #[test]
    fn requires_both_toggles() {
        let settings = InstancesSettings {
            rejoin_previous_position: false,
            ..InstancesSettings::default()
        };
        let (harness, gate) = harness(state_with_location("s1", TimeDelta::minutes(1)), settings);

        assert_eq!(gate.try_teleport("s1"), TeleportDecision::NotApplicable);
        assert!(harness.host.teleports().is_empty());
    }

    #[test]
    fn location_not_marked_for_teleport_is_ignored() {
        let mut state = state_with_location("s1", TimeDelta::minutes(1));
        if let Some(loc) = state.rejoin_location.as_mut() {
            loc.attempt_to_teleport = false;
        }
        let (_harness, gate) = harness(state, InstancesSettings::default());

        assert_eq!(gate.try_teleport("s1"), TeleportDecision::NotApplicable);
    }
}
