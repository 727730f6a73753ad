//! Rejoin orchestrator.
//!
//! Decides which session the participant ends up in:
//!
//! ```text
//! Idle → Resolving → Joined
//!                  → Creating → Joined
//!                             → Offline
//! ```
//!
//! One flow runs at a time. A trigger that arrives while a flow is running
//! returns [`RejoinOutcome::Busy`] without doing anything.

use std::sync::Arc;

use instances_core::InstancesEvent;
use instances_core::constants::{CREATE_JOIN_ATTEMPTS, GROUP_ID};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::context::RejoinContext;
use crate::history::HistoryManager;
use crate::host::{CreateSessionRequest, SessionDetails, SessionLookup};

/// Title of the notice shown when a selected session is gone.
pub const UNAVAILABLE_NOTICE_TITLE: &str = "Instance not Available";
/// Body of the notice shown when a selected session is gone.
pub const UNAVAILABLE_NOTICE_MESSAGE: &str =
    "The instance you're trying to join was deleted or you don't have permission to join it.";

/// How a flow ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejoinOutcome {
    /// A join directive was issued.
    Joined {
        /// Session joined.
        session_id: String,
        /// World of the session.
        world_id: String,
    },
    /// The offline destination was loaded.
    Offline {
        /// Offline world loaded.
        world_id: String,
    },
    /// A user-selected session could not be joined. Nothing was loaded.
    Unavailable {
        /// Session that was requested.
        session_id: String,
    },
    /// Another flow was running; this trigger was ignored.
    Busy,
}

impl RejoinOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::Offline { .. } => "offline",
            Self::Unavailable { .. } => "unavailable",
            Self::Busy => "busy",
        }
    }
}

/// The rejoin/create state machine.
pub struct RejoinOrchestrator {
    ctx: Arc<RejoinContext>,
    history: HistoryManager,
}

impl RejoinOrchestrator {
    /// Create an orchestrator over `ctx`.
    pub fn new(ctx: Arc<RejoinContext>) -> Self {
        let history = HistoryManager::new(Arc::clone(&ctx));
        Self { ctx, history }
    }

    /// History manager sharing this orchestrator's context.
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Startup flow: rejoin the last session, or create one, or go offline.
    ///
    /// `force_offline` skips every lookup and loads the offline destination.
    #[instrument(skip(self))]
    pub async fn startup(&self, force_offline: bool) -> RejoinOutcome {
        let Some(_guard) = self.ctx.try_begin_flow() else {
            return busy();
        };
        finish(self.startup_flow(force_offline).await)
    }

    /// Join a session picked by the user (non-initial attempt).
    ///
    /// A session that no longer exists is invalidated and reported with a
    /// notice; the participant stays where they are.
    #[instrument(skip(self))]
    pub async fn select_session(&self, session_id: &str) -> RejoinOutcome {
        let Some(_guard) = self.ctx.try_begin_flow() else {
            return busy();
        };
        finish(self.rejoin(session_id, false).await)
    }

    async fn startup_flow(&self, force_offline: bool) -> RejoinOutcome {
        if force_offline {
            info!("offline start requested, skipping rejoin");
            return self.load_offline();
        }

        let settings = self.ctx.settings();
        let now = self.ctx.now();
        let (last, stale) = self.ctx.read(|state| {
            let stale = match (settings.rejoin_timeout(), &state.rejoin_location) {
                (Some(minutes), Some(location)) => location.older_than_minutes(now, minutes),
                _ => false,
            };
            (state.last_session.clone(), stale)
        });

        match last {
            Some(last) if settings.rejoin_on_restart => {
                if !stale {
                    return self.rejoin(&last.session_id, true).await;
                }
                info!(
                    session_id = %last.session_id,
                    timeout_minutes = settings.rejoin_timeout_minutes,
                    "last session is stale, not rejoining"
                );
            }
            Some(_) => debug!("rejoin on restart disabled"),
            None => debug!("no last session to rejoin"),
        }

        self.initial_fallback().await
    }

    async fn rejoin(&self, session_id: &str, is_initial: bool) -> RejoinOutcome {
        match self.ctx.api().session_details(session_id).await {
            Ok(SessionLookup::Found(details)) => {
                info!(session_id, name = %details.name, "session is still up, joining");
                return self.join(&details);
            }
            Ok(SessionLookup::NotFound(reason)) => {
                warn!(session_id, %reason, "session can't be found");
            }
            Err(e) => warn!(session_id, error = %e, "session lookup failed"),
        }

        let _ = self.history.invalidate(session_id);

        if is_initial {
            return self.initial_fallback().await;
        }

        info!(session_id, "selected session is not available");
        self.ctx
            .host()
            .show_notice(UNAVAILABLE_NOTICE_TITLE, UNAVAILABLE_NOTICE_MESSAGE);
        let _ = self.ctx.emitter().emit(InstancesEvent::SessionUnavailable {
            session_id: session_id.to_owned(),
        });
        RejoinOutcome::Unavailable {
            session_id: session_id.to_owned(),
        }
    }

    async fn initial_fallback(&self) -> RejoinOutcome {
        if self.ctx.settings().start_in_online_session {
            self.create_and_join().await
        } else {
            self.load_offline()
        }
    }

    /// Create a session in the home world and wait for it to come up.
    ///
    /// Creation itself is not retried. Availability is checked up to
    /// [`CREATE_JOIN_ATTEMPTS`] times, waiting `base * attempt` before each
    /// check.
    async fn create_and_join(&self) -> RejoinOutcome {
        let settings = self.ctx.settings();
        let request = CreateSessionRequest {
            world_id: self.ctx.host().home_world_id(),
            visibility: settings.starting_session.visibility,
            region: settings.starting_session.region,
            group_id: GROUP_ID.to_owned(),
        };

        info!(
            world_id = %request.world_id,
            visibility = request.visibility.as_str(),
            region = request.region.code(),
            group_id = %request.group_id,
            "creating online session"
        );
        let created = match self.ctx.api().create_session(&request).await {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "failed to create an online session, going offline");
                return self.load_offline();
            }
        };
        info!(
            session_id = %created.id,
            name = %created.name,
            region = %created.region,
            "created online session"
        );

        let base = settings.creation_retry_base_interval();
        for attempt in 1..=CREATE_JOIN_ATTEMPTS {
            tokio::time::sleep(base * attempt).await;

            match self.ctx.api().session_details(&created.id).await {
                Ok(SessionLookup::Found(details)) => {
                    info!(session_id = %details.id, attempt, "created session is up, joining");
                    return self.join(&details);
                }
                Ok(SessionLookup::NotFound(reason)) => warn!(
                    session_id = %created.id,
                    attempt,
                    max_attempts = CREATE_JOIN_ATTEMPTS,
                    %reason,
                    "created session is not up yet"
                ),
                Err(e) => warn!(
                    session_id = %created.id,
                    attempt,
                    max_attempts = CREATE_JOIN_ATTEMPTS,
                    error = %e,
                    "created session lookup failed"
                ),
            }
        }

        warn!(session_id = %created.id, "created session never came up, going offline");
        self.load_offline()
    }

    fn join(&self, details: &SessionDetails) -> RejoinOutcome {
        if let Some(url) = &details.world_image_url {
            let _ = self.history.update_world_image(&details.world_id, url);
        }
        self.ctx
            .host()
            .set_join_target(&details.id, &details.world_id);
        let _ = self.ctx.emitter().emit(InstancesEvent::JoinIssued {
            session_id: details.id.clone(),
            world_id: details.world_id.clone(),
        });
        RejoinOutcome::Joined {
            session_id: details.id.clone(),
            world_id: details.world_id.clone(),
        }
    }

    fn load_offline(&self) -> RejoinOutcome {
        let world_id = self.ctx.host().home_world_id();
        info!(%world_id, "loading offline home world");
        self.ctx.host().load_offline_world(&world_id);
        let _ = self.ctx.emitter().emit(InstancesEvent::OfflineFallback {
            world_id: world_id.clone(),
        });
        RejoinOutcome::Offline { world_id }
    }
}

fn busy() -> RejoinOutcome {
    debug!("session change already in progress, ignoring trigger");
    finish(RejoinOutcome::Busy)
}

fn finish(outcome: RejoinOutcome) -> RejoinOutcome {
    counter!("instances_rejoin_attempts_total", "outcome" => outcome.label()).increment(1);
    outcome
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::TimeDelta;
    use instances_core::{PersistedState, Pose, RejoinLocation, SessionRecord};
    use instances_settings::{InstancesSettings, SessionRegion, SessionVisibility};

    use super::*;
    use crate::errors::ApiError;
    use crate::testutil::{HOME_WORLD, TestHarness, created, details};

    fn with_last(id: &str) -> PersistedState {
        let mut state = PersistedState::default();
        state.record_session(SessionRecord::new(id, "w-last", "Last"), 10);
        state
    }

    fn settings(f: impl FnOnce(&mut InstancesSettings)) -> InstancesSettings {
        let mut s = InstancesSettings::default();
        f(&mut s);
        s
    }

    fn orchestrator(harness: &TestHarness) -> RejoinOrchestrator {
        RejoinOrchestrator::new(Arc::clone(&harness.ctx))
    }

    // ── rejoin last session ─────────────────────────────────────────

    #[tokio::test]
    async fn rejoins_last_session_when_it_is_up() {
        let harness = TestHarness::with_state(with_last("s1"), InstancesSettings::default());
        harness.api.insert_session(SessionDetails {
            world_image_url: Some("https://img".into()),
            ..details("s1", "w-last")
        });

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Joined { ref session_id, .. } if session_id == "s1");
        assert_eq!(harness.host.joins(), vec![("s1".into(), "w-last".into())]);
        assert!(harness.api.create_times().is_empty());
        let saved = harness.reload();
        assert_eq!(
            saved.last_session.unwrap().world_image_url.as_deref(),
            Some("https://img")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gone_last_session_is_invalidated_then_created() {
        let harness = TestHarness::with_state(with_last("gone"), InstancesSettings::default());
        harness.api.push_create(Ok(created("new")));
        harness.api.insert_session(details("new", HOME_WORLD));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Joined { ref session_id, .. } if session_id == "new");
        let saved = harness.reload();
        assert!(saved.last_session.is_none());
        assert!(saved.recent_sessions.is_empty());
        assert!(harness.host.notices().is_empty());
    }

    #[tokio::test]
    async fn gone_last_session_goes_offline_without_online_start() {
        let harness = TestHarness::with_state(
            with_last("gone"),
            settings(|s| s.start_in_online_session = false),
        );

        let outcome = orchestrator(&harness).startup(false).await;

        assert_eq!(
            outcome,
            RejoinOutcome::Offline {
                world_id: HOME_WORLD.into()
            }
        );
        assert_eq!(harness.host.offline_loads(), vec![HOME_WORLD.to_string()]);
        assert!(harness.reload().last_session.is_none());
    }

    #[tokio::test]
    async fn lookup_error_is_treated_like_not_found() {
        let harness = TestHarness::with_state(
            with_last("s1"),
            settings(|s| s.start_in_online_session = false),
        );
        harness
            .api
            .push_lookup("s1", Err(ApiError::Transport("timed out".into())));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        assert!(harness.reload().last_session.is_none());
    }

    #[tokio::test]
    async fn stale_last_session_is_skipped_but_kept() {
        let mut state = with_last("s1");
        state.rejoin_location = Some(RejoinLocation::capture(
            "s1",
            Pose::default(),
            TestHarness::start_time() - TimeDelta::minutes(16),
        ));
        let harness = TestHarness::with_state(state, settings(|s| s.start_in_online_session = false));
        harness.api.insert_session(details("s1", "w-last"));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        assert_eq!(harness.api.lookup_count("s1"), 0);
        assert_eq!(harness.reload().last_session_id(), Some("s1"));
    }

    #[tokio::test]
    async fn negative_timeout_disables_staleness_check() {
        let mut state = with_last("s1");
        state.rejoin_location = Some(RejoinLocation::capture(
            "s1",
            Pose::default(),
            TestHarness::start_time() - TimeDelta::days(30),
        ));
        let harness = TestHarness::with_state(state, settings(|s| s.rejoin_timeout_minutes = -1));
        harness.api.insert_session(details("s1", "w-last"));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Joined { .. });
    }

    #[tokio::test]
    async fn huge_timeout_never_expires() {
        let mut state = with_last("s1");
        state.rejoin_location = Some(RejoinLocation::capture(
            "s1",
            Pose::default(),
            TestHarness::start_time() - TimeDelta::minutes(1),
        ));
        let harness = TestHarness::with_state(state, settings(|s| s.rejoin_timeout_minutes = i64::MAX));
        harness.api.insert_session(details("s1", "w-last"));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Joined { ref session_id, .. } if session_id == "s1");
    }

    #[tokio::test]
    async fn missing_rejoin_location_skips_staleness_check() {
        let harness = TestHarness::with_state(with_last("s1"), InstancesSettings::default());
        harness.api.insert_session(details("s1", "w-last"));

        let outcome = orchestrator(&harness).startup(false).await;
        assert_matches!(outcome, RejoinOutcome::Joined { .. });
    }

    #[tokio::test]
    async fn rejoin_disabled_makes_no_lookup() {
        let harness = TestHarness::with_state(
            with_last("s1"),
            settings(|s| {
                s.rejoin_on_restart = false;
                s.start_in_online_session = false;
            }),
        );

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        assert!(harness.api.calls().is_empty());
    }

    #[tokio::test]
    async fn forced_offline_start_makes_no_calls() {
        let harness = TestHarness::with_state(with_last("s1"), InstancesSettings::default());

        let outcome = orchestrator(&harness).startup(true).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        assert!(harness.api.calls().is_empty());
        assert_eq!(harness.reload().last_session_id(), Some("s1"));
    }

    // ── creating ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn create_uses_starting_session_policy() {
        let harness = TestHarness::with_state(
            PersistedState::default(),
            settings(|s| {
                s.starting_session.visibility = SessionVisibility::Friends;
                s.starting_session.region = SessionRegion::Asia;
            }),
        );
        harness.api.push_create(Ok(created("new")));
        harness.api.insert_session(details("new", HOME_WORLD));

        let _ = orchestrator(&harness).startup(false).await;

        let requests = harness.api.create_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].world_id, HOME_WORLD);
        assert_eq!(requests[0].visibility, SessionVisibility::Friends);
        assert_eq!(requests[0].region, SessionRegion::Asia);
        assert_eq!(requests[0].group_id, GROUP_ID);
    }

    #[tokio::test(start_paused = true)]
    async fn create_failure_is_not_retried() {
        let harness = TestHarness::new();
        harness
            .api
            .push_create(Err(ApiError::Rejected("rate limited".into())));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        assert_eq!(harness.api.create_times().len(), 1);
        assert_eq!(harness.api.lookup_count("new"), 0);
        assert_eq!(harness.host.offline_loads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn post_create_lookups_back_off_linearly_then_go_offline() {
        let harness = TestHarness::with_state(
            PersistedState::default(),
            settings(|s| s.creation_retry_base_interval_secs = 2.0),
        );
        harness.api.push_create(Ok(created("new")));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Offline { .. });
        let created_at = harness.api.create_times()[0];
        let lookups = harness.api.lookup_times("new");
        assert_eq!(lookups.len(), 3);
        let base = Duration::from_secs(2);
        assert_eq!(lookups[0] - created_at, base);
        assert_eq!(lookups[1] - lookups[0], base * 2);
        assert_eq!(lookups[2] - lookups[1], base * 3);
        assert!(harness.host.joins().is_empty());
        assert_eq!(harness.host.offline_loads(), vec![HOME_WORLD.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn created_session_joined_on_second_attempt() {
        let harness = TestHarness::new();
        harness.api.push_create(Ok(created("new")));
        harness
            .api
            .push_lookup("new", Ok(SessionLookup::NotFound("starting".into())));
        harness
            .api
            .push_lookup("new", Ok(SessionLookup::Found(details("new", HOME_WORLD))));

        let outcome = orchestrator(&harness).startup(false).await;

        assert_matches!(outcome, RejoinOutcome::Joined { .. });
        assert_eq!(harness.api.lookup_count("new"), 2);
        assert_eq!(harness.host.joins().len(), 1);
        assert!(harness.host.offline_loads().is_empty());
    }

    // ── user selection ──────────────────────────────────────────────

    #[tokio::test]
    async fn selecting_gone_session_shows_notice_and_stays() {
        let harness = TestHarness::with_state(with_last("s1"), InstancesSettings::default());

        let outcome = orchestrator(&harness).select_session("s1").await;

        assert_eq!(
            outcome,
            RejoinOutcome::Unavailable {
                session_id: "s1".into()
            }
        );
        assert_eq!(harness.host.notices().len(), 1);
        assert_eq!(harness.host.notices()[0].0, UNAVAILABLE_NOTICE_TITLE);
        assert!(harness.host.offline_loads().is_empty());
        assert!(harness.api.create_times().is_empty());
        assert!(harness.reload().last_session.is_none());
    }

    #[tokio::test]
    async fn selecting_live_session_joins_it() {
        let harness = TestHarness::new();
        harness.api.insert_session(details("s2", "w2"));

        let outcome = orchestrator(&harness).select_session("s2").await;

        assert_matches!(outcome, RejoinOutcome::Joined { ref world_id, .. } if world_id == "w2");
    }

    // ── in-flight guard ─────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_creating_is_ignored() {
        let harness = TestHarness::new();
        harness.api.push_create(Ok(created("new")));
        harness.api.insert_session(details("new", HOME_WORLD));
        harness.api.insert_session(details("other", "w2"));
        let orchestrator = orchestrator(&harness);

        let (first, second) = tokio::join!(
            orchestrator.startup(false),
            orchestrator.select_session("other")
        );

        assert_matches!(first, RejoinOutcome::Joined { .. });
        assert_eq!(second, RejoinOutcome::Busy);
        assert_eq!(harness.host.joins().len(), 1);
        assert_eq!(harness.api.lookup_count("other"), 0);

        // The guard is released once the first flow ends.
        let third = orchestrator.select_session("other").await;
        assert_matches!(third, RejoinOutcome::Joined { .. });
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(RejoinOutcome::Busy.label(), "busy");
        assert_eq!(
            RejoinOutcome::Offline {
                world_id: "w".into()
            }
            .label(),
            "offline"
        );
    }
}
