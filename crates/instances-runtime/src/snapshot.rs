//! Periodic rejoin-location snapshots.

use std::sync::Arc;
use std::time::Duration;

use instances_core::RejoinLocation;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::RejoinContext;

/// Overwrite `rejoinLocation` with the participant's current pose.
///
/// Only runs when both rejoin toggles are on, the host reports a session
/// equal to `lastSession`, and the participant can move freely. The stored
/// rotation keeps only yaw. Returns whether a snapshot was written.
pub fn capture_rejoin_location(ctx: &RejoinContext) -> bool {
    if !ctx.settings().rejoin_position_enabled() {
        return false;
    }
    let Some(current) = ctx.host().current_session() else {
        return false;
    };
    if current.session_id.is_empty()
        || !ctx.read(|state| state.last_session_id() == Some(current.session_id.as_str()))
    {
        return false;
    }
    let Some(pose) = ctx.host().participant_pose() else {
        return false;
    };

    let location = RejoinLocation::capture(current.session_id, pose.upright(), ctx.now());
    ctx.mutate(|state| state.rejoin_location = Some(location));
    debug!("rejoin location updated");
    true
}

/// Background task calling [`capture_rejoin_location`] every `period`.
pub struct SnapshotJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SnapshotJob {
    /// Start the job on the current tokio runtime. The first snapshot is
    /// taken one `period` after the start.
    pub fn spawn(ctx: Arc<RejoinContext>, period: Duration, cancel: CancellationToken) -> Self {
        let handle = tokio::spawn(run_snapshots(ctx, period, cancel.clone()));
        Self { cancel, handle }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "snapshot job ended abnormally");
        }
    }
}

async fn run_snapshots(ctx: Arc<RejoinContext>, period: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(?period, "snapshot job started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let _ = capture_rejoin_location(&ctx);
            }
        }
    }
    debug!("snapshot job stopped");
}
