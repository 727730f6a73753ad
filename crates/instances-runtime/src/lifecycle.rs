//! Host lifecycle facade.
//!
//! [`Instances`] is the one object the integration layer holds. It loads
//! the persisted document, owns the write worker and the snapshot job, and
//! maps host lifecycle signals onto the orchestrator, teleport gate and
//! history manager.

use std::sync::Arc;

use instances_core::constants::TELEPORT_TIMEOUT_MINUTES;
use instances_core::{InstancesEvent, PersistedState};
use instances_settings::InstancesSettings;
use instances_store::{ConfigStore, ConfigWriter, WriterHealth};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::context::RejoinContext;
use crate::errors::Result;
use crate::history::HistoryManager;
use crate::host::{Host, SessionApi};
use crate::orchestrator::{RejoinOrchestrator, RejoinOutcome};
use crate::restart::relaunched_by_instances;
use crate::snapshot::{SnapshotJob, capture_rejoin_location};
use crate::teleport::TeleportGate;

/// The rejoin subsystem, wired to a host.
pub struct Instances {
    ctx: Arc<RejoinContext>,
    orchestrator: RejoinOrchestrator,
    teleport: TeleportGate,
    snapshot: Mutex<Option<SnapshotJob>>,
    cancel: CancellationToken,
}

impl Instances {
    /// Load the document from `settings.data_dir` and start the writer.
    pub fn open(
        settings: InstancesSettings,
        api: Arc<dyn SessionApi>,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        let store = ConfigStore::new(settings.data_dir());
        let loaded = store.load();
        info!(
            source = ?loaded.source,
            sessions = loaded.state.recent_sessions.len(),
            "persisted state loaded"
        );
        let writer = Arc::new(ConfigWriter::spawn(store)?);
        let ctx = RejoinContext::new(loaded.state, Arc::new(settings), writer, api, host);
        Ok(Self::from_context(Arc::new(ctx)))
    }

    /// Wrap an already built context.
    pub fn from_context(ctx: Arc<RejoinContext>) -> Self {
        Self {
            orchestrator: RejoinOrchestrator::new(Arc::clone(&ctx)),
            teleport: TeleportGate::new(Arc::clone(&ctx)),
            snapshot: Mutex::new(None),
            cancel: CancellationToken::new(),
            ctx,
        }
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<RejoinContext> {
        &self.ctx
    }

    /// History manager.
    pub fn history(&self) -> &HistoryManager {
        self.orchestrator.history()
    }

    /// Process start: honor the restart marker, then run the startup flow.
    #[instrument(skip(self, args))]
    pub async fn on_process_start<I, S>(&self, args: I, force_offline: bool) -> RejoinOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if relaunched_by_instances(args) {
            info!("restart marker present, applying relaxed content policy");
            self.ctx.host().apply_relaxed_content_policy();
        }
        self.orchestrator.startup(force_offline).await
    }

    /// The host populated the current session's info.
    ///
    /// Starts the snapshot job on first call, tries the post-join teleport,
    /// and records the session in history. Returns whether a history
    /// record was written.
    pub async fn on_session_info_available(&self) -> bool {
        let Some(current) = self.ctx.host().current_session() else {
            debug!("session info signalled without a current session");
            return false;
        };
        self.ensure_snapshot_job();
        let _ = self.teleport.try_teleport(&current.session_id);
        self.history().record_current(current).await
    }

    /// The host entered a new world. Re-arms the teleport gate.
    pub fn on_world_entered(&self) {
        self.teleport.reset();
    }

    /// Join a session picked by the user.
    pub async fn select_session(&self, session_id: &str) -> RejoinOutcome {
        self.orchestrator.select_session(session_id).await
    }

    /// Process quit: stop the snapshot job, take a final snapshot, and
    /// drain the writer. Returns once every queued write is on disk.
    #[instrument(skip_all)]
    pub async fn on_process_quit(&self) {
        self.cancel.cancel();
        let job = self.snapshot.lock().take();
        if let Some(job) = job {
            job.stop().await;
        }

        info!(
            timeout_minutes = TELEPORT_TIMEOUT_MINUTES,
            "saving current location for the next rejoin"
        );
        let _ = capture_rejoin_location(&self.ctx);

        let writer = Arc::clone(self.ctx.writer());
        if let Err(e) = tokio::task::spawn_blocking(move || writer.shutdown()).await {
            error!(error = %e, "config writer shutdown failed");
        }
    }

    /// Replace the settings. A changed history bound is applied right away.
    pub fn update_settings(&self, mut settings: InstancesSettings) {
        settings.validate();
        let previous_max = self.ctx.settings().history_max_count;
        let new_max = settings.history_max_count;
        self.ctx.set_settings(Arc::new(settings));
        if new_max != previous_max {
            let _ = self.history().apply_limit();
        }
    }

    /// Copy of the in-memory document.
    pub fn state(&self) -> PersistedState {
        self.ctx.snapshot()
    }

    /// Subscribe to subsystem events.
    pub fn subscribe(&self) -> broadcast::Receiver<InstancesEvent> {
        self.ctx.emitter().subscribe()
    }

    /// Health of the write worker.
    pub fn writer_health(&self) -> WriterHealth {
        self.ctx.writer().health()
    }

    /// Whether the snapshot job has been started and is running.
    pub fn snapshot_job_running(&self) -> bool {
        self.snapshot
            .lock()
            .as_ref()
            .is_some_and(SnapshotJob::is_running)
    }

    fn ensure_snapshot_job(&self) {
        let mut slot = self.snapshot.lock();
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let period = self.ctx.settings().snapshot_interval();
        info!(?period, "starting rejoin location snapshots");
        *slot = Some(SnapshotJob::spawn(
            Arc::clone(&self.ctx),
            period,
            self.cancel.child_token(),
        ));
    }
}
