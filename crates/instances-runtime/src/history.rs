//! History manager.
//!
//! Every operation mutates the shared document through
//! [`RejoinContext::mutate`], so each change is queued for saving.

use std::sync::Arc;

use instances_core::{InstancesEvent, SessionRecord};
use tracing::{debug, info, instrument, warn};

use crate::context::RejoinContext;
use crate::host::{CurrentSession, SessionLookup};

/// Maintains `lastSession` and the bounded recent-sessions list.
#[derive(Clone)]
pub struct HistoryManager {
    ctx: Arc<RejoinContext>,
}

impl HistoryManager {
    /// Create a manager over `ctx`.
    pub fn new(ctx: Arc<RejoinContext>) -> Self {
        Self { ctx }
    }

    /// Make `record` the last session and the head of the history.
    #[instrument(skip_all, fields(session_id = %record.session_id))]
    pub fn record(&self, record: SessionRecord) {
        let max = self.ctx.settings().history_max_count;
        self.ctx.mutate(|state| state.record_session(record, max));
        debug!("session recorded");
    }

    /// Forget a session that no longer exists.
    ///
    /// Returns whether anything was removed. A save is queued either way.
    #[instrument(skip(self))]
    pub fn invalidate(&self, session_id: &str) -> bool {
        let changed = self.ctx.mutate(|state| state.invalidate_session(session_id));
        if changed {
            info!("session invalidated");
            let _ = self.ctx.emitter().emit(InstancesEvent::SessionInvalidated {
                session_id: session_id.to_owned(),
            });
        }
        changed
    }

    /// Backfill the image of every record of `world_id`.
    pub fn update_world_image(&self, world_id: &str, url: &str) -> usize {
        self.ctx
            .mutate(|state| state.update_world_image(world_id, url))
    }

    /// Re-apply the configured history bound. Returns how many were dropped.
    pub fn apply_limit(&self) -> usize {
        let max = self.ctx.settings().history_max_count;
        let dropped = self.ctx.mutate(|state| state.apply_history_limit(max));
        if dropped > 0 {
            info!(dropped, max, "history trimmed");
        }
        dropped
    }

    /// Record the session the host reports the participant is in.
    ///
    /// Skipped when it already is the last session. The world image comes
    /// from any history entry of the same world; otherwise one lookup is
    /// made, and a failed lookup leaves the image empty. Returns whether a
    /// record was written.
    #[instrument(skip_all, fields(session_id = %current.session_id))]
    pub async fn record_current(&self, current: CurrentSession) -> bool {
        let (already_last, cached) = self.ctx.read(|state| {
            (
                state.last_session_id() == Some(current.session_id.as_str()),
                state.cached_world_image(&current.world_id).map(str::to_owned),
            )
        });
        if already_last {
            return false;
        }

        let image = match cached {
            Some(url) => Some(url),
            None => match self.ctx.api().session_details(&current.session_id).await {
                Ok(SessionLookup::Found(details)) => details.world_image_url,
                Ok(SessionLookup::NotFound(reason)) => {
                    debug!(%reason, "no details for current session");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "world image lookup failed");
                    None
                }
            },
        };

        let mut record = SessionRecord::new(current.session_id, current.world_id, current.name);
        record.world_image_url = image;
        self.record(record);
        true
    }
}
