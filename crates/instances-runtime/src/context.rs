//! Shared state of one running subsystem.
//!
//! [`RejoinContext`] owns the in-memory [`PersistedState`], the current
//! settings, the write worker handle, the host seams and the in-flight
//! flag. The orchestrator, history manager, teleport gate and snapshot job
//! all receive an `Arc<RejoinContext>`; nothing is process-global.
//!
//! The state lock is never held across an `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use instances_core::{InstancesEvent, PersistedState};
use instances_settings::InstancesSettings;
use instances_store::ConfigWriter;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::event_emitter::EventEmitter;
use crate::host::{Clock, Host, SessionApi, SystemClock};

/// Shared context handed to every runtime component.
pub struct RejoinContext {
    state: Mutex<PersistedState>,
    settings: RwLock<Arc<InstancesSettings>>,
    writer: Arc<ConfigWriter>,
    api: Arc<dyn SessionApi>,
    host: Arc<dyn Host>,
    emitter: Arc<EventEmitter>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
}

impl RejoinContext {
    /// Build a context around an already loaded document.
    pub fn new(
        state: PersistedState,
        settings: Arc<InstancesSettings>,
        writer: Arc<ConfigWriter>,
        api: Arc<dyn SessionApi>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            settings: RwLock::new(settings),
            writer,
            api,
            host,
            emitter: Arc::new(EventEmitter::new()),
            clock: Arc::new(SystemClock),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Builder: replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> Arc<InstancesSettings> {
        Arc::clone(&self.settings.read())
    }

    /// Replace the settings.
    pub fn set_settings(&self, settings: Arc<InstancesSettings>) {
        *self.settings.write() = settings;
    }

    /// Session API seam.
    pub fn api(&self) -> &dyn SessionApi {
        self.api.as_ref()
    }

    /// Host seam.
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Event emitter.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// Write worker handle.
    pub fn writer(&self) -> &Arc<ConfigWriter> {
        &self.writer
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Copy of the in-memory document.
    pub fn snapshot(&self) -> PersistedState {
        self.state.lock().clone()
    }

    /// Read the document without saving.
    pub fn read<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Mutate the document, then queue a save and emit `StateChanged`.
    ///
    /// The document is serialized and queued while the lock is held, so the
    /// order of queued writes matches the order of mutations.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let result = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            if let Err(e) = self.writer.save(&state) {
                warn!(error = %e, "could not queue config save, change kept in memory");
            }
            result
        };
        let _ = self.emitter.emit(InstancesEvent::StateChanged);
        result
    }

    /// Queue a save of the current document.
    pub fn save(&self) {
        self.mutate(|_| ());
    }

    /// Claim the in-flight flag. `None` if a flow is already running.
    pub fn try_begin_flow(&self) -> Option<FlowGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlowGuard {
                flag: &self.in_flight,
            })
    }

    /// Whether a rejoin or create flow is running.
    pub fn flow_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Holds the in-flight flag. Released on drop.
#[must_use = "the flow ends when the guard is dropped"]
pub struct FlowGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
