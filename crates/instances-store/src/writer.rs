//! Background write worker.
//!
//! A single named thread owns all disk writes. Producers hand it complete
//! serialized documents over an unbounded channel, so [`ConfigWriter::enqueue`]
//! never waits on disk. Requests are applied strictly in enqueue order.
//!
//! Disk errors do not stop the worker: the failed document is dropped, the
//! error is logged, and [`WriterHealth`] turns unhealthy until the next
//! successful write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use instances_core::PersistedState;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::errors::{Result, StoreError};
use crate::files::ConfigStore;

/// Name of the writer thread.
pub const WRITER_THREAD_NAME: &str = "instances-config-writer";

enum WriteRequest {
    Document(String),
    /// Barrier: acknowledged once every earlier request has been applied.
    Flush(mpsc::SyncSender<()>),
}

/// Point-in-time view of the writer's health.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriterHealth {
    /// False after a failed write, until the next successful one.
    pub healthy: bool,
    /// Documents written successfully.
    pub writes: u64,
    /// Documents dropped because the write failed.
    pub failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct HealthState {
    unhealthy: AtomicBool,
    writes: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthState {
    fn record_success(&self) {
        let _ = self.writes.fetch_add(1, Ordering::Relaxed);
        if self.unhealthy.swap(false, Ordering::AcqRel) {
            info!("config writer recovered");
        }
        counter!("instances_store_writes_total").increment(1);
    }

    fn record_failure(&self, err: &StoreError) {
        let _ = self.failures.fetch_add(1, Ordering::Relaxed);
        self.unhealthy.store(true, Ordering::Release);
        *self.last_error.lock() = Some(err.to_string());
        counter!("instances_store_write_failures_total").increment(1);
    }

    fn snapshot(&self) -> WriterHealth {
        WriterHealth {
            healthy: !self.unhealthy.load(Ordering::Acquire),
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Handle to the background write worker.
///
/// Dropping the handle drains and joins the worker, same as
/// [`ConfigWriter::shutdown`].
pub struct ConfigWriter {
    tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    health: Arc<HealthState>,
    store: ConfigStore,
}

impl ConfigWriter {
    /// Spawn the worker for `store`.
    pub fn spawn(store: ConfigStore) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let health = Arc::new(HealthState::default());

        let worker_store = store.clone();
        let worker_health = Arc::clone(&health);
        let join = thread::Builder::new()
            .name(WRITER_THREAD_NAME.into())
            .spawn(move || worker_loop(&rx, &worker_store, &worker_health))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
            health,
            store,
        })
    }

    /// The store this writer persists to.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Queue a serialized document for writing. Never blocks on disk.
    pub fn enqueue(&self, doc: String) -> Result<()> {
        self.send(WriteRequest::Document(doc))
    }

    /// Serialize `state` and queue it.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        self.enqueue(state.to_document()?)
    }

    /// Block until every request enqueued before this call has been applied.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(WriteRequest::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| StoreError::WorkerGone)
    }

    /// Stop accepting input, drain pending writes, and wait for the worker.
    ///
    /// Idempotent. Later `enqueue` calls return [`StoreError::WorkerGone`].
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        let Some(handle) = self.join.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            error!("config writer thread panicked");
        } else {
            debug!("config writer stopped");
        }
    }

    /// Whether the worker still accepts requests.
    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Current health snapshot.
    pub fn health(&self) -> WriterHealth {
        self.health.snapshot()
    }

    fn send(&self, req: WriteRequest) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(StoreError::WorkerGone)?;
        tx.send(req).map_err(|_| StoreError::WorkerGone)
    }
}

impl Drop for ConfigWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConfigWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWriter")
            .field("store", &self.store)
            .field("running", &self.is_running())
            .field("health", &self.health())
            .finish()
    }
}

/// Apply requests until every sender is gone.
fn worker_loop(rx: &mpsc::Receiver<WriteRequest>, store: &ConfigStore, health: &HealthState) {
    debug!(dir = %store.dir().display(), "config writer started");
    for req in rx {
        match req {
            WriteRequest::Document(doc) => match store.write_document(&doc) {
                Ok(()) => health.record_success(),
                Err(e) => {
                    error!(error = %e, "failed to persist config, dropping write");
                    health.record_failure(&e);
                }
            },
            WriteRequest::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
