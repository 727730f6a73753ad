//! # instances-runtime
//!
//! Decision logic of the Instances rejoin subsystem.
//!
//! - [`Instances`]: lifecycle facade the host integration calls into
//! - [`RejoinOrchestrator`]: rejoin last session, create a fresh one with
//!   linear backoff, or fall back offline
//! - [`HistoryManager`]: bounded, deduplicated recent-sessions list
//! - [`TeleportGate`]: at most one teleport to the stored location per world enter
//! - [`SnapshotJob`]: periodic capture of the participant's location
//! - [`host`]: the [`SessionApi`] and [`Host`] seams the embedding process implements
//!
//! ## Crate Position
//!
//! Depends on `instances-core`, `instances-settings`, and `instances-store`.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod event_emitter;
pub mod history;
pub mod host;
pub mod lifecycle;
pub mod orchestrator;
pub mod restart;
pub mod snapshot;
pub mod teleport;
pub mod testutil;

pub use context::RejoinContext;
pub use errors::{ApiError, Result, RuntimeError};
pub use event_emitter::EventEmitter;
pub use history::HistoryManager;
pub use host::{
    Clock, CreateSessionRequest, CreatedSession, CurrentSession, Host, SessionApi,
    SessionDetails, SessionLookup, SystemClock,
};
pub use lifecycle::Instances;
pub use orchestrator::{RejoinOrchestrator, RejoinOutcome};
pub use restart::relaunched_by_instances;
pub use snapshot::{SnapshotJob, capture_rejoin_location};
pub use teleport::{TeleportDecision, TeleportGate};
