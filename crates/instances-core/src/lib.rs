//! # instances-core
//!
//! Foundation types, constants, and logging for the Instances rejoin subsystem.
//!
//! This crate provides the shared vocabulary the other Instances crates depend on:
//!
//! - **Persisted document**: [`state::PersistedState`] with [`state::SessionRecord`]
//!   history entries and the [`state::RejoinLocation`] snapshot
//! - **Geometry**: [`state::Vec3`] and [`state::Pose`] for teleport-on-rejoin
//! - **Events**: [`events::InstancesEvent`] broadcast to observers of the subsystem
//! - **Constants**: file names, config version, fixed timeouts, restart marker
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other instances crates.

#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod logging;
pub mod state;

pub use events::InstancesEvent;
pub use state::{PersistedState, Pose, RejoinLocation, SessionRecord, Vec3};
