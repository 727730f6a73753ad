//! # instances-store
//!
//! Durable persistence for the Instances rejoin subsystem.
//!
//! - [`ConfigStore`]: the two-file (primary + staging) document store with
//!   crash-safe save and fallback load
//! - [`ConfigWriter`]: the single background writer thread that applies
//!   saves strictly in order and drains on shutdown
//!
//! ## Crate Position
//!
//! Depends on `instances-core`. Used by `instances-runtime` and the CLI.

#![deny(unsafe_code)]

pub mod errors;
pub mod files;
pub mod writer;

pub use errors::{Result, StoreError};
pub use files::{ConfigStore, LoadOutcome, LoadSource};
pub use writer::{ConfigWriter, WriterHealth};
