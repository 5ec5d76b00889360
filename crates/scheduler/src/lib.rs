//! Deferred action scheduler.
//!
//! One-shot commands (message retraction, mostly) run after a delay. Actions
//! delayed beyond a short threshold are persisted first, so a restart picks
//! them up again with their *remaining* delay via
//! [`Scheduler::recover_on_reconnect`].

pub mod error;
pub mod service;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    error::{Error, Result},
    service::{ActionFn, ClockFn, Scheduler},
    store::DeferredStore,
    store_file::FileStore,
    store_memory::InMemoryStore,
    types::DeferredAction,
};

/// Deferred actions file, relative to the data directory.
pub const DEFERRED_ACTIONS_FILE: &str = "core/deferred_actions.json";
