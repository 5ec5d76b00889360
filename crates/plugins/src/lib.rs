//! Plugin system: the [`Handler`] capability, the registry that loads
//! handlers, and the [`Dispatcher`] that fans every inbound frame out to them.
//!
//! Handlers are compiled in and listed in a [`Catalog`]. Core handlers always
//! load; optional ones are enabled per directory with a `plugin.toml` under
//! the plugins dir, so a broken or unknown plugin fails on its own without
//! touching the rest.

pub mod bundled;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod registry;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

use std::any::Any;

pub use {
    context::{HandlerContext, Outbound, PluginDirectory, PluginSummary},
    dispatcher::{DispatchOptions, Dispatcher},
    error::{Error, Result},
    handler::Handler,
    manifest::PluginManifest,
    registry::{Catalog, LoadContext, LoadReport, PluginHandle, PluginRegistry, PluginState},
    stats::{HandlerStats, HandlerStatsSnapshot},
};

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
