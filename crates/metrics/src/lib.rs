//! Metrics for botlink.
//!
//! Crates record through the `metrics` facade macros re-exported here, using
//! the names in [`definitions`]. Nothing is collected until a recorder is
//! installed; with the `prometheus` feature, [`init_metrics`] installs a
//! Prometheus exporter with its own HTTP listener.
//!
//! ```rust,ignore
//! use botlink_metrics::{counter, dispatch};
//!
//! counter!(dispatch::FRAMES_RECEIVED_TOTAL, "kind" => "event").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
