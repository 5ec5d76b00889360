//! Durable on/off switches, one JSON file per module.
//!
//! Layout: `<data_dir>/<module>/switch.json` holding
//! `{"group": {"<group_id>": bool}, "private": bool}`. A missing key means
//! disabled, and a file that fails to parse reads as all-off until the next
//! toggle overwrites it.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{Scope, SwitchState, SwitchStore},
};

/// File name of a module's switch record.
pub const SWITCH_FILE: &str = "switch.json";
