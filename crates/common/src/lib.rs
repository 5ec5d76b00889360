//! Context helpers, file and clock utilities shared by every botlink crate.

pub mod context;
pub mod fs;
pub mod time;

pub use {
    context::FromMessage,
    time::{now_ms, remaining_until},
};
