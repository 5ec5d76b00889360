//! Gateway runtime: the outbound command queue, the connection supervisor
//! and the [`Gateway`] that wires them to the plugin dispatcher.

pub mod app;
pub mod error;
pub mod outbound;
pub mod supervisor;

pub use {
    app::Gateway,
    error::{Error, Result},
    outbound::GatewayOutbound,
    supervisor::{Supervisor, SupervisorOptions},
};
