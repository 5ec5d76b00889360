//! Wire model for the chat gateway connection.
//!
//! All traffic is JSON text frames over one WebSocket:
//! - [`Command`]: client → gateway action call, optionally carrying an echo token
//! - [`Frame::Event`]: gateway → client push (messages, notices, heartbeats)
//! - [`Frame::Response`]: gateway → client reply to a command, echoing its token
//!
//! Responses carry no request id beyond the echo, so callers correlate them
//! through the structured [`token`] they attached when sending.

pub mod command;
pub mod error;
pub mod frame;
pub mod token;

pub use {
    command::{Command, Segment},
    error::{Error, Result},
    frame::{Event, Frame, Response, ResponseStatus},
    token::TokenContext,
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:3001";
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s
pub const RECONNECT_DELAY_MS: u64 = 2_000; // 2s

/// Token key asking the auto-retract handler to delete the sent message after
/// the given number of seconds.
pub const RETRACT_AFTER_KEY: &str = "del_msg";

/// Echo substrings of periodic bookkeeping commands; their responses are
/// logged at debug level.
pub const DEFAULT_QUIET_ECHOES: &[&str] = &[
    "get_group_member_list",
    "get_group_list",
    "get_friend_list",
    "get_group_info",
    "nc_get_rkey",
];
