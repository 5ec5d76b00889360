//! Metric names and label keys.

/// Gateway connection metrics
pub mod gateway {
    /// Successful connections to the chat gateway
    pub const CONNECTIONS_TOTAL: &str = "botlink_gateway_connections_total";
    /// Failed connection attempts or dropped connections
    pub const CONNECTION_ERRORS_TOTAL: &str = "botlink_gateway_connection_errors_total";
    /// 1 while a connection is live, 0 otherwise
    pub const CONNECTED: &str = "botlink_gateway_connected";
    /// Outbound commands written to the socket
    pub const COMMANDS_SENT_TOTAL: &str = "botlink_gateway_commands_sent_total";
}

/// Inbound frame dispatch metrics
pub mod dispatch {
    /// Frames received, labelled by `kind` (event/response)
    pub const FRAMES_RECEIVED_TOTAL: &str = "botlink_dispatch_frames_received_total";
    /// Frames that could not be decoded
    pub const DECODE_ERRORS_TOTAL: &str = "botlink_dispatch_decode_errors_total";
    /// Handler tasks currently running or waiting for a permit
    pub const HANDLERS_IN_FLIGHT: &str = "botlink_dispatch_handlers_in_flight";
}

/// Plugin metrics
pub mod plugins {
    /// Number of active plugins
    pub const LOADED: &str = "botlink_plugins_loaded";
    /// Plugins that failed to load
    pub const LOAD_FAILURES: &str = "botlink_plugins_load_failures";
    /// Handler invocations, labelled by `handler`
    pub const INVOCATIONS_TOTAL: &str = "botlink_plugin_invocations_total";
    /// Handler invocations that returned an error, labelled by `handler`
    pub const ERRORS_TOTAL: &str = "botlink_plugin_errors_total";
    /// Handler invocations that panicked, labelled by `handler`
    pub const PANICS_TOTAL: &str = "botlink_plugin_panics_total";
    /// Handler invocation duration in seconds
    pub const INVOCATION_DURATION_SECONDS: &str = "botlink_plugin_invocation_duration_seconds";
}

/// Deferred action scheduler metrics
pub mod scheduler {
    /// Actions scheduled (persisted or in-memory only)
    pub const SCHEDULED_TOTAL: &str = "botlink_scheduler_scheduled_total";
    /// Actions executed successfully
    pub const EXECUTED_TOTAL: &str = "botlink_scheduler_executed_total";
    /// Actions whose command failed
    pub const FAILED_TOTAL: &str = "botlink_scheduler_failed_total";
    /// Records recovered from disk on reconnect
    pub const RECOVERED_TOTAL: &str = "botlink_scheduler_recovered_total";
    /// Timers currently armed
    pub const PENDING: &str = "botlink_scheduler_pending";
}

/// Switch store metrics
pub mod switches {
    /// Toggle operations, labelled by `module`
    pub const TOGGLES_TOTAL: &str = "botlink_switch_toggles_total";
    /// Store files that failed to parse and were treated as empty
    pub const CORRUPT_FILES_TOTAL: &str = "botlink_switch_corrupt_files_total";
}

/// Common label keys
pub mod labels {
    pub const HANDLER: &str = "handler";
    pub const KIND: &str = "kind";
    pub const MODULE: &str = "module";
}

/// Histogram buckets
pub mod buckets {
    /// Handler durations: 1ms to 60s
    pub const HANDLER_DURATION: &[f64] = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
}
