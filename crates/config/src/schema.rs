//! Config schema types (gateway, owner, storage, dispatch, plugins, scheduler, metrics).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub gateway: GatewayConfig,
    pub owner: OwnerConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub plugins: PluginsConfig,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
}

/// WebSocket gateway connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` during the handshake.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<Secret<String>>,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: botlink_protocol::DEFAULT_GATEWAY_URL.into(),
            access_token: None,
            reconnect_delay_ms: botlink_protocol::RECONNECT_DELAY_MS,
            handshake_timeout_ms: botlink_protocol::HANDSHAKE_TIMEOUT_MS,
        }
    }
}

/// Operator identity. Receives startup reports and diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerConfig {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for switch files and deferred actions.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on handler bodies running at once. `0` means unbounded.
    pub max_concurrent_handlers: usize,
    /// Reply to the originating chat when a handler fails on a message.
    pub reply_on_error: bool,
    /// Responses whose echo contains one of these are logged at debug level.
    pub quiet_echoes: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: 64,
            reply_on_error: true,
            quiet_echoes: botlink_protocol::DEFAULT_QUIET_ECHOES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl DispatchConfig {
    pub fn is_quiet_echo(&self, echo: &str) -> bool {
        self.quiet_echoes
            .iter()
            .any(|quiet| !quiet.is_empty() && echo.contains(quiet.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory holding one sub-directory per optional plugin.
    pub dir: PathBuf,
    /// Plugin names that are never loaded.
    pub disabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            disabled: Vec::new(),
        }
    }
}

impl PluginsConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Actions delayed longer than this are persisted so they survive a restart.
    pub persist_threshold_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            persist_threshold_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Prometheus scrape endpoint.
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".into(),
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
