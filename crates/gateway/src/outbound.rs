use {
    async_trait::async_trait,
    botlink_plugins::Outbound,
    botlink_protocol::Command,
    tokio::sync::mpsc,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use botlink_metrics::{counter, gateway as gateway_metrics};

use crate::error::Error;

/// Outbound half shared by handlers and the scheduler.
///
/// Commands go through a channel drained by the supervisor's writer, so the
/// sender outlives reconnects. Commands sent while disconnected are written
/// once the next connection is up.
#[derive(Clone)]
pub struct GatewayOutbound {
    write_tx: mpsc::UnboundedSender<String>,
}

impl GatewayOutbound {
    /// Create the outbound handle and the receiver the supervisor drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        (Self { write_tx }, write_rx)
    }

    pub fn send_command(&self, command: &Command) -> crate::Result<()> {
        let json = command.to_json()?;
        self.write_tx.send(json).map_err(|_| Error::ChannelClosed)?;
        debug!(action = %command.action, echo = ?command.echo, "command queued");

        #[cfg(feature = "metrics")]
        counter!(gateway_metrics::COMMANDS_SENT_TOTAL).increment(1);

        Ok(())
    }
}

#[async_trait]
impl Outbound for GatewayOutbound {
    async fn send(&self, command: Command) -> anyhow::Result<()> {
        Ok(self.send_command(&command)?)
    }
}
