use {async_trait::async_trait, botlink_protocol::Frame};

use crate::context::HandlerContext;

/// A loaded plugin: receives every inbound frame and decides for itself
/// whether it is relevant.
///
/// Handlers keep any per-process state (last request time, last seen status)
/// as fields; one instance lives from load until the next reload.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable name used in logs, stats and load reports.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Handle one frame. Errors and panics are contained by the dispatcher.
    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()>;
}
