//! Fan-out of inbound frames to every active handler.
//!
//! Each handler invocation runs in its own task, so the receive loop never
//! waits on a handler. An optional semaphore bounds how many handler bodies
//! run at once; tasks beyond the bound queue on the semaphore and no frame is
//! dropped. Errors and panics stay inside the task that raised them.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, RwLock},
    time::Instant,
};

use {
    botlink_config::DispatchConfig,
    botlink_protocol::Frame,
    dashmap::DashMap,
    futures::FutureExt,
    tokio::{
        sync::Semaphore,
        task::{JoinError, JoinHandle},
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use botlink_metrics::{
    counter, dispatch as dispatch_metrics, gauge, histogram, labels, plugins as plugin_metrics,
};

use crate::{
    context::{HandlerContext, PluginSummary},
    handler::Handler,
    registry::{LoadReport, PluginHandle, PluginRegistry, PluginState},
    stats::{HandlerStats, HandlerStatsSnapshot},
};

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// `0` means unbounded.
    pub max_concurrent_handlers: usize,
    pub reply_on_error: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_concurrent_handlers: config.max_concurrent_handlers,
            reply_on_error: config.reply_on_error,
        }
    }
}

struct ActiveHandler {
    name: String,
    handler: Arc<dyn Handler>,
    stats: Arc<HandlerStats>,
}

/// Routes frames to the active handler set and owns its lifecycle.
pub struct Dispatcher {
    registry: Option<PluginRegistry>,
    ctx: HandlerContext,
    active: RwLock<Arc<Vec<ActiveHandler>>>,
    plugins: RwLock<Arc<Vec<PluginHandle>>>,
    report: RwLock<Arc<LoadReport>>,
    stats: DashMap<String, Arc<HandlerStats>>,
    limiter: Option<Arc<Semaphore>>,
    reply_on_error: bool,
}

impl Dispatcher {
    /// Dispatcher over a registry. Nothing is active until [`Self::reload`].
    pub fn new(registry: PluginRegistry, ctx: HandlerContext, options: DispatchOptions) -> Self {
        Self::build(Some(registry), ctx, options)
    }

    /// Dispatcher over a fixed handler list, activated in the given order.
    pub fn with_handlers(
        handlers: Vec<Arc<dyn Handler>>,
        ctx: HandlerContext,
        options: DispatchOptions,
    ) -> Self {
        let dispatcher = Self::build(None, ctx, options);
        let plugins = handlers
            .into_iter()
            .map(|handler| PluginHandle {
                name: handler.name().to_string(),
                entrypoint: handler.name().to_string(),
                core: false,
                description: handler.description().to_string(),
                state: PluginState::Loaded,
                handler: Some(handler),
            })
            .collect();
        dispatcher.activate(plugins);
        dispatcher
    }

    fn build(
        registry: Option<PluginRegistry>,
        ctx: HandlerContext,
        options: DispatchOptions,
    ) -> Self {
        let limiter = (options.max_concurrent_handlers > 0)
            .then(|| Arc::new(Semaphore::new(options.max_concurrent_handlers)));
        Self {
            registry,
            ctx,
            active: RwLock::new(Arc::new(Vec::new())),
            plugins: RwLock::new(Arc::new(Vec::new())),
            report: RwLock::new(Arc::new(LoadReport::default())),
            stats: DashMap::new(),
            limiter,
            reply_on_error: options.reply_on_error,
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Rebuild the active set from the registry and swap it in. Frames
    /// already dispatched keep running against the old instances.
    pub fn reload(&self) -> Arc<LoadReport> {
        if let Some(registry) = &self.registry {
            let (handles, _) = registry.load_all();
            self.activate(handles);
        }
        self.report()
    }

    /// [`Self::reload`] on the blocking pool. Discovery reads the plugins
    /// dir and factories may touch the filesystem.
    pub async fn reload_off_runtime(self: &Arc<Self>) -> Result<Arc<LoadReport>, JoinError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.reload()).await
    }

    fn activate(&self, mut handles: Vec<PluginHandle>) {
        let mut active = Vec::new();
        for handle in &mut handles {
            if handle.state != PluginState::Loaded {
                continue;
            }
            let Some(handler) = handle.handler.clone() else {
                continue;
            };
            handle.state = PluginState::Active;
            let stats = self
                .stats
                .entry(handle.name.clone())
                .or_insert_with(|| Arc::new(HandlerStats::new()))
                .clone();
            active.push(ActiveHandler {
                name: handle.name.clone(),
                handler,
                stats,
            });
        }
        let report = LoadReport::from_handles(&handles);
        info!(active = active.len(), "handler set activated");

        self.ctx.plugins.publish(
            handles
                .iter()
                .filter(|h| h.state == PluginState::Active)
                .map(|h| PluginSummary {
                    name: h.name.clone(),
                    description: h.description.clone(),
                })
                .collect(),
        );

        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(active);
        *self.plugins.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(handles);
        *self.report.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(report);
    }

    pub fn report(&self) -> Arc<LoadReport> {
        Arc::clone(&self.report.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Every plugin seen by the last load, including failed and disabled ones.
    pub fn plugins(&self) -> Arc<Vec<PluginHandle>> {
        Arc::clone(&self.plugins.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Active handler names in dispatch order.
    pub fn handler_names(&self) -> Vec<String> {
        self.active_set().iter().map(|h| h.name.clone()).collect()
    }

    /// Stats for the active handlers, in dispatch order.
    pub fn stats(&self) -> Vec<HandlerStatsSnapshot> {
        self.active_set()
            .iter()
            .map(|h| h.stats.snapshot(&h.name))
            .collect()
    }

    fn active_set(&self) -> Arc<Vec<ActiveHandler>> {
        Arc::clone(&self.active.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Start one task per active handler for `frame`, in load order, and
    /// return without waiting for any of them.
    pub fn dispatch(&self, frame: Frame) -> Vec<JoinHandle<()>> {
        let frame = Arc::new(frame);
        self.active_set()
            .iter()
            .map(|entry| {
                let name = entry.name.clone();
                let handler = Arc::clone(&entry.handler);
                let stats = Arc::clone(&entry.stats);
                let ctx = self.ctx.clone();
                let frame = Arc::clone(&frame);
                let limiter = self.limiter.clone();
                let reply_on_error = self.reply_on_error;
                tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(semaphore) => match semaphore.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => return,
                        },
                        None => None,
                    };
                    invoke(&name, handler.as_ref(), &ctx, &frame, &stats, reply_on_error).await;
                })
            })
            .collect()
    }
}

async fn invoke(
    name: &str,
    handler: &dyn Handler,
    ctx: &HandlerContext,
    frame: &Frame,
    stats: &HandlerStats,
    reply_on_error: bool,
) {
    #[cfg(feature = "metrics")]
    gauge!(dispatch_metrics::HANDLERS_IN_FLIGHT).increment(1.0);

    let start = Instant::now();
    let outcome = AssertUnwindSafe(handler.handle(ctx, frame))
        .catch_unwind()
        .await;
    let latency = start.elapsed();

    #[cfg(feature = "metrics")]
    {
        gauge!(dispatch_metrics::HANDLERS_IN_FLIGHT).decrement(1.0);
        counter!(plugin_metrics::INVOCATIONS_TOTAL, labels::HANDLER => name.to_string()).increment(1);
        histogram!(plugin_metrics::INVOCATION_DURATION_SECONDS, labels::HANDLER => name.to_string())
            .record(latency.as_secs_f64());
    }

    let failure = match outcome {
        Ok(Ok(())) => {
            stats.record_success(latency);
            return;
        },
        Ok(Err(e)) => {
            stats.record_failure(latency);
            #[cfg(feature = "metrics")]
            counter!(plugin_metrics::ERRORS_TOTAL, labels::HANDLER => name.to_string()).increment(1);
            warn!(handler = %name, kind = frame.kind(), error = %format!("{e:#}"), "handler failed");
            format!("{e:#}")
        },
        Err(panic) => {
            stats.record_panic(latency);
            #[cfg(feature = "metrics")]
            counter!(plugin_metrics::PANICS_TOTAL, labels::HANDLER => name.to_string()).increment(1);
            let message = crate::panic_message(panic.as_ref());
            error!(handler = %name, kind = frame.kind(), panic = %message, "handler panicked");
            format!("panicked: {message}")
        },
    };

    if reply_on_error {
        diagnostic_reply(name, ctx, frame, &failure).await;
    }
}

/// Best-effort note to the chat a failed message came from.
async fn diagnostic_reply(name: &str, ctx: &HandlerContext, frame: &Frame, failure: &str) {
    let Some(event) = frame.as_event().filter(|e| e.is_message()) else {
        return;
    };
    if let Err(e) = ctx.reply(event, format!("[{name}] error: {failure}"), None).await {
        debug!(handler = %name, error = %e, "diagnostic reply not sent");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use {
        async_trait::async_trait,
        botlink_config::BotConfig,
        botlink_protocol::{TokenContext, command::send_group_msg, Segment},
        tempfile::TempDir,
    };

    use {
        super::*,
        crate::{
            registry::{Catalog, LoadContext},
            test_support::{self, group_message},
        },
    };

    /// Counts calls, optionally failing or panicking.
    struct Scripted {
        name: &'static str,
        mode: Mode,
        calls: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Ok,
        Fail,
        Panic,
    }

    impl Scripted {
        fn new(name: &'static str, mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                name,
                mode,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Handler for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _ctx: &HandlerContext, _frame: &Frame) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Ok => Ok(()),
                Mode::Fail => anyhow::bail!("always fails"),
                Mode::Panic => panic!("handler bug"),
            }
        }
    }

    async fn join(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    fn heartbeat() -> Frame {
        test_support::frame(r#"{"post_type":"meta_event","meta_event_type":"heartbeat","status":{"online":true}}"#)
    }

    #[tokio::test]
    async fn failing_handler_does_not_affect_siblings() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let first = Scripted::new("first", Mode::Ok);
        let second = Scripted::new("second", Mode::Fail);
        let third = Scripted::new("third", Mode::Ok);
        let dispatcher = Dispatcher::with_handlers(
            vec![first.clone(), second.clone(), third.clone()],
            ctx,
            DispatchOptions::default(),
        );

        join(dispatcher.dispatch(heartbeat())).await;

        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 1));
        let stats = dispatcher.stats();
        assert_eq!(stats[1].name, "second");
        assert_eq!(stats[1].failures, 1);
        assert_eq!(stats[0].failures + stats[2].failures, 0);
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let first = Scripted::new("first", Mode::Ok);
        let second = Scripted::new("second", Mode::Panic);
        let third = Scripted::new("third", Mode::Ok);
        let dispatcher = Dispatcher::with_handlers(
            vec![first.clone(), second.clone(), third.clone()],
            ctx,
            DispatchOptions::default(),
        );

        join(dispatcher.dispatch(heartbeat())).await;
        join(dispatcher.dispatch(heartbeat())).await;

        assert_eq!((first.calls(), third.calls()), (2, 2));
        assert_eq!(dispatcher.stats()[1].panics, 2);
    }

    #[tokio::test]
    async fn failures_on_messages_get_a_diagnostic_reply() {
        let tmp = TempDir::new().unwrap();
        let (ctx, outbound) = test_support::context(tmp.path());
        let dispatcher = Dispatcher::with_handlers(
            vec![Scripted::new("broken", Mode::Fail)],
            ctx,
            DispatchOptions::default(),
        );

        join(dispatcher.dispatch(group_message("777", "42", "member", "hi"))).await;
        join(dispatcher.dispatch(heartbeat())).await;

        let sent = outbound.take().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, "send_group_msg");
        let text = sent[0].params["message"][1]["data"]["text"].as_str().unwrap();
        assert_eq!(text, "[broken] error: always fails");
    }

    #[tokio::test]
    async fn diagnostic_replies_can_be_turned_off() {
        let tmp = TempDir::new().unwrap();
        let (ctx, outbound) = test_support::context(tmp.path());
        let dispatcher = Dispatcher::with_handlers(
            vec![Scripted::new("broken", Mode::Fail)],
            ctx,
            DispatchOptions {
                max_concurrent_handlers: 0,
                reply_on_error: false,
            },
        );

        join(dispatcher.dispatch(group_message("777", "42", "member", "hi"))).await;
        assert!(outbound.take().await.is_empty());
    }

    /// Tracks the peak number of concurrently running bodies.
    struct Slow {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn handle(&self, _ctx: &HandlerContext, _frame: &Frame) -> anyhow::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_without_dropping_frames() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(Slow {
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
        });
        let dispatcher = Dispatcher::with_handlers(vec![slow], ctx, DispatchOptions {
            max_concurrent_handlers: 2,
            reply_on_error: false,
        });

        let mut handles = Vec::new();
        for _ in 0..6 {
            handles.extend(dispatcher.dispatch(heartbeat()));
        }
        join(handles).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.stats()[0].calls, 6);
    }

    /// Sends a command tagged with its own token and acts only on the
    /// response that carries it back.
    struct ModuleRemover {
        acted: AtomicUsize,
    }

    #[async_trait]
    impl Handler for ModuleRemover {
        fn name(&self) -> &str {
            "remover"
        }

        async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
            match frame {
                Frame::Event(event) if event.raw_message() == Some("remove") => {
                    let token = TokenContext::new()
                        .with("action", "del-module")
                        .with("actor", event.user_id().unwrap_or_default());
                    ctx.send(
                        send_group_msg("777", vec![Segment::text("removing")]).with_token(&token),
                    )
                    .await
                },
                Frame::Response(response) if response.is_ok() => {
                    let token = response.token();
                    if token.matches("action", "del-module") && token.matches("actor", "42") {
                        self.acted.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                },
                _ => Ok(()),
            }
        }
    }

    /// Reacts only to responses tagged `module=weather`.
    struct Weather {
        acted: AtomicUsize,
    }

    #[async_trait]
    impl Handler for Weather {
        fn name(&self) -> &str {
            "weather"
        }

        async fn handle(&self, _ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
            if let Some(response) = frame.as_response()
                && response.token().get("module") == Some("weather")
            {
                self.acted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn response_is_recognised_only_by_the_handler_that_tagged_it() {
        let tmp = TempDir::new().unwrap();
        let (ctx, outbound) = test_support::context(tmp.path());
        let remover = Arc::new(ModuleRemover {
            acted: AtomicUsize::new(0),
        });
        let weather = Arc::new(Weather {
            acted: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::with_handlers(
            vec![remover.clone(), weather.clone()],
            ctx,
            DispatchOptions::default(),
        );

        join(dispatcher.dispatch(group_message("777", "42", "admin", "remove"))).await;
        let sent = outbound.take().await;
        let echo = sent[0].echo.clone().unwrap();
        assert_eq!(echo, "action=del-module&actor=42");

        let response = Frame::from_value(serde_json::json!({
            "status": "ok", "retcode": 0, "data": {"message_id": 1}, "echo": echo,
        }))
        .unwrap();
        join(dispatcher.dispatch(response)).await;

        assert_eq!(remover.acted.load(Ordering::SeqCst), 1);
        assert_eq!(weather.acted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reload_picks_up_new_plugins_and_keeps_stats() {
        let tmp = TempDir::new().unwrap();
        let plugins_dir = tmp.path().join("plugins");
        std::fs::create_dir_all(&plugins_dir).unwrap();
        let (ctx, _) = test_support::context(tmp.path());

        let mut catalog = Catalog::new();
        catalog
            .register("core", true, |_| Ok(Scripted::new("core", Mode::Ok) as Arc<dyn Handler>))
            .register("extra", false, |_| Ok(Scripted::new("extra", Mode::Ok) as Arc<dyn Handler>));
        let load_ctx = LoadContext::new(Arc::new(BotConfig::default()));
        let registry = PluginRegistry::new(catalog, load_ctx).with_dir(&plugins_dir);
        let dispatcher = Arc::new(Dispatcher::new(registry, ctx, DispatchOptions::default()));
        assert!(dispatcher.handler_names().is_empty());

        let report = dispatcher.reload();
        assert_eq!(report.loaded, vec!["core"]);
        join(dispatcher.dispatch(heartbeat())).await;

        std::fs::create_dir_all(plugins_dir.join("extra")).unwrap();
        std::fs::write(plugins_dir.join("extra/plugin.toml"), "entrypoint = \"extra\"").unwrap();
        let report = dispatcher.reload_off_runtime().await.unwrap();
        assert_eq!(report.loaded, vec!["core", "extra"]);
        assert_eq!(dispatcher.handler_names(), vec!["core", "extra"]);
        assert!(dispatcher.plugins().iter().all(|p| p.state == PluginState::Active));
        let published: Vec<_> = dispatcher
            .context()
            .plugins
            .list()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(published, ["core", "extra"]);

        join(dispatcher.dispatch(heartbeat())).await;
        let stats = dispatcher.stats();
        assert_eq!((stats[0].calls, stats[1].calls), (2, 1));
    }
}
