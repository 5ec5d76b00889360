//! Builds the runtime from configuration: stores, scheduler, plugin
//! registry, dispatcher and the connection supervisor.

use std::{sync::Arc, time::Duration};

use {
    botlink_config::BotConfig,
    botlink_plugins::{
        Catalog, DispatchOptions, Dispatcher, HandlerContext, LoadContext, LoadReport, Outbound,
        PluginDirectory, PluginRegistry,
    },
    botlink_scheduler::{ActionFn, FileStore, Scheduler},
    botlink_switches::SwitchStore,
    tracing::info,
};

use crate::{
    outbound::GatewayOutbound,
    supervisor::{Supervisor, SupervisorOptions},
};

/// A fully wired bot, ready to connect.
pub struct Gateway {
    config: Arc<BotConfig>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<Scheduler>,
    switches: Arc<SwitchStore>,
    outbound: GatewayOutbound,
    supervisor: Supervisor,
}

impl Gateway {
    /// Wire every component and load the plugins once. Nothing connects
    /// until [`Gateway::run`].
    pub fn build(config: Arc<BotConfig>, catalog: Catalog) -> Self {
        let data_dir = config.storage.data_dir.clone();
        let (outbound, write_rx) = GatewayOutbound::channel();

        let sink = outbound.clone();
        let executor: ActionFn = Arc::new(move |command| {
            let sink = sink.clone();
            Box::pin(async move { Ok(sink.send_command(&command)?) })
        });
        let threshold = Duration::from_secs(config.scheduler.persist_threshold_secs);
        let scheduler = Arc::new(
            Scheduler::new(Arc::new(FileStore::in_data_dir(&data_dir)), executor)
                .with_persist_threshold(threshold),
        );
        let switches = Arc::new(SwitchStore::new(&data_dir));

        let ctx = HandlerContext {
            outbound: Arc::new(outbound.clone()) as Arc<dyn Outbound>,
            switches: Arc::clone(&switches),
            scheduler: Arc::clone(&scheduler),
            owner_id: config.owner.user_id.clone(),
            data_dir,
            plugins: PluginDirectory::default(),
        };
        let registry = PluginRegistry::new(catalog, LoadContext::new(Arc::clone(&config)));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            ctx,
            DispatchOptions::from(&config.dispatch),
        ));
        let report = dispatcher.reload();
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            disabled = report.disabled.len(),
            "plugins loaded"
        );

        let supervisor = Supervisor::new(
            SupervisorOptions::from_config(&config),
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            outbound.clone(),
            write_rx,
        );

        Self {
            config,
            dispatcher,
            scheduler,
            switches,
            outbound,
            supervisor,
        }
    }

    pub fn config(&self) -> &Arc<BotConfig> {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn switches(&self) -> Arc<SwitchStore> {
        Arc::clone(&self.switches)
    }

    pub fn outbound(&self) -> GatewayOutbound {
        self.outbound.clone()
    }

    /// Reload the plugin set in place.
    pub fn reload(&self) -> Arc<LoadReport> {
        self.dispatcher.reload()
    }

    /// Connect and serve until the task is dropped.
    pub async fn run(self) {
        self.supervisor.run().await;
    }
}
