//! Timer service: schedule, recover and execute deferred actions.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    botlink_common::{now_ms, remaining_until},
    botlink_protocol::Command,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use botlink_metrics::{counter, gauge, scheduler as scheduler_metrics};

use crate::{Result, store::DeferredStore, types::DeferredAction};

/// Callback that performs an action's command, usually by sending it on the
/// live connection.
pub type ActionFn =
    Arc<dyn Fn(Command) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Wall clock in Unix milliseconds.
pub type ClockFn = Arc<dyn Fn() -> u64 + Send + Sync>;

const DEFAULT_PERSIST_THRESHOLD: Duration = Duration::from_secs(5);

struct Timer {
    generation: u64,
    command: Command,
    handle: JoinHandle<()>,
    /// Set once the delay has elapsed and the command is running.
    fired: Arc<AtomicBool>,
}

/// The deferred action scheduler.
///
/// Every scheduled action gets an in-memory timer. Actions delayed beyond
/// the persist threshold are also written to the store before the timer is
/// armed. Execution always removes the stored record, whatever the outcome.
pub struct Scheduler {
    store: Arc<dyn DeferredStore>,
    executor: ActionFn,
    clock: ClockFn,
    persist_threshold: Duration,
    timers: Mutex<HashMap<String, Timer>>,
    generation: AtomicU64,
}

impl Scheduler {
    pub fn new(store: Arc<dyn DeferredStore>, executor: ActionFn) -> Self {
        Self {
            store,
            executor,
            clock: Arc::new(now_ms),
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
            timers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_persist_threshold(mut self, threshold: Duration) -> Self {
        self.persist_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Run `command` after `delay`, under `id`.
    ///
    /// Scheduling an id that already has a live timer replaces that timer.
    pub async fn schedule(
        self: &Arc<Self>,
        id: impl Into<String>,
        delay: Duration,
        command: Command,
    ) -> Result<()> {
        let id = id.into();
        if delay > self.persist_threshold {
            let deadline_ms = (self.clock)().saturating_add(delay.as_millis() as u64);
            self.store
                .save(&DeferredAction {
                    id: id.clone(),
                    deadline_ms,
                    command: command.clone(),
                })
                .await?;
        }

        #[cfg(feature = "metrics")]
        counter!(scheduler_metrics::SCHEDULED_TOTAL).increment(1);

        debug!(id = %id, delay_ms = delay.as_millis() as u64, action = %command.action, "deferred action scheduled");
        self.arm(id, delay, command);
        Ok(())
    }

    /// Re-arm every persisted action after a (re)connect.
    ///
    /// Overdue actions run right away; the rest wait only for their remaining
    /// delay. Ids whose timer is still alive in this process are skipped.
    /// Returns the number of timers armed.
    pub async fn recover_on_reconnect(self: &Arc<Self>) -> Result<usize> {
        let actions = self.store.load_all().await?;
        let now = (self.clock)();
        let mut recovered = 0;
        for action in actions {
            if self.has_live_timer(&action.id) {
                continue;
            }
            let remaining = remaining_until(action.deadline_ms, now);
            debug!(id = %action.id, remaining_ms = remaining.as_millis() as u64, "recovering deferred action");
            self.arm(action.id, remaining, action.command);
            recovered += 1;
        }

        #[cfg(feature = "metrics")]
        counter!(scheduler_metrics::RECOVERED_TOTAL).increment(recovered as u64);

        if recovered > 0 {
            info!(count = recovered, "recovered deferred actions");
        }
        Ok(recovered)
    }

    /// Run a pending action now instead of waiting for its timer.
    ///
    /// Returns `false` when nothing is pending under `id`, which makes a
    /// second call for the same id a no-op.
    pub async fn execute(&self, id: &str) -> Result<bool> {
        if self.is_firing(id) {
            debug!(id, "deferred action already running");
            return Ok(false);
        }
        let command = match self.take_timer(id) {
            Some(timer) => {
                timer.handle.abort();
                Some(timer.command)
            },
            None => self
                .store
                .load_all()
                .await?
                .into_iter()
                .find(|a| a.id == id)
                .map(|a| a.command),
        };
        let Some(command) = command else {
            debug!(id, "deferred action already executed");
            return Ok(false);
        };
        self.run(id, command).await;
        Ok(true)
    }

    /// Ids with a live in-memory timer, sorted.
    pub fn pending(&self) -> Vec<String> {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<_> = timers
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Persisted actions, ordered by deadline.
    pub async fn list(&self) -> Result<Vec<DeferredAction>> {
        self.store.load_all().await
    }

    fn has_live_timer(&self, id: &str) -> bool {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.get(id).is_some_and(|t| !t.handle.is_finished())
    }

    fn is_firing(&self, id: &str) -> bool {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.get(id).is_some_and(|t| t.fired.load(Ordering::SeqCst))
    }

    fn take_timer(&self, id: &str) -> Option<Timer> {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let timer = timers.remove(id);
        self.report_pending(timers.len());
        timer
    }

    /// Remove the timer entry if it still belongs to `generation`.
    fn release_timer(&self, id: &str, generation: u64) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if timers.get(id).is_some_and(|t| t.generation == generation) {
            timers.remove(id);
        }
        self.report_pending(timers.len());
    }

    fn arm(self: &Arc<Self>, id: String, delay: Duration, command: Command) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let task_id = id.clone();
        let task_command = command.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let task_fired = Arc::clone(&fired);

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        // The entry stays until the run is over so recovery sees it as live.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task_fired.store(true, Ordering::SeqCst);
            this.run(&task_id, task_command).await;
            this.release_timer(&task_id, generation);
        });
        if let Some(previous) = timers.insert(id, Timer {
            generation,
            command,
            handle,
            fired,
        }) {
            previous.handle.abort();
        }
        self.report_pending(timers.len());
    }

    /// Perform the command, then drop the stored record. Failures are logged
    /// and never retried.
    async fn run(&self, id: &str, command: Command) {
        let action = command.action.clone();
        match (self.executor)(command).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(scheduler_metrics::EXECUTED_TOTAL).increment(1);
                debug!(id, action = %action, "deferred action executed");
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(scheduler_metrics::FAILED_TOTAL).increment(1);
                warn!(id, action = %action, error = %e, "deferred action failed");
            },
        }

        match self.store.remove(id).await {
            Ok(true) => {},
            Ok(false) => debug!(id, "deferred action record already removed"),
            Err(e) => warn!(id, error = %e, "failed to remove deferred action record"),
        }
    }

    #[allow(unused_variables)]
    fn report_pending(&self, pending: usize) {
        #[cfg(feature = "metrics")]
        gauge!(scheduler_metrics::PENDING).set(pending as f64);
    }
}
