use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Per-handler invocation counters. Survive reloads, keyed by handler name.
#[derive(Debug, Default)]
pub struct HandlerStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub panic_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HandlerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_panic(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.panic_count.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    fn add_latency(&self, latency: Duration) {
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }

    pub fn snapshot(&self, name: &str) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            name: name.to_string(),
            calls: self.call_count.load(Ordering::Relaxed),
            failures: self.failure_count.load(Ordering::Relaxed),
            panics: self.panic_count.load(Ordering::Relaxed),
            avg_latency: self.avg_latency(),
        }
    }
}

/// Point-in-time copy of [`HandlerStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerStatsSnapshot {
    pub name: String,
    pub calls: u64,
    pub failures: u64,
    pub panics: u64,
    pub avg_latency: Duration,
}
