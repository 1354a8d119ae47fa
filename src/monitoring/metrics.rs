use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::info;

/// Global metrics registry used across the pipeline and read API.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[derive(Default)]
struct MetricsInner {
    runs_completed: AtomicU64,
    fallback_runs: AtomicU64,
    strategy_failures: AtomicU64,
    persistence_failures: AtomicU64,
    last_run_ts: AtomicU64,
}

/// Lightweight metrics handle backed by atomics so it can be cloned cheaply.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Metrics {
    pub fn record_run(&self, source: &str, fallback: bool) {
        self.inner.runs_completed.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.inner.fallback_runs.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.last_run_ts.store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "run_completed",
            source = %source,
            fallback,
            total_runs = self.inner.runs_completed.load(Ordering::Relaxed),
            "pipeline run completed"
        );
    }

    pub fn record_strategy_failure(&self, strategy: &str, reason: &str) {
        self.inner.strategy_failures.fetch_add(1, Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "strategy_failed",
            strategy = %strategy,
            reason = %reason,
            total_failures = self.inner.strategy_failures.load(Ordering::Relaxed),
            "acquisition strategy failed"
        );
    }

    pub fn record_persistence_failure(&self, reason: &str) {
        self.inner
            .persistence_failures
            .fetch_add(1, Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "persistence_failed",
            reason = %reason,
            total_failures = self.inner.persistence_failures.load(Ordering::Relaxed),
            "persistence failed"
        );
    }

    /// Mark the persisted data as fresh, e.g. from the state file's timestamp.
    pub fn observe_last_run(&self, unix_secs: u64) {
        self.inner
            .last_run_ts
            .fetch_max(unix_secs, Ordering::Relaxed);
    }

    pub fn is_healthy(&self, max_staleness: Duration) -> bool {
        let last = self.inner.last_run_ts.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let now = now_unix_secs();
        now.saturating_sub(last) <= max_staleness.as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_completed: self.inner.runs_completed.load(Ordering::Relaxed),
            fallback_runs: self.inner.fallback_runs.load(Ordering::Relaxed),
            strategy_failures: self.inner.strategy_failures.load(Ordering::Relaxed),
            persistence_failures: self
                .inner
                .persistence_failures
                .load(Ordering::Relaxed),
            last_run_ts: self.inner.last_run_ts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of current metrics used by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub runs_completed: u64,
    pub fallback_runs: u64,
    pub strategy_failures: u64,
    pub persistence_failures: u64,
    pub last_run_ts: u64,
}
