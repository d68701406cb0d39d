//! Process-wide fetch/navigation metrics: a ring buffer of recent fetch
//! events, per-pool aggregates, and a navigation-quality (Apdex) log.
//! Mirrors `loadbalance/adaptive.rs`'s `AdaptiveMetrics` shape: a
//! `parking_lot`-guarded map updated in place, with a derived score/summary
//! computed on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

const FETCH_RING_CAPACITY: usize = 100;
const NAVIGATION_LOG_CAPACITY: usize = 20;
const LATENCY_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEventKind {
    Start,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub at: Instant,
    pub pool_key: String,
    pub kind: FetchEventKind,
    pub duration: Option<Duration>,
    pub bytes: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PoolAggregate {
    pub fetch_count: u64,
    pub error_count: u64,
    pub total_ms: u64,
    pub last_fetch: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationEvent {
    pub at: Instant,
    pub quality: f64,
}

/// A registered per-pool callback, invoked without the metrics lock held —
/// registration must not acquire the pool lock.
pub type Reporter = Arc<dyn Fn(&PoolAggregate) + Send + Sync>;

struct Inner {
    events: Vec<FetchEvent>,
    aggregates: HashMap<String, PoolAggregate>,
    navigation: Vec<NavigationEvent>,
    reporters: HashMap<String, Reporter>,
}

pub struct Metrics {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub active_pools: usize,
    pub p50_latency_ms: Option<u64>,
    pub error_rate: f64,
    pub apdex: f64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                events: Vec::new(),
                aggregates: HashMap::new(),
                navigation: Vec::new(),
                reporters: HashMap::new(),
            }),
        })
    }

    fn push_event(&self, event: FetchEvent) {
        let mut inner = self.inner.write();
        inner.events.push(event);
        let len = inner.events.len();
        if len > FETCH_RING_CAPACITY {
            inner.events.drain(0..len - FETCH_RING_CAPACITY);
        }
    }

    pub fn record_fetch_start(&self, pool_key: &str) {
        self.push_event(FetchEvent {
            at: Instant::now(),
            pool_key: pool_key.to_string(),
            kind: FetchEventKind::Start,
            duration: None,
            bytes: None,
        });
    }

    pub fn record_fetch_complete(&self, pool_key: &str, duration: Duration, bytes: Option<usize>) {
        self.push_event(FetchEvent {
            at: Instant::now(),
            pool_key: pool_key.to_string(),
            kind: FetchEventKind::Complete,
            duration: Some(duration),
            bytes,
        });
        let reporter = {
            let mut inner = self.inner.write();
            let aggregate = inner.aggregates.entry(pool_key.to_string()).or_default();
            aggregate.fetch_count += 1;
            aggregate.total_ms += duration.as_millis() as u64;
            aggregate.last_fetch = Some(Instant::now());
            let aggregate = aggregate.clone();
            inner.reporters.get(pool_key).cloned().map(|r| (r, aggregate))
        };
        if let Some((reporter, aggregate)) = reporter {
            reporter(&aggregate);
        }
    }

    pub fn record_fetch_error(&self, pool_key: &str, duration: Duration) {
        self.push_event(FetchEvent {
            at: Instant::now(),
            pool_key: pool_key.to_string(),
            kind: FetchEventKind::Error,
            duration: Some(duration),
            bytes: None,
        });
        let reporter = {
            let mut inner = self.inner.write();
            let aggregate = inner.aggregates.entry(pool_key.to_string()).or_default();
            aggregate.fetch_count += 1;
            aggregate.error_count += 1;
            aggregate.total_ms += duration.as_millis() as u64;
            aggregate.last_fetch = Some(Instant::now());
            let aggregate = aggregate.clone();
            inner.reporters.get(pool_key).cloned().map(|r| (r, aggregate))
        };
        if let Some((reporter, aggregate)) = reporter {
            reporter(&aggregate);
        }
    }

    pub fn record_navigation(&self, _view_title: &str, quality: f64) {
        let mut inner = self.inner.write();
        inner.navigation.push(NavigationEvent {
            at: Instant::now(),
            quality,
        });
        let len = inner.navigation.len();
        if len > NAVIGATION_LOG_CAPACITY {
            inner.navigation.drain(0..len - NAVIGATION_LOG_CAPACITY);
        }
    }

    /// Registered without holding the pool's own lock — a pool's `Clear`
    /// unregisters itself after releasing its lock to avoid a lock-order
    /// inversion.
    pub fn register_reporter(&self, pool_key: &str, reporter: Reporter) {
        self.inner
            .write()
            .reporters
            .insert(pool_key.to_string(), reporter);
    }

    pub fn unregister_reporter(&self, pool_key: &str) {
        self.inner.write().reporters.remove(pool_key);
    }

    pub fn aggregate(&self, pool_key: &str) -> Option<PoolAggregate> {
        self.inner.read().aggregates.get(pool_key).cloned()
    }

    pub fn summary(&self) -> Summary {
        let inner = self.inner.read();
        let active_pools = inner.aggregates.len();

        let mut latencies: Vec<u64> = inner
            .events
            .iter()
            .rev()
            .filter(|e| e.kind == FetchEventKind::Complete)
            .filter_map(|e| e.duration)
            .take(LATENCY_WINDOW)
            .map(|d| d.as_millis() as u64)
            .collect();
        latencies.sort_unstable();
        let p50_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies[latencies.len() / 2])
        };

        let total_fetches: u64 = inner.events.iter().filter(|e| e.kind != FetchEventKind::Start).count() as u64;
        let total_errors: u64 = inner
            .events
            .iter()
            .filter(|e| e.kind == FetchEventKind::Error)
            .count() as u64;
        let error_rate = if total_fetches == 0 {
            0.0
        } else {
            total_errors as f64 / total_fetches as f64
        };

        // Apdex is the mean of the navigation quality log; 1.0 on an empty log.
        let apdex = if inner.navigation.is_empty() {
            1.0
        } else {
            inner.navigation.iter().map(|n| n.quality).sum::<f64>() / inner.navigation.len() as f64
        };

        Summary {
            active_pools,
            p50_latency_ms,
            error_rate,
            apdex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_apdex_1_on_empty_log() {
        let metrics = Metrics::new();
        assert_eq!(metrics.summary().apdex, 1.0);
    }

    #[test]
    fn aggregate_counts_fetches_and_errors() {
        let metrics = Metrics::new();
        metrics.record_fetch_complete("k", Duration::from_millis(10), Some(100));
        metrics.record_fetch_error("k", Duration::from_millis(20));

        let aggregate = metrics.aggregate("k").unwrap();
        assert_eq!(aggregate.fetch_count, 2);
        assert_eq!(aggregate.error_count, 1);

        let summary = metrics.summary();
        assert_eq!(summary.active_pools, 1);
        assert!((summary.error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reporter_fires_without_deadlocking() {
        let metrics = Metrics::new();
        let seen = Arc::new(parking_lot::Mutex::new(0u64));
        let seen2 = Arc::clone(&seen);
        metrics.register_reporter(
            "k",
            Arc::new(move |aggregate| {
                *seen2.lock() = aggregate.fetch_count;
            }),
        );
        metrics.record_fetch_complete("k", Duration::from_millis(5), None);
        assert_eq!(*seen.lock(), 1);

        metrics.unregister_reporter("k");
        metrics.record_fetch_complete("k", Duration::from_millis(5), None);
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let metrics = Metrics::new();
        for _ in 0..(FETCH_RING_CAPACITY + 10) {
            metrics.record_fetch_complete("k", Duration::from_millis(1), None);
        }
        assert_eq!(metrics.inner.read().events.len(), FETCH_RING_CAPACITY);
    }
}
