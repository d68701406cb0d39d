//! Typed, self-refreshing single-value cache cell.
//!
//! A [`Pool`] owns the current best value for one logical query:
//! TTL/stale-while-revalidate expiry, fetch deduplication, a generation
//! guard that neutralizes completions from before a [`Pool::clear`], and an
//! adaptive polling interval advisory.

pub mod keyed;
pub mod mutating;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::metrics::Metrics;
use crate::notify::Notification;
use crate::snapshot::{Freshness, PoolConfig, Snapshot};

/// A fetch function: given a cancellation scope, produce the pool's value
/// or an error. Must honor cancellation and return promptly when canceled.
pub type FetchFn<T> = Arc<
    dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>
        + Send
        + Sync,
>;

/// A deferred action returned by [`Pool::fetch`]/[`Pool::fetch_if_stale`].
/// Nothing happens until it is awaited; it is `None` when the pool declines
/// to start a new fetch (already in flight, or still within `FreshTTL`).
pub type Command = Option<Pin<Box<dyn Future<Output = ()> + Send>>>;

/// Capability set every pool-like handle exposes uniformly, so a [`crate::realm::Realm`]
/// can manage a heterogeneous map of them.
pub trait PoolHandle: Send + Sync {
    fn key(&self) -> &str;
    fn invalidate(&self);
    fn clear(&self);
}

struct PoolState<T> {
    snapshot: Snapshot<T>,
    version: u64,
    generation: u64,
    in_flight: bool,
    miss_count: u32,
    focused: bool,
    push_mode: bool,
}

impl<T: Default> PoolState<T> {
    fn new() -> Self {
        Self {
            snapshot: Snapshot::empty(),
            version: 0,
            generation: 0,
            in_flight: false,
            miss_count: 0,
            focused: true,
            push_mode: false,
        }
    }
}

pub struct Pool<T> {
    key: String,
    config: PoolConfig,
    state: Mutex<PoolState<T>>,
    fetch_fn: FetchFn<T>,
    notify: Arc<dyn Fn(Notification) + Send + Sync>,
    metrics: Mutex<Option<Arc<Metrics>>>,
}

impl<T> Pool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(
        key: impl Into<String>,
        config: PoolConfig,
        fetch_fn: FetchFn<T>,
        notify: Arc<dyn Fn(Notification) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            config,
            state: Mutex::new(PoolState::new()),
            fetch_fn,
            notify,
            metrics: Mutex::new(None),
        })
    }

    /// Attaches the `Metrics` collector this pool reports into, so `clear()`
    /// can unregister its reporter under that key. Not set automatically at
    /// construction — a caller that wires up `Metrics::register_reporter`
    /// for this pool's key is expected to call this too.
    pub fn attach_metrics(&self, metrics: Arc<Metrics>) {
        *self.metrics.lock() = Some(metrics);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the current snapshot, recomputing freshness from wall-clock
    /// time. Never blocks, never triggers IO.
    pub fn get(&self) -> Snapshot<T> {
        let state = self.state.lock();
        state.snapshot.computed_view(&self.config, Instant::now())
    }

    /// Returns a deferred fetch action, or `None` if one is already running.
    pub fn fetch(self: &Arc<Self>) -> Command {
        let generation = {
            let mut state = self.state.lock();
            if state.in_flight {
                return None;
            }
            state.in_flight = true;
            if state.snapshot.has_data {
                state.snapshot.state = Freshness::Loading;
            }
            state.generation
        };
        let this = Arc::clone(self);
        Some(Box::pin(async move {
            this.run_fetch(generation, CancellationToken::new()).await;
        }))
    }

    /// Same as [`Pool::fetch`] but runs under a caller-supplied scope, so a
    /// [`crate::realm::Realm`] teardown can cancel it.
    pub fn fetch_scoped(self: &Arc<Self>, scope: CancellationToken) -> Command {
        let generation = {
            let mut state = self.state.lock();
            if state.in_flight {
                return None;
            }
            state.in_flight = true;
            if state.snapshot.has_data {
                state.snapshot.state = Freshness::Loading;
            }
            state.generation
        };
        let this = Arc::clone(self);
        Some(Box::pin(async move {
            this.run_fetch(generation, scope).await;
        }))
    }

    /// Returns [`Pool::fetch_scoped`] unless in-flight or Fresh-and-within-TTL.
    pub fn fetch_if_stale(self: &Arc<Self>, scope: CancellationToken) -> Command {
        {
            let state = self.state.lock();
            if state.in_flight {
                return None;
            }
            let view = state.snapshot.computed_view(&self.config, Instant::now());
            if matches!(view.state, Freshness::Fresh) {
                return None;
            }
        }
        self.fetch_scoped(scope)
    }

    async fn run_fetch(self: &Arc<Self>, generation: u64, scope: CancellationToken) {
        tracing::debug!(pool = %self.key, "fetch started");
        let result = (self.fetch_fn)(scope).await;
        self.complete_fetch(generation, result);
    }

    fn complete_fetch(&self, generation: u64, result: Result<T, Error>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            // Superseded by Clear(); discard silently, no notification.
            tracing::debug!(pool = %self.key, "discarding stale fetch completion");
            return;
        }
        state.in_flight = false;
        match result {
            Ok(data) => {
                state.snapshot = Snapshot {
                    data,
                    state: Freshness::Fresh,
                    error: None,
                    fetched_at: Some(Instant::now()),
                    has_data: true,
                };
                state.version += 1;
                state.miss_count = 0;
                tracing::debug!(pool = %self.key, version = state.version, "fetch succeeded");
            }
            Err(err) => {
                tracing::warn!(pool = %self.key, error = %err, "fetch failed");
                state.snapshot.state = Freshness::Error;
                state.snapshot.error = Some(err);
                state.miss_count = state.miss_count.saturating_add(1);
            }
        }
        drop(state);
        (self.notify)(Notification::PoolUpdated {
            key: self.key.clone(),
        });
    }

    /// Demote Fresh to Stale. Never discards data.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.snapshot.state == Freshness::Fresh {
            state.snapshot.state = Freshness::Stale;
        }
    }

    /// Install data as if a successful fetch just occurred. Used for
    /// prefetch and optimistic writes.
    pub fn set(&self, data: T) {
        let mut state = self.state.lock();
        state.snapshot = Snapshot {
            data,
            state: Freshness::Fresh,
            error: None,
            fetched_at: Some(Instant::now()),
            has_data: true,
        };
        state.version += 1;
    }

    /// Bump generation, zero the snapshot, drop the in-flight flag. Any
    /// fetch already running will be discarded on completion. Unregisters
    /// this pool's metrics reporter, if any, after releasing the pool lock —
    /// never while holding it, to avoid a lock-order inversion with Metrics.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.snapshot = Snapshot::empty();
            state.in_flight = false;
            state.miss_count = 0;
        }
        if let Some(metrics) = self.metrics.lock().clone() {
            metrics.unregister_reporter(&self.key);
        }
    }

    pub fn set_focused(&self, focused: bool) {
        self.state.lock().focused = focused;
    }

    pub fn set_push_mode(&self, push_mode: bool) {
        self.state.lock().push_mode = push_mode;
    }

    pub fn record_hit(&self) {
        self.state.lock().miss_count = 0;
    }

    pub fn record_miss(&self) {
        let mut state = self.state.lock();
        state.miss_count = state.miss_count.saturating_add(1);
    }

    /// Adaptive polling interval advisory.
    pub fn poll_interval(&self) -> Duration {
        if self.config.poll_base.is_zero() {
            return Duration::ZERO;
        }
        let state = self.state.lock();
        let base = if state.focused {
            self.config.poll_base
        } else if !self.config.poll_bg.is_zero() {
            self.config.poll_bg
        } else {
            self.config.poll_base
        };
        let mut iv = if state.push_mode { base * 10 } else { base };
        for _ in 0..state.miss_count {
            iv *= 2;
            if !self.config.poll_max.is_zero() && iv >= self.config.poll_max {
                return self.config.poll_max;
            }
        }
        iv
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl<T> PoolHandle for Pool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        self.key()
    }

    fn invalidate(&self) {
        Pool::invalidate(self)
    }

    fn clear(&self) {
        Pool::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_notify() -> Arc<dyn Fn(Notification) + Send + Sync> {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn dedup_runs_fetch_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());
        let calls2 = Arc::clone(&calls);
        let gate2 = Arc::clone(&gate);
        let fetch_fn: FetchFn<String> = Arc::new(move |_scope| {
            let calls = Arc::clone(&calls2);
            let gate = Arc::clone(&gate2);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok("hello".to_string())
            })
        });
        let pool = Pool::new("k", PoolConfig::default(), fetch_fn, noop_notify());

        let cmd1 = pool.fetch();
        let cmd2 = pool.fetch();
        assert!(cmd1.is_some());
        assert!(cmd2.is_none());

        let handle = tokio::spawn(cmd1.unwrap());
        // give the fetch a chance to register its call before releasing it
        tokio::task::yield_now().await;
        gate.notify_one();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snap = pool.get();
        assert_eq!(snap.state, Freshness::Fresh);
        assert_eq!(snap.data, "hello");
    }

    #[tokio::test]
    async fn stale_then_empty_over_time() {
        let fetch_fn: FetchFn<String> =
            Arc::new(|_scope| Box::pin(async move { Ok("x".to_string()) }));
        let config =
            PoolConfig::new(Duration::from_millis(20), Duration::from_millis(30));
        let pool = Pool::new("k", config, fetch_fn, noop_notify());
        pool.fetch().unwrap().await;

        let snap = pool.get();
        assert_eq!(snap.state, Freshness::Fresh);
        assert_eq!(snap.data, "x");

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(pool.get().state, Freshness::Stale);
        assert_eq!(pool.get().data, "x");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let snap = pool.get();
        assert_eq!(snap.state, Freshness::Empty);
        assert!(!snap.has_data);
    }

    #[tokio::test]
    async fn clear_discards_in_flight_result() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate2 = Arc::clone(&gate);
        let fetch_fn: FetchFn<Vec<i32>> = Arc::new(move |_scope| {
            let gate = Arc::clone(&gate2);
            Box::pin(async move {
                gate.notified().await;
                Ok(vec![1])
            })
        });
        let pool = Pool::new("k", PoolConfig::default(), fetch_fn, noop_notify());
        let cmd = pool.fetch().unwrap();
        let handle = tokio::spawn(cmd);

        tokio::task::yield_now().await;
        pool.clear();
        pool.set(vec![99]);
        gate.notify_one();
        handle.await.unwrap();

        assert_eq!(pool.get().data, vec![99]);
    }

    #[test]
    fn clear_unregisters_the_metrics_reporter() {
        let fetch_fn: FetchFn<String> = Arc::new(|_| Box::pin(async { Ok(String::new()) }));
        let pool = Pool::new("k", PoolConfig::default(), fetch_fn, noop_notify());
        let metrics = Metrics::new();
        pool.attach_metrics(Arc::clone(&metrics));

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        metrics.register_reporter("k", Arc::new(move |_| { seen2.fetch_add(1, Ordering::SeqCst); }));

        metrics.record_fetch_complete("k", Duration::from_millis(1), None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        pool.clear();
        metrics.record_fetch_complete("k", Duration::from_millis(1), None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adaptive_polling_matches_spec_scenario() {
        let config = PoolConfig::default().with_polling(
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(120),
        );
        let fetch_fn: FetchFn<()> = Arc::new(|_| Box::pin(async { Ok(()) }));
        let pool = Pool::new("k", config, fetch_fn, noop_notify());

        assert_eq!(pool.poll_interval(), Duration::from_secs(10));
        pool.record_miss();
        pool.record_miss();
        assert_eq!(pool.poll_interval(), Duration::from_secs(40));
        pool.record_hit();
        assert_eq!(pool.poll_interval(), Duration::from_secs(10));
        pool.set_focused(false);
        assert_eq!(pool.poll_interval(), Duration::from_secs(30));
        pool.set_focused(true);
        pool.set_push_mode(true);
        assert_eq!(pool.poll_interval(), Duration::from_secs(100));
        pool.set_push_mode(false);
        for _ in 0..10 {
            pool.record_miss();
        }
        assert_eq!(pool.poll_interval(), Duration::from_secs(120));
    }
}
