//! Pool extended with optimistic local apply + remote apply + reconcile.
//!
//! A [`Mutation`] is a polymorphic record: `apply_locally` is pure,
//! `apply_remotely` is side-effectful, `is_reflected_in` is a pure predicate
//! used during reconcile to drop mutations the new remote value already
//! contains.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::metrics::Metrics;
use crate::notify::{NotifySink, Notification};
use crate::pool::{Command, FetchFn, PoolHandle};
use crate::snapshot::{Freshness, PoolConfig, Snapshot};

/// A user-initiated change to a pool's value of type `T`.
pub trait Mutation<T>: Send + Sync {
    /// Pure: fold this mutation's effect into `current`.
    fn apply_locally(&self, current: T) -> T;

    /// Side-effectful: perform the remote call. Must honor `scope`.
    fn apply_remotely<'a>(
        &'a self,
        scope: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    /// Pure: does `remote` already reflect this mutation's effect?
    fn is_reflected_in(&self, remote: &T) -> bool;
}

struct PendingMutation<T> {
    id: u64,
    mutation: Arc<dyn Mutation<T>>,
}

struct MutatingState<T> {
    snapshot: Snapshot<T>,
    version: u64,
    generation: u64,
    in_flight: bool,
    miss_count: u32,
    focused: bool,
    push_mode: bool,
    pending: Vec<PendingMutation<T>>,
    last_remote: Option<T>,
    has_remote: bool,
}

impl<T: Default> MutatingState<T> {
    fn new() -> Self {
        Self {
            snapshot: Snapshot::empty(),
            version: 0,
            generation: 0,
            in_flight: false,
            miss_count: 0,
            focused: true,
            push_mode: false,
            pending: Vec::new(),
            last_remote: None,
            has_remote: false,
        }
    }
}

pub struct MutatingPool<T> {
    key: String,
    config: PoolConfig,
    state: Mutex<MutatingState<T>>,
    fetch_fn: FetchFn<T>,
    notify: NotifySink,
    next_mutation_id: AtomicU64,
    metrics: Mutex<Option<Arc<Metrics>>>,
}

impl<T> MutatingPool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(
        key: impl Into<String>,
        config: PoolConfig,
        fetch_fn: FetchFn<T>,
        notify: NotifySink,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            config,
            state: Mutex::new(MutatingState::new()),
            fetch_fn,
            notify,
            next_mutation_id: AtomicU64::new(1),
            metrics: Mutex::new(None),
        })
    }

    /// Attaches the `Metrics` collector this pool reports into, so `clear()`
    /// can unregister its reporter under that key.
    pub fn attach_metrics(&self, metrics: Arc<Metrics>) {
        *self.metrics.lock() = Some(metrics);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> Snapshot<T> {
        let state = self.state.lock();
        state.snapshot.computed_view(&self.config, Instant::now())
    }

    pub fn pending_mutations(&self) -> usize {
        self.state.lock().pending.len()
    }

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

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.snapshot.state == Freshness::Fresh {
            state.snapshot.state = Freshness::Stale;
        }
    }

    /// Bump generation, drop snapshot AND the reconciliation bookkeeping.
    /// Unregisters this pool's metrics reporter, if any, after releasing the
    /// pool lock — never while holding it, to avoid a lock-order inversion
    /// with Metrics.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.snapshot = Snapshot::empty();
            state.in_flight = false;
            state.miss_count = 0;
            state.pending.clear();
            state.last_remote = None;
            state.has_remote = false;
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

    /// Apply a mutation optimistically and return a deferred action that
    /// performs the remote apply + reconcile.
    pub fn apply(self: &Arc<Self>, scope: CancellationToken, mutation: Arc<dyn Mutation<T>>) -> Command {
        let (generation, id) = {
            let mut state = self.state.lock();
            if !state.has_remote && state.snapshot.has_data {
                state.last_remote = Some(state.snapshot.data.clone());
                state.has_remote = true;
            }
            let id = self.next_mutation_id.fetch_add(1, Ordering::SeqCst);
            state.pending.push(PendingMutation {
                id,
                mutation: Arc::clone(&mutation),
            });
            if state.snapshot.has_data {
                let new_data = mutation.apply_locally(state.snapshot.data.clone());
                state.snapshot.data = new_data;
                state.snapshot.state = Freshness::Fresh;
                state.snapshot.error = None;
                state.version += 1;
            }
            (state.generation, id)
        };

        let this = Arc::clone(self);
        Some(Box::pin(async move {
            let remote_result = mutation.apply_remotely(scope.clone()).await;
            match remote_result {
                Err(err) => {
                    if this.rollback(generation, id) {
                        (this.notify)(Notification::MutationError {
                            key: this.key.clone(),
                            error: err,
                        });
                        (this.notify)(Notification::PoolUpdated {
                            key: this.key.clone(),
                        });
                    }
                }
                Ok(()) => {
                    let fetch_result = (this.fetch_fn)(scope).await;
                    match fetch_result {
                        Err(_) => {
                            // Optimistic state remains; only notify if this
                            // generation is still current.
                            if this.state.lock().generation == generation {
                                (this.notify)(Notification::PoolUpdated {
                                    key: this.key.clone(),
                                });
                            }
                        }
                        Ok(remote) => {
                            if this.reconcile(generation, remote) {
                                (this.notify)(Notification::PoolUpdated {
                                    key: this.key.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }))
    }

    /// Rebuild current state from a fresh remote value, dropping pending
    /// mutations already reflected in it. Returns `false` (and leaves state
    /// untouched) if `generation` is stale — the pool was cleared since this
    /// mutation started, so the outcome must be discarded silently.
    fn reconcile(&self, generation: u64, remote: T) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.last_remote = Some(remote.clone());
        state.has_remote = true;
        state.pending.retain(|p| !p.mutation.is_reflected_in(&remote));
        let rebuilt = state
            .pending
            .iter()
            .fold(remote, |acc, p| p.mutation.apply_locally(acc));
        state.snapshot = Snapshot {
            data: rebuilt,
            state: Freshness::Fresh,
            error: None,
            fetched_at: Some(Instant::now()),
            has_data: true,
        };
        state.version += 1;
        true
    }

    /// Drops the pending mutation `id`, rebuilding the snapshot from the
    /// last known remote value. Returns `false` if `generation` is stale or
    /// the mutation was already removed (e.g. by a concurrent `reconcile`),
    /// in which case the caller must stay silent.
    fn rollback(&self, generation: u64, id: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let before = state.pending.len();
        state.pending.retain(|p| p.id != id);
        if state.pending.len() == before {
            return false;
        }
        if state.has_remote {
            let base = state.last_remote.clone().unwrap_or_default();
            let rebuilt = state
                .pending
                .iter()
                .fold(base, |acc, p| p.mutation.apply_locally(acc));
            state.snapshot.data = rebuilt;
            state.version += 1;
        }
        true
    }

    /// Overridden Fetch: success routes through reconcile instead of
    /// overwriting pending mutations.
    pub fn fetch(self: &Arc<Self>, scope: CancellationToken) -> Command {
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
            let result = (this.fetch_fn)(scope).await;
            let mut state = this.state.lock();
            if state.generation != generation {
                return;
            }
            state.in_flight = false;
            drop(state);
            match result {
                Ok(remote) => {
                    let _ = this.reconcile(generation, remote);
                }
                Err(err) => {
                    let mut state = this.state.lock();
                    if state.generation == generation {
                        state.snapshot.state = Freshness::Error;
                        state.snapshot.error = Some(err);
                        state.miss_count = state.miss_count.saturating_add(1);
                    }
                }
            }
            (this.notify)(Notification::PoolUpdated {
                key: this.key.clone(),
            });
        }))
    }

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
        self.fetch(scope)
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }
}

impl<T> PoolHandle for MutatingPool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        self.key()
    }

    fn invalidate(&self) {
        MutatingPool::invalidate(self)
    }

    fn clear(&self) {
        MutatingPool::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Todo {
        id: u64,
        completed: bool,
    }

    struct CompleteMutation {
        id: u64,
        remote_err: Option<String>,
    }

    impl Mutation<Vec<Todo>> for CompleteMutation {
        fn apply_locally(&self, mut current: Vec<Todo>) -> Vec<Todo> {
            for t in current.iter_mut() {
                if t.id == self.id {
                    t.completed = true;
                }
            }
            current
        }

        fn apply_remotely<'a>(
            &'a self,
            _scope: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
            Box::pin(async move {
                match &self.remote_err {
                    Some(msg) => Err(Error::api_error(msg.clone())),
                    None => Ok(()),
                }
            })
        }

        fn is_reflected_in(&self, remote: &Vec<Todo>) -> bool {
            remote.iter().any(|t| t.id == self.id && t.completed)
        }
    }

    fn seed() -> Vec<Todo> {
        vec![
            Todo { id: 1, completed: false },
            Todo { id: 2, completed: false },
            Todo { id: 3, completed: false },
        ]
    }

    fn noop_notify() -> NotifySink {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn optimistic_completion_then_reconcile() {
        let remote_after = Arc::new(Mutex::new(seed()));
        let remote_after2 = Arc::clone(&remote_after);
        let fetch_fn: FetchFn<Vec<Todo>> = Arc::new(move |_scope| {
            let remote_after = Arc::clone(&remote_after2);
            Box::pin(async move { Ok(remote_after.lock().clone()) })
        });
        let pool = MutatingPool::new("todos", PoolConfig::default(), fetch_fn, noop_notify());
        pool.set(seed());

        let mutation = Arc::new(CompleteMutation { id: 1, remote_err: None });
        let cmd = pool
            .apply(CancellationToken::new(), mutation)
            .expect("command");

        assert!(pool.get().data[0].completed);

        {
            let mut remote = remote_after.lock();
            remote[0].completed = true;
        }
        cmd.await;

        assert_eq!(pool.pending_mutations(), 0);
        assert!(pool.get().data[0].completed);
    }

    #[tokio::test]
    async fn optimistic_failure_rolls_back() {
        let fetch_fn: FetchFn<Vec<Todo>> = Arc::new(|_scope| Box::pin(async move { Ok(seed()) }));
        let pool = MutatingPool::new("todos", PoolConfig::default(), fetch_fn, noop_notify());
        pool.set(seed());

        let mutation = Arc::new(CompleteMutation {
            id: 1,
            remote_err: Some("server error".into()),
        });
        let cmd = pool
            .apply(CancellationToken::new(), mutation)
            .expect("command");

        assert!(pool.get().data[0].completed);
        cmd.await;

        assert!(!pool.get().data[0].completed);
    }

    #[tokio::test]
    async fn clear_during_in_flight_apply_wins() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate2 = Arc::clone(&gate);
        let fetch_fn: FetchFn<Vec<Todo>> = Arc::new(move |_scope| {
            let gate = Arc::clone(&gate2);
            Box::pin(async move {
                gate.notified().await;
                Ok(vec![Todo { id: 1, completed: true }])
            })
        });
        let pool = MutatingPool::new("todos", PoolConfig::default(), fetch_fn, noop_notify());
        pool.set(vec![Todo { id: 1, completed: false }]);

        let mutation = Arc::new(CompleteMutation { id: 1, remote_err: None });
        let cmd = pool
            .apply(CancellationToken::new(), mutation)
            .expect("command");
        let handle = tokio::spawn(cmd);

        tokio::task::yield_now().await;
        pool.clear();
        pool.set(vec![Todo { id: 99, completed: false }]);
        gate.notify_one();
        handle.await.unwrap();

        assert_eq!(pool.get().data, vec![Todo { id: 99, completed: false }]);
    }

    #[tokio::test]
    async fn clear_mid_apply_suppresses_the_notify() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate2 = Arc::clone(&gate);
        let fetch_fn: FetchFn<Vec<Todo>> = Arc::new(move |_scope| {
            let gate = Arc::clone(&gate2);
            Box::pin(async move {
                gate.notified().await;
                Ok(vec![Todo { id: 1, completed: true }])
            })
        });
        let notify_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let notify_count2 = Arc::clone(&notify_count);
        let notify: NotifySink = Arc::new(move |_| {
            notify_count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let pool = MutatingPool::new("todos", PoolConfig::default(), fetch_fn, notify);
        pool.set(vec![Todo { id: 1, completed: false }]);

        let mutation = Arc::new(CompleteMutation { id: 1, remote_err: None });
        let cmd = pool
            .apply(CancellationToken::new(), mutation)
            .expect("command");
        let handle = tokio::spawn(cmd);

        tokio::task::yield_now().await;
        pool.clear();
        gate.notify_one();
        handle.await.unwrap();

        assert_eq!(notify_count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
