//! A family of [`Pool`]s keyed by a parent identifier, created on demand.
//!
//! The factory closure is invoked under a lock exactly once per key;
//! identity equality holds across concurrent `get(k)` calls for the same
//! key, mirroring the double-checked `dashmap::Entry` pattern
//! `loadbalance/random.rs` uses for its per-key instance caches.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::pool::PoolHandle;

pub struct KeyedPool<K, P> {
    family_key: String,
    factory: Box<dyn Fn(&K) -> Arc<P> + Send + Sync>,
    pools: DashMap<K, Arc<P>>,
}

impl<K, P> KeyedPool<K, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    P: PoolHandle + 'static,
{
    /// `family_key` identifies this whole family in a [`crate::realm::Realm`]'s
    /// handle map (e.g. `"todos"`); individual pools are addressed by `K`.
    pub fn new(
        family_key: impl Into<String>,
        factory: impl Fn(&K) -> Arc<P> + Send + Sync + 'static,
    ) -> Self {
        Self {
            family_key: family_key.into(),
            factory: Box::new(factory),
            pools: DashMap::new(),
        }
    }

    /// Returns the pool for `k`, creating it via the factory on first
    /// access. The factory runs at most once per key even under
    /// concurrent callers.
    pub fn get(&self, k: &K) -> Arc<P> {
        if let Some(existing) = self.pools.get(k) {
            return Arc::clone(&existing);
        }
        match self.pools.entry(k.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Arc::clone(entry.get()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let pool = (self.factory)(k);
                entry.insert(Arc::clone(&pool));
                pool
            }
        }
    }

    pub fn has(&self, k: &K) -> bool {
        self.pools.contains_key(k)
    }

    pub fn invalidate(&self) {
        for entry in self.pools.iter() {
            entry.value().invalidate();
        }
    }

    pub fn clear(&self) {
        for entry in self.pools.iter() {
            entry.value().clear();
        }
        self.pools.clear();
    }
}

impl<K, P> PoolHandle for KeyedPool<K, P>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    P: PoolHandle + 'static,
{
    fn key(&self) -> &str {
        &self.family_key
    }

    fn invalidate(&self) {
        KeyedPool::invalidate(self)
    }

    fn clear(&self) {
        KeyedPool::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use crate::pool::{FetchFn, Pool};
    use crate::snapshot::PoolConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn factory_runs_once_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let keyed: KeyedPool<u64, Pool<String>> = KeyedPool::new("things", move |k| {
            calls2.fetch_add(1, Ordering::SeqCst);
            let fetch_fn: FetchFn<String> = Arc::new(|_| Box::pin(async { Ok(String::new()) }));
            let notify: Arc<dyn Fn(Notification) + Send + Sync> = Arc::new(|_| {});
            Pool::new(format!("k:{k}"), PoolConfig::default(), fetch_fn, notify)
        });

        let a = keyed.get(&1);
        let b = keyed.get(&1);
        let c = keyed.get(&2);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
