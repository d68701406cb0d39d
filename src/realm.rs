//! Lifecycle container: owns a cancellable scope and a set of pools.
//!
//! `Teardown` cancels in-flight work before clearing owned pools, and is
//! idempotent with respect to them. The realm tree (global → account →
//! project) is strictly a tree: cross-cutting access (a pool borrowing the
//! account's client) goes through the [`crate::hub::Hub`] rather than
//! back-pointers, so teardown is a simple pre-order traversal.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::pool::PoolHandle;

/// Type-erased storage for a pool-like handle, downcast back to its
/// concrete type by [`realm_pool`]. `as_any_arc` avoids relying on trait
/// upcasting (stabilized too recently to depend on for `rust-version`
/// here) by handing back an `Arc<dyn Any>` built from a fresh clone.
trait AnyHandle: PoolHandle {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<P: PoolHandle + Any + Send + Sync> AnyHandle for P {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub struct Realm {
    name: String,
    scope: CancellationToken,
    handles: RwLock<DashMap<String, Arc<dyn AnyHandle + Send + Sync>>>,
}

impl Realm {
    pub fn new(name: impl Into<String>, parent_scope: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            scope: parent_scope.child_token(),
            handles: RwLock::new(DashMap::new()),
        })
    }

    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            scope: CancellationToken::new(),
            handles: RwLock::new(DashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> CancellationToken {
        self.scope.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn register<P>(&self, key: impl Into<String>, handle: Arc<P>)
    where
        P: PoolHandle + Any + Send + Sync + 'static,
    {
        self.handles.read().insert(key.into(), handle as Arc<dyn AnyHandle + Send + Sync>);
    }

    pub fn pool<P>(&self, key: &str) -> Option<Arc<P>>
    where
        P: PoolHandle + Any + Send + Sync + 'static,
    {
        let entry = self.handles.read().get(key)?.clone();
        entry.as_any_arc().downcast::<P>().ok()
    }

    pub fn invalidate(&self) {
        for entry in self.handles.read().iter() {
            entry.value().invalidate();
        }
    }

    /// Cancel the scope first, then clear every owned pool, then replace
    /// the map. Idempotent: tearing down twice is a no-op the second time.
    pub fn teardown(&self) {
        self.scope.cancel();
        let map = self.handles.read();
        for entry in map.iter() {
            entry.value().clear();
        }
        drop(map);
        *self.handles.write() = DashMap::new();
    }
}

/// Typed memoization helper: check-and-insert happen under a single
/// `DashMap::entry` acquisition (itself inside the realm's outer read lock,
/// which only ever excludes a concurrent `teardown` swapping the whole map),
/// so two callers racing the first access to the same key cannot both build
/// a pool and have one silently overwrite the other. Panics on a key
/// collision with an incompatible type — a programmer error, since the
/// realm's key scheme should be collision-free by construction.
pub fn realm_pool<P>(realm: &Realm, key: &str, create_fn: impl FnOnce() -> Arc<P>) -> Arc<P>
where
    P: PoolHandle + Any + Send + Sync + 'static,
{
    let map = realm.handles.read();
    let handle = match map.entry(key.to_string()) {
        dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
        dashmap::mapref::entry::Entry::Vacant(entry) => {
            let handle = create_fn() as Arc<dyn AnyHandle + Send + Sync>;
            entry.insert(Arc::clone(&handle));
            handle
        }
    };
    handle
        .as_any_arc()
        .downcast::<P>()
        .unwrap_or_else(|_| panic!("realm pool key {key:?} registered with a different type"))
}
