//! The observable value of a [`crate::pool::Pool`] at an instant.

use std::time::{Duration, Instant};

use crate::error::Error;

/// Freshness state of a [`Snapshot`]. `Loading` is an overlay: it can
/// coexist with prior data and does not itself imply `HasData == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Empty,
    Fresh,
    Stale,
    Loading,
    Error,
}

/// The Pool's durations: how long a fetched value stays `Fresh`, how much
/// longer it stays servable as `Stale`, and the polling cadences that feed
/// [`crate::poller::Poller`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// 0 means "never expires out of Fresh".
    pub fresh_ttl: Duration,
    /// 0 means "never expires past Fresh" (Fresh data is servable forever
    /// once stale, until a later fetch or clear).
    pub stale_ttl: Duration,
    pub poll_base: Duration,
    pub poll_bg: Duration,
    pub poll_max: Duration,
}

impl PoolConfig {
    pub const fn new(fresh_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            fresh_ttl,
            stale_ttl,
            poll_base: Duration::ZERO,
            poll_bg: Duration::ZERO,
            poll_max: Duration::ZERO,
        }
    }

    pub const fn with_polling(
        mut self,
        poll_base: Duration,
        poll_bg: Duration,
        poll_max: Duration,
    ) -> Self {
        self.poll_base = poll_base;
        self.poll_bg = poll_bg;
        self.poll_max = poll_max;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(120))
    }
}

/// Immutable, typed observable value of a Pool.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub data: T,
    pub state: Freshness,
    pub error: Option<Error>,
    pub fetched_at: Option<Instant>,
    pub has_data: bool,
}

impl<T: Default> Snapshot<T> {
    pub fn empty() -> Self {
        Self {
            data: T::default(),
            state: Freshness::Empty,
            error: None,
            fetched_at: None,
            has_data: false,
        }
    }
}

impl<T: Default + Clone> Snapshot<T> {
    /// Recompute the effective freshness state from wall-clock time without
    /// mutating any stored field. This is what [`crate::pool::Pool::get`]
    /// calls; it never blocks and never triggers IO.
    pub(crate) fn computed_view(&self, config: &PoolConfig, now: Instant) -> Snapshot<T> {
        let Some(fetched_at) = self.fetched_at else {
            return self.clone();
        };
        // Loading and Error overlays are returned as stored; only
        // Fresh/Stale degrade with age.
        if !matches!(self.state, Freshness::Fresh | Freshness::Stale) {
            return self.clone();
        }
        let age = now.saturating_duration_since(fetched_at);
        let fresh_ttl = (!config.fresh_ttl.is_zero()).then_some(config.fresh_ttl);
        if let Some(ttl) = fresh_ttl {
            if age >= ttl {
                let expired = !config.stale_ttl.is_zero() && age >= ttl + config.stale_ttl;
                if expired {
                    return Snapshot::empty();
                }
                return Snapshot {
                    state: Freshness::Stale,
                    ..self.clone()
                };
            }
        }
        self.clone()
    }
}
