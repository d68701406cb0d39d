//! Notification surface exposed by the data layer.
//!
//! These are lightweight, keyed messages; screens must re-read
//! [`crate::pool::Pool::get`] rather than trust a message's payload, since
//! notifications may arrive out of order with respect to a screen's own
//! requests.

use crate::error::Error;

#[derive(Debug, Clone)]
pub enum Notification {
    /// Any terminal transition (Fresh, Stale, Error, Empty) of the pool
    /// identified by `key`.
    PoolUpdated { key: String },
    /// A mutation's remote apply failed; rollback has already been applied
    /// to the pool's snapshot by the time this fires.
    MutationError { key: String, error: Error },
    /// An adaptive-polling timer expired for channel `tag`; a screen should
    /// consider calling `FetchIfStale`.
    PollTick { tag: String },
}

/// A `Fn(Notification)` sink, cheaply cloneable, passed down into every
/// [`crate::pool::Pool`] so it can emit without knowing who's listening.
/// A minimal in-process pub/sub: callers that want fan-out register
/// multiple sinks via [`Notifier::new`]'s `Vec` of subscribers.
pub type NotifySink = std::sync::Arc<dyn Fn(Notification) + Send + Sync>;

/// A broadcast-style notifier: every registered subscriber closure is
/// invoked for every notification. Subscribers are plain closures rather
/// than a channel so both sync screens-under-test and async UIs can
/// consume notifications the way that fits them.
#[derive(Clone, Default)]
pub struct Notifier {
    subscribers: std::sync::Arc<parking_lot::Mutex<Vec<NotifySink>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: NotifySink) {
        self.subscribers.lock().push(sink);
    }

    pub fn sink(&self) -> NotifySink {
        let subscribers = std::sync::Arc::clone(&self.subscribers);
        std::sync::Arc::new(move |n: Notification| {
            for sub in subscribers.lock().iter() {
                sub(n.clone());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifier_fans_out_to_all_subscribers() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        notifier.subscribe(Arc::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        let count3 = Arc::clone(&count);
        notifier.subscribe(Arc::new(move |_| {
            count3.fetch_add(1, Ordering::SeqCst);
        }));

        (notifier.sink())(Notification::PoolUpdated { key: "k".into() });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
