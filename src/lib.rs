//! Reactive data layer for a terminal client: typed self-refreshing cache
//! cells, optimistic mutations, scoped realm lifecycles and multi-tenant
//! fan-out over a shared rate budget. Screens, rendering and key bindings
//! are external collaborators that sit on top of this crate.

pub mod client;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod hub;
pub mod metrics;
pub mod multistore;
pub mod mutations;
pub mod notify;
pub mod pool;
pub mod poller;
pub mod realm;
pub mod recents;
pub mod snapshot;

pub use error::{Error, ErrorKind, Result};
pub use hub::Hub;
pub use notify::Notification;
pub use snapshot::{Freshness, Snapshot};
