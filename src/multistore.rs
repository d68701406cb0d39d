//! Owns the root API client, the discovered tenant account list, and
//! memoized per-account clients.
//!
//! `ClientFor` memoizes; `Accounts()`/`Identity()` return defensive copies
//! so callers cannot mutate the store's internal state through a returned
//! reference.

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::client::{AccountClient, Identity, RootClient};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
}

pub struct MultiStore {
    root: Arc<dyn RootClient>,
    accounts: ArcSwap<Vec<AccountInfo>>,
    identity: ArcSwapOption<Identity>,
    clients: DashMap<String, Arc<dyn AccountClient>>,
}

impl MultiStore {
    pub fn new(root: Arc<dyn RootClient>) -> Arc<Self> {
        Arc::new(Self {
            root,
            accounts: ArcSwap::from_pointee(Vec::new()),
            identity: ArcSwapOption::empty(),
            clients: DashMap::new(),
        })
    }

    /// Invokes the identity endpoint and stores the ordered, deduplicated
    /// list of non-expired accounts plus the logged-in identity. Safe to
    /// call repeatedly; later calls refresh the list. `accounts()` is read
    /// on every fan-out slot, so this is a swap rather than a lock: readers
    /// never block behind a writer here.
    pub async fn discover_accounts(&self, scope: CancellationToken) -> Result<(), Error> {
        let info = self.root.authorization_get_info(scope).await?;
        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::with_capacity(info.accounts.len());
        for account in info.accounts {
            if seen.insert(account.id.clone()) {
                deduped.push(account);
            }
        }
        self.accounts.store(Arc::new(deduped));
        self.identity.store(Some(Arc::new(info.identity)));
        Ok(())
    }

    pub fn accounts(&self) -> Vec<AccountInfo> {
        (**self.accounts.load()).clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.load_full().map(|identity| (*identity).clone())
    }

    /// Memoized per-account client; `None` if the root client cannot
    /// produce one (used by tests and for accounts that vanish between
    /// discovery and use).
    pub fn client_for(&self, account_id: &str) -> Option<Arc<dyn AccountClient>> {
        if let Some(existing) = self.clients.get(account_id) {
            return Some(Arc::clone(&existing));
        }
        let client = self.root.for_account(account_id)?;
        match self.clients.entry(account_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&client));
                Some(client)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FakeRootClient;

    #[tokio::test]
    async fn discover_accounts_dedups_and_stores_identity() {
        let client = FakeRootClient::new();
        client.seed_accounts(vec![
            AccountInfo { id: "1".into(), name: "Acme".into() },
            AccountInfo { id: "1".into(), name: "Acme".into() },
            AccountInfo { id: "2".into(), name: "Globex".into() },
        ]);
        let store = MultiStore::new(Arc::new(client));
        store.discover_accounts(CancellationToken::new()).await.unwrap();

        let accounts = store.accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "1");
        assert_eq!(accounts[1].id, "2");
        assert!(store.identity().is_some());
    }

    #[test]
    fn client_for_memoizes() {
        let client = FakeRootClient::new();
        client.seed_accounts(vec![AccountInfo { id: "1".into(), name: "Acme".into() }]);
        let store = MultiStore::new(Arc::new(client));

        let a = store.client_for("1").unwrap();
        let b = store.client_for("1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
