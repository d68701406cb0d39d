//! Cross-module scenarios that need the Hub, MultiStore, FanOut and Pool
//! wired together — scenarios no single unit test can exercise on its own.

use std::sync::Arc;

use hubdata::client::FakeRootClient;
use hubdata::hub::Hub;
use hubdata::multistore::{AccountInfo, MultiStore};
use hubdata::poller::PollerConfig;
use tokio_util::sync::CancellationToken;

fn hub_with_accounts(accounts: Vec<AccountInfo>) -> Arc<Hub> {
    let client = FakeRootClient::new();
    client.seed_accounts(accounts);
    let multistore = MultiStore::new(Arc::new(client));
    Hub::new(multistore, PollerConfig::default())
}

#[tokio::test]
async fn todos_accessor_fetches_through_the_project_realm() {
    let hub = hub_with_accounts(vec![AccountInfo {
        id: "1".into(),
        name: "Acme".into(),
    }]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();

    hub.ensure_account("1");
    hub.ensure_project("100");

    let pool = hub.todos(100, 5).expect("todos pool");
    pool.fetch(CancellationToken::new())
        .expect("fetch command")
        .await;

    let snapshot = pool.get();
    assert!(snapshot.has_data);
    assert!(snapshot.data.is_empty());
}

#[tokio::test]
async fn same_keyed_pool_identity_across_repeated_lookups() {
    let hub = hub_with_accounts(vec![AccountInfo {
        id: "1".into(),
        name: "Acme".into(),
    }]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();
    hub.ensure_account("1");
    hub.ensure_project("100");

    let a = hub.todos(100, 5).unwrap();
    let b = hub.todos(100, 5).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let other_list = hub.todos(100, 6).unwrap();
    assert!(!Arc::ptr_eq(&a, &other_list));
}

#[tokio::test]
async fn switching_accounts_invalidates_project_scoped_pools() {
    let hub = hub_with_accounts(vec![
        AccountInfo { id: "1".into(), name: "Acme".into() },
        AccountInfo { id: "2".into(), name: "Globex".into() },
    ]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();

    hub.ensure_account("1");
    hub.ensure_project("100");
    let todos = hub.todos(100, 5).unwrap();
    todos.set(vec![]);
    assert!(todos.get().has_data);

    hub.ensure_account("2");
    // The old project realm's pools are cleared on teardown.
    assert!(!todos.get().has_data);
    assert_eq!(hub.account_id().as_deref(), Some("2"));
    assert_eq!(hub.project_id(), None);
}

#[tokio::test]
async fn projects_accessor_fans_out_across_every_discovered_account() {
    let hub = hub_with_accounts(vec![
        AccountInfo { id: "1".into(), name: "Acme".into() },
        AccountInfo { id: "2".into(), name: "Globex".into() },
        AccountInfo { id: "3".into(), name: "Initech".into() },
    ]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();

    let pool = hub.projects();
    pool.fetch().expect("fetch command").await;

    // FakeAccountClient returns an empty project list per account; the
    // point of this test is that fanning out across three accounts
    // doesn't error or deadlock, and the flattened result is well-formed.
    let snapshot = pool.get();
    assert!(snapshot.has_data);
    assert!(snapshot.data.is_empty());
}

#[tokio::test]
async fn projects_accessor_errors_when_no_accounts_are_discovered() {
    use hubdata::error::ErrorKind;

    let hub = hub_with_accounts(vec![]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();

    let pool = hub.projects();
    pool.fetch().expect("fetch command").await;

    let snapshot = pool.get();
    assert!(!snapshot.has_data);
    assert_eq!(snapshot.error.map(|e| e.kind), Some(ErrorKind::AuthRequired));
}

#[tokio::test]
async fn people_accessor_requires_a_known_account() {
    let hub = hub_with_accounts(vec![AccountInfo {
        id: "1".into(),
        name: "Acme".into(),
    }]);
    hub.multistore
        .discover_accounts(CancellationToken::new())
        .await
        .unwrap();

    assert!(hub.people("1").is_ok());
    assert!(hub.people("unknown").is_err());
}
