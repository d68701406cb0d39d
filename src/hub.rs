//! Owner of the realm tree; source of typed pool handles.
//!
//! Three realm slots under one mutex: `global` (always
//! constructed), `account` (present iff a tenant is selected), `project`
//! (present iff a project is selected, nested under account when one
//! exists). Every typed accessor funnels through [`realm_pool`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::AccountClient;
use crate::domain::{ActivityEvent, Assignment, Checkin, Column, DocsFile, Forward, Person, Project, ScheduleEntry, Todo};
use crate::error::Error;
use crate::fanout::FanOut;
use crate::fetch;
use crate::metrics::Metrics;
use crate::multistore::MultiStore;
use crate::notify::{Notification, NotifySink, Notifier};
use crate::pool::keyed::KeyedPool;
use crate::pool::mutating::MutatingPool;
use crate::pool::Pool;
use crate::poller::{Poller, PollerConfig};
use crate::realm::{realm_pool, Realm};
use crate::snapshot::PoolConfig;

struct Slots {
    global: Arc<Realm>,
    account: Option<Arc<Realm>>,
    project: Option<Arc<Realm>>,
    account_id: Option<String>,
    project_id: Option<String>,
}

pub struct Hub {
    slots: Mutex<Slots>,
    pub multistore: Arc<MultiStore>,
    pub poller: Poller,
    pub metrics: Arc<Metrics>,
    pub notifier: Notifier,
}

impl Hub {
    pub fn new(multistore: Arc<MultiStore>, poller_config: PollerConfig) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Slots {
                global: Realm::root("global"),
                account: None,
                project: None,
                account_id: None,
                project_id: None,
            }),
            multistore,
            poller: Poller::new(poller_config),
            metrics: Metrics::new(),
            notifier: Notifier::new(),
        })
    }

    pub fn notify_sink(&self) -> NotifySink {
        self.notifier.sink()
    }

    pub fn fan_out(&self) -> FanOut {
        FanOut::new(Arc::clone(&self.multistore))
    }

    pub fn global(&self) -> Arc<Realm> {
        self.slots.lock().global.clone()
    }

    pub fn account_id(&self) -> Option<String> {
        self.slots.lock().account_id.clone()
    }

    pub fn project_id(&self) -> Option<String> {
        self.slots.lock().project_id.clone()
    }

    /// If `account == id` already, return the existing realm. Otherwise
    /// tear down project (if any), tear down account (if any), and create
    /// a fresh account realm parented on global.
    pub fn ensure_account(&self, id: &str) -> Arc<Realm> {
        let mut slots = self.slots.lock();
        if let (Some(realm), Some(current)) = (&slots.account, &slots.account_id) {
            if current == id {
                return Arc::clone(realm);
            }
        }
        if let Some(project) = slots.project.take() {
            project.teardown();
        }
        slots.project_id = None;
        if let Some(account) = slots.account.take() {
            account.teardown();
        }
        let realm = Realm::new(format!("account:{id}"), &slots.global.scope());
        slots.account = Some(Arc::clone(&realm));
        slots.account_id = Some(id.to_string());
        realm
    }

    /// Like `ensure_account` but always creates a fresh realm, even if the
    /// id is unchanged — used when the caller wants a guaranteed fresh
    /// session.
    pub fn switch_account(&self, id: &str) -> Arc<Realm> {
        let mut slots = self.slots.lock();
        if let Some(project) = slots.project.take() {
            project.teardown();
        }
        slots.project_id = None;
        if let Some(account) = slots.account.take() {
            account.teardown();
        }
        let realm = Realm::new(format!("account:{id}"), &slots.global.scope());
        slots.account = Some(Arc::clone(&realm));
        slots.account_id = Some(id.to_string());
        realm
    }

    /// Project realm parented on the account realm (or global, if no
    /// account is selected).
    pub fn ensure_project(&self, id: &str) -> Arc<Realm> {
        let mut slots = self.slots.lock();
        if let (Some(realm), Some(current)) = (&slots.project, &slots.project_id) {
            if current == id {
                return Arc::clone(realm);
            }
        }
        if let Some(project) = slots.project.take() {
            project.teardown();
        }
        let parent_scope = slots
            .account
            .as_ref()
            .map(|a| a.scope())
            .unwrap_or_else(|| slots.global.scope());
        let realm = Realm::new(format!("project:{id}"), &parent_scope);
        slots.project = Some(Arc::clone(&realm));
        slots.project_id = Some(id.to_string());
        realm
    }

    pub fn leave_project(&self) {
        let mut slots = self.slots.lock();
        if let Some(project) = slots.project.take() {
            project.teardown();
        }
        slots.project_id = None;
    }

    pub fn shutdown(&self) {
        let mut slots = self.slots.lock();
        if let Some(project) = slots.project.take() {
            project.teardown();
        }
        slots.project_id = None;
        if let Some(account) = slots.account.take() {
            account.teardown();
        }
        slots.account_id = None;
        slots.global.teardown();
    }

    pub(crate) fn emit(&self, notification: Notification) {
        (self.notify_sink())(notification);
    }

    /// The current account's client, or a `usage` error if none is selected.
    fn account_client(&self) -> Result<Arc<dyn AccountClient>, Error> {
        let account_id = self
            .account_id()
            .ok_or_else(|| Error::usage("no account selected"))?;
        self.multistore
            .client_for(&account_id)
            .ok_or_else(|| Error::not_found(format!("no client for account {account_id}")))
    }

    /// The projects pool fans a list of each account's projects out across
    /// every discovered tenant, concurrently, and flattens the successes —
    /// it has no single account to scope to, unlike `People`/`Todos`/`Cards`.
    pub fn projects(self: &Arc<Self>) -> Arc<Pool<Vec<Project>>> {
        let this = Arc::clone(self);
        realm_pool(&self.global(), "projects", || {
            let notify = this.notify_sink();
            let this2 = Arc::clone(&this);
            let fetch_fn: crate::pool::FetchFn<Vec<Project>> = Arc::new(move |scope| {
                let this = Arc::clone(&this2);
                Box::pin(async move {
                    let results = this
                        .fan_out()
                        .run(scope, |_account, client, scope| async move {
                            client.list_projects(scope).await
                        })
                        .await?;
                    Ok(flatten_fan_out(results, "projects"))
                })
            });
            let pool = Pool::new("projects", PoolConfig::default(), fetch_fn, notify);
            pool.attach_metrics(Arc::clone(&this.metrics));
            pool
        })
    }

    pub fn activity(self: &Arc<Self>) -> Arc<Pool<Vec<ActivityEvent>>> {
        let this = Arc::clone(self);
        realm_pool(&self.global(), "activity", || {
            let notify = this.notify_sink();
            let this2 = Arc::clone(&this);
            let fetch_fn: crate::pool::FetchFn<Vec<ActivityEvent>> = Arc::new(move |scope| {
                let this = Arc::clone(&this2);
                Box::pin(async move {
                    let results = this
                        .fan_out()
                        .run(scope, |_account, client, scope| async move {
                            client.list_activity(scope).await
                        })
                        .await?;
                    Ok(flatten_fan_out(results, "activity"))
                })
            });
            let pool = Pool::new("activity", PoolConfig::default(), fetch_fn, notify);
            pool.attach_metrics(Arc::clone(&this.metrics));
            pool
        })
    }

    pub fn assignments(self: &Arc<Self>) -> Arc<Pool<Vec<Assignment>>> {
        let this = Arc::clone(self);
        realm_pool(&self.global(), "assignments", || {
            let notify = this.notify_sink();
            let this2 = Arc::clone(&this);
            let fetch_fn: crate::pool::FetchFn<Vec<Assignment>> = Arc::new(move |scope| {
                let this = Arc::clone(&this2);
                Box::pin(async move {
                    let results = this
                        .fan_out()
                        .run(scope, |_account, client, scope| async move {
                            client.list_assignments(scope).await
                        })
                        .await?;
                    Ok(flatten_fan_out(results, "assignments"))
                })
            });
            let pool = Pool::new("assignments", PoolConfig::default(), fetch_fn, notify);
            pool.attach_metrics(Arc::clone(&this.metrics));
            pool
        })
    }

    pub fn people(self: &Arc<Self>, account_id: &str) -> Result<Arc<Pool<Vec<Person>>>, Error> {
        let realm = self.ensure_account(account_id);
        let client = self
            .multistore
            .client_for(account_id)
            .ok_or_else(|| Error::not_found(format!("no client for account {account_id}")))?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        Ok(realm_pool(&realm, "people", || {
            let pool = Pool::new("people", PoolConfig::default(), fetch::people(client), notify);
            pool.attach_metrics(metrics);
            pool
        }))
    }

    fn project_realm_and_client(
        &self,
        project_id: &str,
    ) -> Result<(Arc<Realm>, Arc<dyn AccountClient>), Error> {
        let client = self.account_client()?;
        let realm = self.ensure_project(project_id);
        Ok((realm, client))
    }

    pub fn schedule_entries(
        self: &Arc<Self>,
        project_id: u64,
        schedule_id: u64,
    ) -> Result<Arc<Pool<Vec<ScheduleEntry>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), Pool<Vec<ScheduleEntry>>>> =
            realm_pool(&realm, "schedule-entries", || {
                Arc::new(KeyedPool::new("schedule-entries", move |&(p, s)| {
                    let pool = Pool::new(
                        format!("schedule-entries:{p}:{s}"),
                        PoolConfig::default(),
                        fetch::schedule_entries(Arc::clone(&client), p, s),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, schedule_id)))
    }

    pub fn checkins(
        self: &Arc<Self>,
        project_id: u64,
        questionnaire_id: u64,
    ) -> Result<Arc<Pool<Vec<Checkin>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), Pool<Vec<Checkin>>>> =
            realm_pool(&realm, "checkins", || {
                Arc::new(KeyedPool::new("checkins", move |&(p, q)| {
                    let pool = Pool::new(
                        format!("checkins:{p}:{q}"),
                        PoolConfig::default(),
                        fetch::checkins(Arc::clone(&client), p, q),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, questionnaire_id)))
    }

    pub fn docs_files(
        self: &Arc<Self>,
        project_id: u64,
        vault_id: u64,
    ) -> Result<Arc<Pool<Vec<DocsFile>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), Pool<Vec<DocsFile>>>> =
            realm_pool(&realm, "docsfiles", || {
                Arc::new(KeyedPool::new("docsfiles", move |&(p, v)| {
                    let pool = Pool::new(
                        format!("docsfiles:{p}:{v}"),
                        PoolConfig::default(),
                        fetch::docs_files(Arc::clone(&client), p, v),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, vault_id)))
    }

    pub fn forwards(
        self: &Arc<Self>,
        project_id: u64,
        inbox_id: u64,
    ) -> Result<Arc<Pool<Vec<Forward>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), Pool<Vec<Forward>>>> =
            realm_pool(&realm, "forwards", || {
                Arc::new(KeyedPool::new("forwards", move |&(p, i)| {
                    let pool = Pool::new(
                        format!("forwards:{p}:{i}"),
                        PoolConfig::default(),
                        fetch::forwards(Arc::clone(&client), p, i),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, inbox_id)))
    }

    pub fn todos(
        self: &Arc<Self>,
        project_id: u64,
        todolist_id: u64,
    ) -> Result<Arc<MutatingPool<Vec<Todo>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), MutatingPool<Vec<Todo>>>> =
            realm_pool(&realm, "todos", || {
                Arc::new(KeyedPool::new("todos", move |&(p, l)| {
                    let pool = MutatingPool::new(
                        format!("todos:{p}:{l}"),
                        PoolConfig::default(),
                        fetch::todos(Arc::clone(&client), p, l),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, todolist_id)))
    }

    pub fn cards(
        self: &Arc<Self>,
        project_id: u64,
        board_id: u64,
    ) -> Result<Arc<MutatingPool<Vec<Column>>>, Error> {
        let (realm, client) = self.project_realm_and_client(&project_id.to_string())?;
        let notify = self.notify_sink();
        let metrics = Arc::clone(&self.metrics);
        let family: Arc<KeyedPool<(u64, u64), MutatingPool<Vec<Column>>>> =
            realm_pool(&realm, "cards", || {
                Arc::new(KeyedPool::new("cards", move |&(p, b)| {
                    let pool = MutatingPool::new(
                        format!("cards:{p}:{b}"),
                        PoolConfig::default(),
                        fetch::cards(Arc::clone(&client), p, b),
                        notify.clone(),
                    );
                    pool.attach_metrics(Arc::clone(&metrics));
                    pool
                }))
            });
        Ok(family.get(&(project_id, board_id)))
    }
}

/// Fan-out across accounts never fails the overall call for a per-account
/// error; failures are logged and dropped from the flattened, aggregated
/// global view.
fn flatten_fan_out<T>(results: Vec<crate::fanout::AccountResult<Vec<T>>>, pool_key: &str) -> Vec<T> {
    let mut out = Vec::new();
    for result in results {
        match result.outcome {
            Ok(items) => out.extend(items),
            Err(err) => {
                tracing::warn!(pool = pool_key, account = %result.account.id, error = %err, "fan-out slot failed");
            }
        }
    }
    out
}
