//! The remote API contract the data layer requires: a root client that
//! discovers tenant accounts and hands out per-account clients, and an
//! account client exposing the endpoint categories screens need.
//!
//! A small async-capable trait at the seam, plus a concrete production
//! implementation and an in-crate test double living next to it rather than
//! behind a separate mock crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Built once per process; every `reqwest::Client` this module constructs
/// sends it as its `User-Agent`.
static USER_AGENT: Lazy<String> = Lazy::new(|| format!("hubdata/{}", env!("CARGO_PKG_VERSION")));

use crate::domain::{
    ActivityEvent, Assignment, Card, Checkin, Column, DocsFile, Forward, Person, Project,
    ScheduleEntry, Todo,
};
use crate::error::Error;
use crate::multistore::AccountInfo;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub id: u64,
    pub name: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationInfo {
    pub accounts: Vec<AccountInfo>,
    pub identity: Identity,
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// The root client: authenticated but not yet scoped to a tenant account.
pub trait RootClient: Send + Sync {
    fn authorization_get_info(&self, scope: CancellationToken) -> BoxFut<'_, AuthorizationInfo>;

    /// Returns `None` if the root client has no way to scope to `id` (used
    /// by tests and for accounts that vanish between discovery and use).
    fn for_account(&self, id: &str) -> Option<Arc<dyn AccountClient>>;
}

/// A client scoped to one tenant account; one endpoint-category method per
/// Hub accessor. The real API exposes more categories (Campfires, Messages,
/// Recordings, Comments, Documents, Uploads, Vaults, Schedules-as-a-tool,
/// Authorization) than a reactive data layer's fetch adapters need; only the
/// operations the ten accessors call are modeled here.
pub trait AccountClient: Send + Sync {
    fn list_projects(&self, scope: CancellationToken) -> BoxFut<'_, Vec<Project>>;
    fn list_activity(&self, scope: CancellationToken) -> BoxFut<'_, Vec<ActivityEvent>>;
    fn list_assignments(&self, scope: CancellationToken) -> BoxFut<'_, Vec<Assignment>>;
    fn list_people(&self, scope: CancellationToken) -> BoxFut<'_, Vec<Person>>;

    fn list_schedule_entries(
        &self,
        scope: CancellationToken,
        project_id: u64,
        schedule_id: u64,
    ) -> BoxFut<'_, Vec<ScheduleEntry>>;

    fn list_checkins(
        &self,
        scope: CancellationToken,
        project_id: u64,
        questionnaire_id: u64,
    ) -> BoxFut<'_, Vec<Checkin>>;

    fn list_docs_files(
        &self,
        scope: CancellationToken,
        project_id: u64,
        vault_id: u64,
    ) -> BoxFut<'_, Vec<DocsFile>>;

    fn list_forwards(
        &self,
        scope: CancellationToken,
        project_id: u64,
        inbox_id: u64,
    ) -> BoxFut<'_, Vec<Forward>>;

    fn list_todos(
        &self,
        scope: CancellationToken,
        project_id: u64,
        todolist_id: u64,
    ) -> BoxFut<'_, Vec<Todo>>;

    fn complete_todo(
        &self,
        scope: CancellationToken,
        project_id: u64,
        todo_id: u64,
    ) -> BoxFut<'_, ()>;

    fn uncomplete_todo(
        &self,
        scope: CancellationToken,
        project_id: u64,
        todo_id: u64,
    ) -> BoxFut<'_, ()>;

    fn create_todo(
        &self,
        scope: CancellationToken,
        project_id: u64,
        todolist_id: u64,
        title: String,
    ) -> BoxFut<'_, Todo>;

    fn list_cards(
        &self,
        scope: CancellationToken,
        project_id: u64,
        board_id: u64,
    ) -> BoxFut<'_, Vec<Column>>;

    fn move_card(
        &self,
        scope: CancellationToken,
        project_id: u64,
        card_id: u64,
        to_column_id: u64,
    ) -> BoxFut<'_, ()>;

    fn create_card(
        &self,
        scope: CancellationToken,
        project_id: u64,
        column_id: u64,
        title: String,
    ) -> BoxFut<'_, Card>;
}

/// Production client: one `reqwest::Client` shared across every account,
/// scoped per-account by a bearer token and a base URL.
pub struct HttpRootClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpRootClient {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT.as_str())
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }
}

impl RootClient for HttpRootClient {
    fn authorization_get_info(&self, _scope: CancellationToken) -> BoxFut<'_, AuthorizationInfo> {
        Box::pin(async move {
            let url = format!("{}/authorization.json", self.base_url);
            let resp = self
                .http
                .get(url)
                .bearer_auth(&self.bearer_token)
                .send()
                .await
                .map_err(map_reqwest_err)?;
            let body: WireAuthorizationInfo = resp.json().await.map_err(map_reqwest_err)?;
            Ok(body.into())
        })
    }

    fn for_account(&self, id: &str) -> Option<Arc<dyn AccountClient>> {
        Some(Arc::new(HttpAccountClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            bearer_token: self.bearer_token.clone(),
            account_id: id.to_string(),
        }))
    }
}

#[derive(serde::Deserialize)]
struct WireAccount {
    id: u64,
    name: String,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(serde::Deserialize)]
struct WireIdentity {
    id: u64,
    name: String,
    email_address: String,
}

#[derive(serde::Deserialize)]
struct WireAuthorizationInfo {
    accounts: Vec<WireAccount>,
    identity: WireIdentity,
}

impl From<WireAuthorizationInfo> for AuthorizationInfo {
    fn from(wire: WireAuthorizationInfo) -> Self {
        AuthorizationInfo {
            accounts: wire
                .accounts
                .into_iter()
                .filter(|a| a.expires_at.is_none())
                .map(|a| AccountInfo {
                    id: a.id.to_string(),
                    name: a.name,
                })
                .collect(),
            identity: Identity {
                id: wire.identity.id,
                name: wire.identity.name,
                email_address: wire.identity.email_address,
            },
        }
    }
}

pub struct HttpAccountClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
    account_id: String,
}

impl HttpAccountClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.account_id, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let resp = check_status(resp).await?;
        resp.json().await.map_err(map_reqwest_err)
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let resp = check_status(resp).await?;
        resp.json().await.map_err(map_reqwest_err)
    }

    async fn put_empty(&self, path: &str) -> Result<(), Error> {
        let resp = self
            .http
            .put(self.url(path))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 => Error::auth_required(format!("401 unauthorized: {body}")),
        403 => Error::forbidden(body),
        404 => Error::not_found(body),
        429 => Error::rate_limit(body),
        code if code >= 500 => Error::api_error(format!("{code}: {body}")),
        code => Error::api_error(format!("{code}: {body}")),
    })
}

fn map_reqwest_err(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::network("request timed out")
    } else if err.is_connect() {
        Error::network("could not connect")
    } else {
        Error::network(err.to_string())
    }
}

macro_rules! http_list {
    ($name:ident, $path:expr, $ty:ty) => {
        fn $name(&self, _scope: CancellationToken) -> BoxFut<'_, Vec<$ty>> {
            Box::pin(async move { self.get_json($path).await })
        }
    };
}

impl AccountClient for HttpAccountClient {
    http_list!(list_projects, "/projects.json", Project);
    http_list!(list_activity, "/events.json", ActivityEvent);
    http_list!(list_assignments, "/my/assignments.json", Assignment);
    http_list!(list_people, "/people.json", Person);

    fn list_schedule_entries(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        schedule_id: u64,
    ) -> BoxFut<'_, Vec<ScheduleEntry>> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/schedules/{schedule_id}/entries.json");
            self.get_json(&path).await
        })
    }

    fn list_checkins(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        questionnaire_id: u64,
    ) -> BoxFut<'_, Vec<Checkin>> {
        Box::pin(async move {
            let path =
                format!("/buckets/{project_id}/questionnaires/{questionnaire_id}/checkins.json");
            self.get_json(&path).await
        })
    }

    fn list_docs_files(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        vault_id: u64,
    ) -> BoxFut<'_, Vec<DocsFile>> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/vaults/{vault_id}/documents.json");
            self.get_json(&path).await
        })
    }

    fn list_forwards(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        inbox_id: u64,
    ) -> BoxFut<'_, Vec<Forward>> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/inboxes/{inbox_id}/forwards.json");
            self.get_json(&path).await
        })
    }

    fn list_todos(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        todolist_id: u64,
    ) -> BoxFut<'_, Vec<Todo>> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/todolists/{todolist_id}/todos.json");
            self.get_json(&path).await
        })
    }

    fn complete_todo(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        todo_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/todos/{todo_id}/completion.json");
            self.put_empty(&path).await
        })
    }

    fn uncomplete_todo(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        todo_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/todos/{todo_id}/completion.json");
            let resp = self
                .http
                .delete(self.url(&path))
                .bearer_auth(&self.bearer_token)
                .send()
                .await
                .map_err(map_reqwest_err)?;
            check_status(resp).await?;
            Ok(())
        })
    }

    fn create_todo(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        todolist_id: u64,
        title: String,
    ) -> BoxFut<'_, Todo> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/todolists/{todolist_id}/todos.json");
            #[derive(serde::Serialize)]
            struct Body {
                content: String,
            }
            self.post_json(&path, &Body { content: title }).await
        })
    }

    fn list_cards(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        board_id: u64,
    ) -> BoxFut<'_, Vec<Column>> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/card_tables/{board_id}/columns.json");
            self.get_json(&path).await
        })
    }

    fn move_card(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        card_id: u64,
        to_column_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/card_tables/cards/{card_id}/moves.json");
            #[derive(serde::Serialize)]
            struct Body {
                column_id: u64,
            }
            self.post_json::<_, serde_json::Value>(&path, &Body { column_id: to_column_id })
                .await?;
            Ok(())
        })
    }

    fn create_card(
        &self,
        _scope: CancellationToken,
        project_id: u64,
        column_id: u64,
        title: String,
    ) -> BoxFut<'_, Card> {
        Box::pin(async move {
            let path = format!("/buckets/{project_id}/card_tables/columns/{column_id}/cards.json");
            #[derive(serde::Serialize)]
            struct Body {
                title: String,
            }
            self.post_json(&path, &Body { title }).await
        })
    }
}

/// In-memory test double. Lives next to the trait it implements rather than
/// behind a separate mock crate.
#[derive(Default)]
pub struct FakeRootClient {
    accounts: RwLock<Vec<AccountInfo>>,
    identity: RwLock<Identity>,
}

impl FakeRootClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_accounts(&self, accounts: Vec<AccountInfo>) {
        *self.accounts.write() = accounts;
    }
}

impl RootClient for FakeRootClient {
    fn authorization_get_info(&self, _scope: CancellationToken) -> BoxFut<'_, AuthorizationInfo> {
        let accounts = self.accounts.read().clone();
        let identity = self.identity.read().clone();
        Box::pin(async move { Ok(AuthorizationInfo { accounts, identity }) })
    }

    fn for_account(&self, id: &str) -> Option<Arc<dyn AccountClient>> {
        if self.accounts.read().iter().any(|a| a.id == id) {
            Some(Arc::new(FakeAccountClient::default()))
        } else {
            None
        }
    }
}

/// A fake account client returning empty collections for everything; tests
/// that need specific data construct their own `FetchFn` closures directly
/// rather than routing through this, which only exists so `MultiStore`'s
/// memoization and `FanOut`'s plumbing have something to hand out.
#[derive(Default)]
pub struct FakeAccountClient;

macro_rules! fake_list {
    ($name:ident, $ty:ty) => {
        fn $name(&self, _scope: CancellationToken) -> BoxFut<'_, Vec<$ty>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    };
}

impl AccountClient for FakeAccountClient {
    fake_list!(list_projects, Project);
    fake_list!(list_activity, ActivityEvent);
    fake_list!(list_assignments, Assignment);
    fake_list!(list_people, Person);

    fn list_schedule_entries(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _schedule_id: u64,
    ) -> BoxFut<'_, Vec<ScheduleEntry>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn list_checkins(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _questionnaire_id: u64,
    ) -> BoxFut<'_, Vec<Checkin>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn list_docs_files(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _vault_id: u64,
    ) -> BoxFut<'_, Vec<DocsFile>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn list_forwards(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _inbox_id: u64,
    ) -> BoxFut<'_, Vec<Forward>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn list_todos(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _todolist_id: u64,
    ) -> BoxFut<'_, Vec<Todo>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn complete_todo(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _todo_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn uncomplete_todo(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _todo_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn create_todo(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _todolist_id: u64,
        title: String,
    ) -> BoxFut<'_, Todo> {
        Box::pin(async move {
            Ok(Todo {
                id: 0,
                title,
                completed: false,
            })
        })
    }

    fn list_cards(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _board_id: u64,
    ) -> BoxFut<'_, Vec<Column>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn move_card(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _card_id: u64,
        _to_column_id: u64,
    ) -> BoxFut<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn create_card(
        &self,
        _scope: CancellationToken,
        _project_id: u64,
        _column_id: u64,
        title: String,
    ) -> BoxFut<'_, Card> {
        Box::pin(async move { Ok(Card { id: 0, title }) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_root_client_scopes_known_accounts_only() {
        let client = FakeRootClient::new();
        client.seed_accounts(vec![AccountInfo {
            id: "1".into(),
            name: "Acme".into(),
        }]);
        assert!(client.for_account("1").is_some());
        assert!(client.for_account("2").is_none());
    }
}
