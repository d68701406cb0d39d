//! Fetch adapters: one factory per Hub accessor. Each takes
//! the per-account client the accessor already resolved from the
//! [`crate::multistore::MultiStore`] and returns a [`crate::pool::FetchFn`]
//! that closes over it — the sole place a wire response is mapped into the
//! pool's value shape.

use std::sync::Arc;

use crate::client::AccountClient;
use crate::domain::{
    ActivityEvent, Assignment, Card, Checkin, Column, DocsFile, Forward, Person, Project,
    ScheduleEntry, Todo,
};
use crate::pool::FetchFn;

pub fn projects(client: Arc<dyn AccountClient>) -> FetchFn<Vec<Project>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_projects(scope).await })
    })
}

pub fn activity(client: Arc<dyn AccountClient>) -> FetchFn<Vec<ActivityEvent>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_activity(scope).await })
    })
}

pub fn assignments(client: Arc<dyn AccountClient>) -> FetchFn<Vec<Assignment>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_assignments(scope).await })
    })
}

pub fn people(client: Arc<dyn AccountClient>) -> FetchFn<Vec<Person>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_people(scope).await })
    })
}

pub fn schedule_entries(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    schedule_id: u64,
) -> FetchFn<Vec<ScheduleEntry>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move {
            client
                .list_schedule_entries(scope, project_id, schedule_id)
                .await
        })
    })
}

pub fn checkins(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    questionnaire_id: u64,
) -> FetchFn<Vec<Checkin>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_checkins(scope, project_id, questionnaire_id).await })
    })
}

pub fn docs_files(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    vault_id: u64,
) -> FetchFn<Vec<DocsFile>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_docs_files(scope, project_id, vault_id).await })
    })
}

pub fn forwards(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    inbox_id: u64,
) -> FetchFn<Vec<Forward>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_forwards(scope, project_id, inbox_id).await })
    })
}

pub fn todos(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    todolist_id: u64,
) -> FetchFn<Vec<Todo>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_todos(scope, project_id, todolist_id).await })
    })
}

pub fn cards(
    client: Arc<dyn AccountClient>,
    project_id: u64,
    board_id: u64,
) -> FetchFn<Vec<Column>> {
    Arc::new(move |scope| {
        let client = Arc::clone(&client);
        Box::pin(async move { client.list_cards(scope, project_id, board_id).await })
    })
}

/// A single card's id, looked up across every column of a board — shared by
/// `CardMoveMutation::apply_locally` and `CardMoveMutation::is_reflected_in`.
pub fn find_card(columns: &[Column], card_id: u64) -> Option<(usize, usize)> {
    for (ci, column) in columns.iter().enumerate() {
        if let Some(ri) = column.cards.iter().position(|c| c.id == card_id) {
            return Some((ci, ri));
        }
    }
    None
}
