//! Concrete [`Mutation`] implementations, one per user-initiated action a
//! screen can take against a todo list or a kanban board. Each pairs a pure
//! `apply_locally` with a side-effectful `apply_remotely` and a pure
//! `is_reflected_in` predicate.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::AccountClient;
use crate::domain::{Card, Column, Todo};
use crate::error::Error;
use crate::fetch::find_card;
use crate::pool::mutating::Mutation;

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

pub struct TodoCompleteMutation {
    pub client: Arc<dyn AccountClient>,
    pub project_id: u64,
    pub todo_id: u64,
}

impl Mutation<Vec<Todo>> for TodoCompleteMutation {
    fn apply_locally(&self, mut current: Vec<Todo>) -> Vec<Todo> {
        for todo in current.iter_mut() {
            if todo.id == self.todo_id {
                todo.completed = true;
            }
        }
        current
    }

    fn apply_remotely<'a>(&'a self, scope: CancellationToken) -> BoxFut<'a, ()> {
        Box::pin(async move {
            self.client
                .complete_todo(scope, self.project_id, self.todo_id)
                .await
        })
    }

    fn is_reflected_in(&self, remote: &Vec<Todo>) -> bool {
        remote
            .iter()
            .any(|t| t.id == self.todo_id && t.completed)
    }
}

pub struct TodoUncompleteMutation {
    pub client: Arc<dyn AccountClient>,
    pub project_id: u64,
    pub todo_id: u64,
}

impl Mutation<Vec<Todo>> for TodoUncompleteMutation {
    fn apply_locally(&self, mut current: Vec<Todo>) -> Vec<Todo> {
        for todo in current.iter_mut() {
            if todo.id == self.todo_id {
                todo.completed = false;
            }
        }
        current
    }

    fn apply_remotely<'a>(&'a self, scope: CancellationToken) -> BoxFut<'a, ()> {
        Box::pin(async move {
            self.client
                .uncomplete_todo(scope, self.project_id, self.todo_id)
                .await
        })
    }

    fn is_reflected_in(&self, remote: &Vec<Todo>) -> bool {
        remote
            .iter()
            .any(|t| t.id == self.todo_id && !t.completed)
    }
}

/// A server-assigned id is only known once `apply_remotely` completes; until
/// then `assigned_id` stays 0 and `is_reflected_in` returns false. `local_id`
/// is the placeholder the optimistic row carries in the meantime; callers
/// pick it (e.g. a monotonic UI-local counter) so it can't collide with a
/// real server id while the mutation is still pending.
pub struct TodoCreateMutation {
    pub client: Arc<dyn AccountClient>,
    pub project_id: u64,
    pub todolist_id: u64,
    pub title: String,
    pub local_id: u64,
    assigned_id: AtomicU64,
}

impl TodoCreateMutation {
    pub fn new(
        client: Arc<dyn AccountClient>,
        project_id: u64,
        todolist_id: u64,
        title: String,
        local_id: u64,
    ) -> Self {
        Self {
            client,
            project_id,
            todolist_id,
            title,
            local_id,
            assigned_id: AtomicU64::new(0),
        }
    }

    fn effective_id(&self) -> u64 {
        let assigned = self.assigned_id.load(Ordering::SeqCst);
        if assigned != 0 {
            assigned
        } else {
            self.local_id
        }
    }
}

impl Mutation<Vec<Todo>> for TodoCreateMutation {
    fn apply_locally(&self, mut current: Vec<Todo>) -> Vec<Todo> {
        let id = self.effective_id();
        if !current.iter().any(|t| t.id == id) {
            current.push(Todo {
                id,
                title: self.title.clone(),
                completed: false,
            });
        }
        current
    }

    fn apply_remotely<'a>(&'a self, scope: CancellationToken) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let created = self
                .client
                .create_todo(scope, self.project_id, self.todolist_id, self.title.clone())
                .await?;
            self.assigned_id.store(created.id, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_reflected_in(&self, remote: &Vec<Todo>) -> bool {
        let assigned = self.assigned_id.load(Ordering::SeqCst);
        assigned != 0 && remote.iter().any(|t| t.id == assigned)
    }
}

pub struct CardMoveMutation {
    pub client: Arc<dyn AccountClient>,
    pub project_id: u64,
    pub card_id: u64,
    pub to_column_id: u64,
}

impl Mutation<Vec<Column>> for CardMoveMutation {
    fn apply_locally(&self, mut current: Vec<Column>) -> Vec<Column> {
        let Some((from_ci, from_ri)) = find_card(&current, self.card_id) else {
            return current;
        };
        if current[from_ci].id == self.to_column_id {
            return current;
        }
        let card = current[from_ci].cards.remove(from_ri);
        if let Some(target) = current.iter_mut().find(|c| c.id == self.to_column_id) {
            target.cards.push(card);
        } else {
            // Target column vanished remotely; put the card back rather
            // than drop it on the floor.
            current[from_ci].cards.insert(from_ri, card);
        }
        current
    }

    fn apply_remotely<'a>(&'a self, scope: CancellationToken) -> BoxFut<'a, ()> {
        Box::pin(async move {
            self.client
                .move_card(scope, self.project_id, self.card_id, self.to_column_id)
                .await
        })
    }

    fn is_reflected_in(&self, remote: &Vec<Column>) -> bool {
        remote
            .iter()
            .find(|c| c.id == self.to_column_id)
            .is_some_and(|c| c.cards.iter().any(|card| card.id == self.card_id))
    }
}

pub struct CardCreateMutation {
    pub client: Arc<dyn AccountClient>,
    pub project_id: u64,
    pub column_id: u64,
    pub title: String,
    pub local_id: u64,
    assigned_id: AtomicU64,
}

impl CardCreateMutation {
    pub fn new(
        client: Arc<dyn AccountClient>,
        project_id: u64,
        column_id: u64,
        title: String,
        local_id: u64,
    ) -> Self {
        Self {
            client,
            project_id,
            column_id,
            title,
            local_id,
            assigned_id: AtomicU64::new(0),
        }
    }

    fn effective_id(&self) -> u64 {
        let assigned = self.assigned_id.load(Ordering::SeqCst);
        if assigned != 0 {
            assigned
        } else {
            self.local_id
        }
    }
}

impl Mutation<Vec<Column>> for CardCreateMutation {
    fn apply_locally(&self, mut current: Vec<Column>) -> Vec<Column> {
        let id = self.effective_id();
        if let Some(column) = current.iter_mut().find(|c| c.id == self.column_id) {
            if !column.cards.iter().any(|c| c.id == id) {
                column.cards.push(Card {
                    id,
                    title: self.title.clone(),
                });
            }
        }
        current
    }

    fn apply_remotely<'a>(&'a self, scope: CancellationToken) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let created = self
                .client
                .create_card(scope, self.project_id, self.column_id, self.title.clone())
                .await?;
            self.assigned_id.store(created.id, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_reflected_in(&self, remote: &Vec<Column>) -> bool {
        let assigned = self.assigned_id.load(Ordering::SeqCst);
        assigned != 0
            && remote
                .iter()
                .any(|c| c.cards.iter().any(|card| card.id == assigned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FakeAccountClient;

    fn todos() -> Vec<Todo> {
        vec![
            Todo { id: 1, title: "a".into(), completed: false },
            Todo { id: 2, title: "b".into(), completed: false },
        ]
    }

    #[test]
    fn complete_mutation_sets_flag_and_detects_reflection() {
        let mutation = TodoCompleteMutation {
            client: Arc::new(FakeAccountClient),
            project_id: 1,
            todo_id: 1,
        };
        let applied = mutation.apply_locally(todos());
        assert!(applied[0].completed);
        assert!(!mutation.is_reflected_in(&todos()));
        assert!(mutation.is_reflected_in(&applied));
    }

    #[tokio::test]
    async fn create_mutation_is_not_reflected_until_remote_assigns_id() {
        let mutation = TodoCreateMutation::new(
            Arc::new(FakeAccountClient),
            1,
            1,
            "new".into(),
            999,
        );
        let applied = mutation.apply_locally(todos());
        assert_eq!(applied.last().unwrap().id, 999);
        assert!(!mutation.is_reflected_in(&applied));

        mutation.apply_remotely(CancellationToken::new()).await.unwrap();
        // FakeAccountClient::create_todo returns id 0, so it still reads as unassigned.
        assert!(!mutation.is_reflected_in(&applied));
    }

    #[test]
    fn card_move_relocates_card_between_columns() {
        let columns = vec![
            Column { id: 10, title: "Todo".into(), cards: vec![Card { id: 1, title: "x".into() }] },
            Column { id: 20, title: "Done".into(), cards: vec![] },
        ];
        let mutation = CardMoveMutation {
            client: Arc::new(FakeAccountClient),
            project_id: 1,
            card_id: 1,
            to_column_id: 20,
        };
        let moved = mutation.apply_locally(columns);
        assert!(moved[0].cards.is_empty());
        assert_eq!(moved[1].cards[0].id, 1);
        assert!(mutation.is_reflected_in(&moved));
    }
}
