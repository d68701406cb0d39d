//! Value shapes the fetch adapters produce and the mutations operate on.
//!
//! These mirror the handful of resources a terminal screen actually renders:
//! projects, activity, assignments, people, schedule entries, check-ins,
//! docs files, forwards, todos and kanban cards. The wire format is whatever
//! the remote API returns; `serde` only needs to deserialize it, the data
//! layer never serializes these back out.

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActivityEvent {
    pub id: u64,
    pub summary: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub title: String,
    pub due_on: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Person {
    pub id: u64,
    pub name: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScheduleEntry {
    pub id: u64,
    pub summary: String,
    pub starts_at: String,
    pub ends_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Checkin {
    pub id: u64,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocsFile {
    pub id: u64,
    pub title: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Forward {
    pub id: u64,
    pub subject: String,
    pub from: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Card {
    pub id: u64,
    pub title: String,
}

/// A kanban board is a list of columns, each holding its cards; the
/// `cards:P:B` accessor pool's value type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Column {
    pub id: u64,
    pub title: String,
    pub cards: Vec<Card>,
}
