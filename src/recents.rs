//! `recents.json` persistence: recently used items keyed by type, capped at
//! 10 entries per type, MRU order, deduplicated by id.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::atomic_write;
use crate::error::Error;

const MAX_PER_TYPE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub used_at: DateTime<Utc>,
}

#[derive(Default, Serialize, Deserialize)]
struct RecentsFile(HashMap<String, Vec<RecentItem>>);

pub struct RecentsStore {
    path: PathBuf,
}

impl RecentsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> RecentsFile {
        let Ok(bytes) = std::fs::read(&self.path) else {
            return RecentsFile::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    /// Most-recent-first list for `item_type`.
    pub fn list(&self, item_type: &str) -> Vec<RecentItem> {
        self.load().0.remove(item_type).unwrap_or_default()
    }

    /// Records a use of `item`: moves it to the front if already present
    /// (deduped by id), else inserts it at the front; truncates to the last
    /// 10 entries for that type.
    pub fn record(&self, item: RecentItem) -> Result<(), Error> {
        let mut file = self.load();
        let list = file.0.entry(item.item_type.clone()).or_default();
        list.retain(|existing| existing.id != item.id);
        list.insert(0, item);
        list.truncate(MAX_PER_TYPE);
        self.save(&file)
    }

    fn save(&self, file: &RecentsFile) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&file.0)
            .map_err(|e| Error::api_error(format!("encoding recents: {e}")))?;
        atomic_write(&self.path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, used_at_secs: i64) -> RecentItem {
        RecentItem {
            id: id.to_string(),
            title: format!("Item {id}"),
            description: None,
            item_type: "project".into(),
            account_id: None,
            project_id: None,
            used_at: DateTime::from_timestamp(used_at_secs, 0).unwrap(),
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "hubdata-recents-test-{tag}-{}-{}",
            std::process::id(),
            line!()
        ))
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let store = RecentsStore::new(temp_path("missing"));
        assert!(store.list("project").is_empty());
    }

    #[test]
    fn dedup_moves_existing_item_to_front() {
        let path = temp_path("dedup");
        let store = RecentsStore::new(path.clone());
        store.record(item("1", 1)).unwrap();
        store.record(item("2", 2)).unwrap();
        store.record(item("1", 3)).unwrap();

        let list = store.list("project");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "1");
        assert_eq!(list[1].id, "2");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn caps_at_ten_per_type() {
        let path = temp_path("cap");
        let store = RecentsStore::new(path.clone());
        for i in 0..15 {
            store.record(item(&i.to_string(), i)).unwrap();
        }
        let list = store.list("project");
        assert_eq!(list.len(), MAX_PER_TYPE);
        assert_eq!(list[0].id, "14");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupt_file_yields_empty_store() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();
        let store = RecentsStore::new(path.clone());
        assert!(store.list("project").is_empty());

        std::fs::remove_file(&path).ok();
    }
}
