//! Credential persistence: opaque OAuth-ish records addressed by origin URL,
//! behind a pluggable backend trait with a JSON file-backed default
//! implementation.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Backend is pluggable; a keychain-backed implementation is an external
/// collaborator out of this core's scope, so only the trait and a JSON file
/// default live here.
pub trait CredentialStore: Send + Sync {
    fn get(&self, origin: &str) -> Result<Option<Credential>, Error>;
    fn set(&self, origin: &str, credential: Credential) -> Result<(), Error>;
    fn delete(&self, origin: &str) -> Result<(), Error>;
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> HashMap<String, Credential> {
        let Ok(bytes) = std::fs::read(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    fn save(&self, table: &HashMap<String, Credential>) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(table)
            .map_err(|e| Error::api_error(format!("encoding credentials: {e}")))?;
        atomic_write(&self.path, &json)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, origin: &str) -> Result<Option<Credential>, Error> {
        Ok(self.load().get(origin).cloned())
    }

    fn set(&self, origin: &str, credential: Credential) -> Result<(), Error> {
        let mut table = self.load();
        table.insert(origin.to_string(), credential);
        self.save(&table)
    }

    fn delete(&self, origin: &str) -> Result<(), Error> {
        let mut table = self.load();
        table.remove(origin);
        self.save(&table)
    }
}

/// Write to a temp file in the same directory, then rename over the target,
/// so a crash mid-write never leaves a truncated credentials file. Sets
/// 0600 permissions before the data touches disk on unix.
pub(crate) fn atomic_write(path: &PathBuf, bytes: &[u8]) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::api_error(format!("creating {}: {e}", dir.display())))?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store")
    ));
    {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| Error::api_error(format!("writing {}: {e}", tmp.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::api_error(format!("chmod {}: {e}", tmp.display())))?;
        }
        file.write_all(bytes)
            .map_err(|e| Error::api_error(format!("writing {}: {e}", tmp.display())))?;
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::api_error(format!("renaming into {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_store() {
        let dir = std::env::temp_dir().join(format!("hubdata-cred-test-{}", std::process::id()));
        let store = FileCredentialStore::new(dir.join("credentials.json"));
        assert!(store.get("https://example.com").unwrap().is_none());
    }

    #[test]
    fn round_trips_and_deletes() {
        let dir = std::env::temp_dir().join(format!(
            "hubdata-cred-test-{}-{}",
            std::process::id(),
            line!()
        ));
        let store = FileCredentialStore::new(dir.join("credentials.json"));
        let cred = Credential {
            access_token: "tok".into(),
            refresh_token: Some("ref".into()),
            ..Default::default()
        };
        store.set("https://example.com", cred.clone()).unwrap();
        assert_eq!(store.get("https://example.com").unwrap(), Some(cred));

        store.delete("https://example.com").unwrap();
        assert!(store.get("https://example.com").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_file_yields_empty_store() {
        let dir = std::env::temp_dir().join(format!(
            "hubdata-cred-test-corrupt-{}-{}",
            std::process::id(),
            line!()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("credentials.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = FileCredentialStore::new(path);
        assert!(store.get("https://example.com").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
