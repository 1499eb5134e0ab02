//! File-backed credential store.
//!
//! Keeps the pair in memory and mirrors it to a small JSON file so a restarted
//! client resumes the same session. Disk failures are logged and never fail the
//! in-memory operation.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::CredentialStore;
use super::types::CredentialPair;

/// On-disk layout: two independently keyed fields.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

pub struct FileCredentialStore {
    path: PathBuf,
    pair: RwLock<Option<CredentialPair>>,
    /// Serializes disk writes so the file always reflects the latest in-memory pair.
    io_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading any pair persisted by a previous run.
    ///
    /// A missing, unreadable or partial file loads as an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let pair = load(&path);
        debug!(path = %path.display(), loaded = pair.is_some(), "Opened credential file");

        Self {
            path,
            pair: RwLock::new(pair),
            io_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, pair: &CredentialPair) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let stored = StoredCredentials {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        // Write next to the target then rename, so readers never see a torn file.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn load(path: &Path) -> Option<CredentialPair> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read credential file");
            return None;
        }
    };

    let stored: StoredCredentials = match serde_json::from_slice(&raw) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt credential file");
            return None;
        }
    };

    match (stored.access_token, stored.refresh_token) {
        (Some(access_token), Some(refresh_token)) => Some(CredentialPair {
            access_token,
            refresh_token,
        }),
        (None, None) => None,
        _ => {
            warn!(path = %path.display(), "Ignoring partial credential pair");
            None
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<CredentialPair> {
        self.pair.read().clone()
    }

    fn set(&self, pair: CredentialPair) {
        let _io = self.io_lock.lock();
        *self.pair.write() = Some(pair.clone());

        if let Err(e) = self.persist(&pair) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist credentials (non-fatal)");
        }
    }

    fn clear(&self) {
        let _io = self.io_lock.lock();
        self.pair.write().take();

        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove credential file (non-fatal)");
        }
    }

    fn clear_matching(&self, refresh_token: &str) -> bool {
        let _io = self.io_lock.lock();
        {
            let mut pair = self.pair.write();
            if !pair
                .as_ref()
                .is_some_and(|current| current.refresh_token == refresh_token)
            {
                return false;
            }
            *pair = None;
        }

        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove credential file (non-fatal)");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");

        let store = FileCredentialStore::open(&path);
        assert!(store.get().is_none());
        store.set(CredentialPair::new("T1", "R1"));
        drop(store);

        let reopened = FileCredentialStore::open(&path);
        assert_eq!(reopened.get(), Some(CredentialPair::new("T1", "R1")));
    }

    #[test]
    fn test_file_uses_independent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        FileCredentialStore::open(&path).set(CredentialPair::new("T1", "R1"));

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["access_token"], "T1");
        assert_eq!(value["refresh_token"], "R1");
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path);
        store.set(CredentialPair::new("T1", "R1"));
        assert!(path.exists());

        store.clear();
        assert!(!path.exists());
        assert!(store.get().is_none());

        // Idempotent
        store.clear();
        assert!(FileCredentialStore::open(&path).get().is_none());
    }

    #[test]
    fn test_clear_matching_only_removes_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::open(&path);
        store.set(CredentialPair::new("T2", "R2"));

        assert!(!store.clear_matching("R1"));
        assert!(path.exists());

        assert!(store.clear_matching("R2"));
        assert!(!path.exists());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_partial_pair_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"access_token":"T1"}"#).unwrap();

        assert!(FileCredentialStore::open(&path).get().is_none());
    }

    #[test]
    fn test_corrupt_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileCredentialStore::open(&path);
        assert!(store.get().is_none());

        // A later set replaces the corrupt file.
        store.set(CredentialPair::new("T2", "R2"));
        assert_eq!(
            FileCredentialStore::open(&path).get(),
            Some(CredentialPair::new("T2", "R2"))
        );
    }
}
