//! services/site/src/adapters/file_store.rs
//!
//! A JSON file that plays the part of the browser's local storage and cookie
//! jar for the site process. It implements both the `KeyValueStore` and the
//! `CookieJar` ports from the `core` crate.
//!
//! Inside a Tokio runtime, writes are deferred to the blocking pool so that
//! callers holding their own locks never wait on the disk. Outside one, every
//! mutation is written before it returns.

use chrono::{DateTime, Duration, Utc};
use dealer_analytics_core::ports::{CookieJar, KeyValueStore, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

//=========================================================================================
// On-disk Record Structs
//=========================================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    local: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, StoredCookie>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A file-backed store. Every write replaces the whole file.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    state: Mutex<StoredState>,
    /// Set when `state` has changes the file does not have yet.
    dirty: AtomicBool,
    /// Set while a background write is queued and has not started.
    scheduled: AtomicBool,
    /// Serializes file writes so an older snapshot never replaces a newer one.
    writing: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file starts empty; so does an
    /// unreadable one, which is overwritten on the next write.
    pub fn open(path: impl AsRef<Path>) -> PortResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed storage file {}: {}", path.display(), e);
                StoredState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredState::default(),
            Err(e) => return Err(PortError::Storage(e.to_string())),
        };
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                state: Mutex::new(state),
                dirty: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
                writing: Mutex::new(()),
            }),
        })
    }

    /// Waits until every change made so far is on disk.
    pub async fn persist(&self) -> PortResult<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.write_if_dirty())
            .await
            .map_err(|e| PortError::Storage(e.to_string()))?
    }

    fn state(&self) -> MutexGuard<'_, StoredState> {
        lock(&self.inner.state)
    }

    /// Records that `state` changed and gets it written.
    fn changed(&self) -> PortResult<()> {
        self.inner.dirty.store(true, Ordering::Release);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.inner.write_if_dirty();
        };
        if self.inner.scheduled.swap(true, Ordering::AcqRel) {
            // The queued write has not taken its snapshot yet.
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        runtime.spawn_blocking(move || {
            inner.scheduled.store(false, Ordering::Release);
            if let Err(e) = inner.write_if_dirty() {
                warn!("Failed to write storage file {}: {}", inner.path.display(), e);
            }
        });
        Ok(())
    }
}

impl StoreInner {
    fn write_if_dirty(&self) -> PortResult<()> {
        let _writing = lock(&self.writing);
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&*lock(&self.state))
            .map_err(|e| PortError::Storage(e.to_string()));
        let result = json.and_then(|json| self.write(&json));
        if result.is_err() {
            // Leave the changes pending for the next write or `persist`.
            self.dirty.store(true, Ordering::Release);
        } else {
            debug!("Storage written to {}", self.path.display());
        }
        result
    }

    fn write(&self, json: &str) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PortError::Storage(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| PortError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| PortError::Storage(e.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//=========================================================================================
// Port Implementations
//=========================================================================================

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.state().local.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        self.state().local.insert(key.to_string(), value.to_string());
        self.changed()
    }

    fn remove_item(&self, key: &str) -> PortResult<()> {
        let removed = self.state().local.remove(key).is_some();
        if removed {
            self.changed()?;
        }
        Ok(())
    }
}

impl CookieJar for FileStore {
    fn get_cookie(&self, name: &str) -> Option<String> {
        let state = self.state();
        state
            .cookies
            .get(name)
            .filter(|cookie| cookie.expires_at > Utc::now())
            .map(|cookie| cookie.value.clone())
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> PortResult<()> {
        self.state().cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at: Utc::now() + max_age,
            },
        );
        self.changed()
    }

    fn remove_cookie(&self, name: &str) -> PortResult<()> {
        let removed = self.state().cookies.remove(name).is_some();
        if removed {
            self.changed()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_and_cookies_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = FileStore::open(&path).unwrap();
        store.set_item("epic_queue_v2", "[]").unwrap();
        store
            .set_cookie("epic_client_id_v2", "abc", Duration::days(730))
            .unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("epic_queue_v2").unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.get_cookie("epic_client_id_v2").as_deref(), Some("abc"));

        reopened.remove_item("epic_queue_v2").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().get_item("epic_queue_v2").unwrap(), None);
    }

    #[test]
    fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get_item("anything").unwrap(), None);
        store.set_item("key", "value").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().get_item("key").unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn writes_inside_a_runtime_land_by_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = FileStore::open(&path).unwrap();

        for n in 0..50 {
            store.set_item("epic_queue_v2", &format!("[{}]", n)).unwrap();
        }
        store.remove_item("missing").unwrap();
        store.persist().await.unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("epic_queue_v2").unwrap().as_deref(), Some("[49]"));
    }

    #[tokio::test]
    async fn persisting_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = FileStore::open(&path).unwrap();

        store.persist().await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn expired_cookies_are_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("storage.json")).unwrap();
        store.set_cookie("old", "1", Duration::seconds(-5)).unwrap();
        assert_eq!(store.get_cookie("old"), None);
    }
}
