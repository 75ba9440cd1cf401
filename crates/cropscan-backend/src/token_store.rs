//! Local credential storage.
//!
//! Credentials live under three fixed keys: the access token, the refresh
//! token and the serialized user record.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{BackendError, BackendResult};

pub const ACCESS_TOKEN_KEY: &str = "@access_token";
pub const REFRESH_TOKEN_KEY: &str = "@refresh_token";
pub const AUTH_DATA_KEY: &str = "@auth_data";

/// Every key written by the backend client.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, AUTH_DATA_KEY];

/// Async key-value store for credentials.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> BackendResult<()>;

    /// Write several keys. Stores that can do so write them in one step.
    async fn set_many(&self, entries: &[(&str, &str)]) -> BackendResult<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> BackendResult<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// In-process store; forgets everything on exit.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// JSON map on disk.
///
/// Every write replaces the whole file through a temporary file and a rename,
/// so readers never see a partial file. On Unix the file is private to the
/// owner (0600).
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> BackendResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                BackendError::storage(format!("{} is corrupt: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> BackendResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let content = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} credential entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> BackendResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if apply(&mut entries) {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.set_many(&[(key, value)]).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.remove_many(&[key]).await
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> BackendResult<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
            true
        })
        .await
    }

    async fn remove_many(&self, keys: &[&str]) -> BackendResult<()> {
        self.update(|map| {
            let before = map.len();
            for key in keys {
                map.remove(*key);
            }
            map.len() != before
        })
        .await
    }
}
