//! Persistence port: the key/value backend a session is stored in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;

/// Backend-agnostic per-session key/value storage.
#[async_trait]
pub trait SessionPort: Send + Sync {
    /// Read a value, `None` if the key was never written or was cleared.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the given keys. Missing keys are ignored.
    async fn clear(&self, keys: &[&str]) -> Result<(), StorageError>;
}

/// In-memory port, lives as long as the process.
#[derive(Default)]
pub struct MemoryPort {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently stored.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl SessionPort for MemoryPort {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut values = self.values.write().await;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// Port backed by a single JSON object on disk.
///
/// Every write rewrites the whole file; the lock serialises writers within
/// the process.
pub struct FilePort {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePort {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, values: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionPort for FilePort {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.store(&values).await
    }

    async fn clear(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        for key in keys {
            values.remove(*key);
        }
        self.store(&values).await
    }
}
