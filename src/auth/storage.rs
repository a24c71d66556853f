//! Durable storage for the session token pair

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Error;

/// A single-slot store holding the serialized token pair.
///
/// Absence of a value means "logged out".
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Read the stored value, if any
    async fn load(&self) -> Result<Option<String>, Error>;

    /// Replace the stored value
    async fn save(&self, value: &str) -> Result<(), Error>;

    /// Remove the stored value. Removing nothing is not an error.
    async fn clear(&self) -> Result<(), Error>;
}

/// In-process storage that does not survive a restart
#[derive(Debug, Default)]
pub struct MemoryStorage {
    value: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with `value`
    pub fn with_value(value: &str) -> Self {
        Self {
            value: Mutex::new(Some(value.to_string())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<String>, Error> {
        Ok(self.slot().clone())
    }

    async fn save(&self, value: &str) -> Result<(), Error> {
        *self.slot() = Some(value.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        *self.slot() = None;
        Ok(())
    }
}

/// Storage backed by `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Store the value for `key` inside `dir`
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStorage for FileStorage {
    async fn load(&self) -> Result<Option<String>, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, value: &str) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write then rename so a crash never leaves half a token pair behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load().await.unwrap(), None);
        storage.save("{}").await.unwrap();
        assert_eq!(storage.load().await.unwrap().as_deref(), Some("{}"));
        storage.clear().await.unwrap();
        storage.clear().await.unwrap();
        assert_eq!(storage.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_storage_uses_key_as_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"), "authToken");
        assert!(storage.path().ends_with("nested/authToken.json"));

        assert_eq!(storage.load().await.unwrap(), None);
        storage.save(r#"{"access":"a"}"#).await.unwrap();
        assert_eq!(
            storage.load().await.unwrap().as_deref(),
            Some(r#"{"access":"a"}"#)
        );

        storage.clear().await.unwrap();
        assert!(!storage.path().exists());
        storage.clear().await.unwrap();
    }
}
