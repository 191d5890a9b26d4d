//! JSON persistence under `<config_dir>/.storage/`
//!
//! Every file is an envelope around the registry payload:
//!
//! ```json
//! { "version": 1, "minor_version": 6, "key": "core.area_registry", "data": { ... } }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} has version {found}, only {expected} is supported")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

/// A payload persisted under a fixed key. A major version bump is a
/// breaking change; minor versions only add fields.
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// `Ok(None)` when nothing has been saved under `T::KEY` yet
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<StorageFile<T>>> {
        let content = match fs::read_to_string(self.file_path(T::KEY)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = T::KEY, "Nothing stored yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        if file.version != T::VERSION {
            return Err(StorageError::VersionMismatch {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                found = file.minor_version,
                current = T::MINOR_VERSION,
                "Loading an older minor version"
            );
        }
        debug!(key = T::KEY, minor_version = file.minor_version, "Loaded");
        Ok(Some(file))
    }

    /// Write to `<key>.tmp` then rename over the real file
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, serde_json::to_string_pretty(&file)?).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = T::KEY, "Saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Rooms {
        names: Vec<String>,
    }

    impl Storable for Rooms {
        const KEY: &'static str = "test.rooms";
        const VERSION: u32 = 1;
        const MINOR_VERSION: u32 = 2;
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        let rooms = Rooms {
            names: vec!["Bedroom".into(), "Kitchen".into()],
        };

        storage.save(&rooms).await.unwrap();
        assert!(storage.file_path("test.rooms").exists());
        assert!(!storage.file_path("test.rooms.tmp").exists());

        let loaded = storage.load::<Rooms>().await.unwrap().unwrap();
        assert_eq!(loaded.data, rooms);
        assert_eq!(loaded.key, "test.rooms");
        assert_eq!(loaded.minor_version, 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        assert!(storage.load::<Rooms>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_major_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();
        std::fs::write(
            storage.file_path("test.rooms"),
            r#"{"version": 2, "minor_version": 1, "key": "test.rooms", "data": {"names": []}}"#,
        )
        .unwrap();

        let err = storage.load::<Rooms>().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }
}
