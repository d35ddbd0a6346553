//! Best-effort JSON snapshot files.
//!
//! Each store keeps its state in one small JSON file under the data
//! directory. Loads never fail: a missing file yields the default value and
//! a corrupt one is logged and replaced by the default. Saves write to a
//! temporary sibling and rename it over the target.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::PersistenceError;

/// Well-known snapshot file names.
pub mod files {
    pub const USERS: &str = "users.json";
    pub const BLOCKED: &str = "blocked_users.json";
    pub const CONFIG: &str = "config.json";
}

/// A typed JSON file holding one snapshot of `T`.
#[derive(Debug, Clone)]
pub struct SnapshotFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SnapshotFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Snapshot file `name` inside `dir`.
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, strictly.
    pub async fn load(&self) -> Result<Option<T>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Serialization {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the snapshot, falling back to the default on any failure.
    pub async fn load_or_default(&self) -> T {
        match self.load().await {
            Ok(Some(value)) => {
                debug!(path = %self.path.display(), "Loaded snapshot");
                value
            }
            Ok(None) => T::default(),
            Err(e) => {
                warn!(error = %e, "Could not load snapshot; starting empty");
                T::default()
            }
        }
    }

    /// Write the snapshot atomically (temp file + rename).
    pub async fn save(&self, value: &T) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };

        let json =
            serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialization {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        enabled: bool,
        name: String,
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let snap: SnapshotFile<Sample> = SnapshotFile::in_dir(dir.path(), "nope.json");
        assert_eq!(snap.load().await.unwrap(), None);
        assert_eq!(snap.load_or_default().await, Sample::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let snap: SnapshotFile<Sample> = SnapshotFile::in_dir(dir.path(), "sample.json");
        let value = Sample {
            enabled: true,
            name: "room".into(),
        };
        snap.save(&value).await.unwrap();
        assert_eq!(snap.load_or_default().await, value);
    }

    #[tokio::test]
    async fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let snap: SnapshotFile<Sample> =
            SnapshotFile::new(dir.path().join("nested/deeper/sample.json"));
        snap.save(&Sample::default()).await.unwrap();
        assert!(snap.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, "{ not json").unwrap();

        let snap: SnapshotFile<Sample> = SnapshotFile::new(&path);
        assert!(matches!(
            snap.load().await,
            Err(PersistenceError::Serialization { .. })
        ));
        assert_eq!(snap.load_or_default().await, Sample::default());
    }

    #[tokio::test]
    async fn unknown_fields_ignored_and_missing_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, r#"{"enabled": true, "future_field": 3}"#).unwrap();

        let snap: SnapshotFile<Sample> = SnapshotFile::new(&path);
        let loaded = snap.load_or_default().await;
        assert!(loaded.enabled);
        assert_eq!(loaded.name, "");
    }

    #[tokio::test]
    async fn integer_keyed_maps_survive() {
        let dir = tempfile::tempdir().unwrap();
        let snap: SnapshotFile<BTreeMap<i64, String>> =
            SnapshotFile::in_dir(dir.path(), files::USERS);
        let mut map = BTreeMap::new();
        map.insert(111, "USER000111".to_string());
        snap.save(&map).await.unwrap();

        let raw = std::fs::read_to_string(snap.path()).unwrap();
        assert!(raw.contains("\"111\""));
        assert_eq!(snap.load_or_default().await, map);
    }

    #[tokio::test]
    async fn save_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let snap: SnapshotFile<Sample> = SnapshotFile::new(blocker.join("sample.json"));
        assert!(matches!(
            snap.save(&Sample::default()).await,
            Err(PersistenceError::Io { .. })
        ));
    }
}
