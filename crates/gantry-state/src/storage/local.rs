//! File-based state storage

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::StateStorage;
use crate::error::{Result, StateError};
use crate::state::State;

const BACKEND: &str = "local";

/// State kept in a local JSON file
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStorage for LocalFileStorage {
    async fn load(&self) -> Result<State> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no state file, starting empty");
            return Ok(State::new());
        }

        let data = std::fs::read(&self.path).map_err(|e| {
            StateError::backend(BACKEND, format!("cannot read {}: {}", self.path.display(), e))
                .with_hint("check the file permissions")
        })?;

        State::from_json(&data).map_err(|e| {
            StateError::backend(BACKEND, format!("{} is not a state file: {}", self.path.display(), e))
                .with_hint("move the file aside to start with an empty state")
        })
    }

    async fn save(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StateError::backend(BACKEND, format!("cannot create {}: {}", parent.display(), e))
                    .with_hint("check the directory permissions")
            })?;
        }

        let data = state
            .to_json()
            .map_err(|e| StateError::backend(BACKEND, format!("cannot serialize state: {}", e)))?;

        std::fs::write(&self.path, data).map_err(|e| {
            StateError::backend(BACKEND, format!("cannot write {}: {}", self.path.display(), e))
                .with_hint("check the file permissions")
        })
    }

    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::Resource;
    use tempfile::TempDir;

    fn user(name: &str) -> Resource {
        Resource::from_yaml(&format!("apiVersion: v2\nkind: User\nmetadata:\n  name: {}\n", name)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_state() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path().join("state.json"));

        let state = storage.load().await.unwrap();
        assert_eq!(state.version, "v1");
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path().join("nested/dir/state.json"));

        let mut state = State::new();
        state.add_managed(&user("alice"));
        state.add_managed(&user("bob"));
        storage.save(&state).await.unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.resources, state.resources);
        assert!(loaded.is_managed(&user("bob")));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(tmp.path().join("state.json"));

        let mut state = State::new();
        state.add_managed(&user("alice"));
        storage.save(&state).await.unwrap();

        state.remove_managed(&user("alice"));
        storage.save(&state).await.unwrap();

        assert!(storage.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_has_hint() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = LocalFileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StateError::Backend { backend: "local", hint: Some(_), .. }));
        assert!(err.to_string().contains("Hint:"));
    }
}
