//! In-memory state storage for tests
//!
//! Keeps the last saved state and counts operations, so callers can assert
//! that a run loaded and saved the state exactly when expected.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::StateStorage;
use crate::error::{Result, StateError};
use crate::state::State;

/// In-memory storage with operation counts and injectable save failures
#[derive(Debug, Clone, Default)]
pub struct MockStateStorage {
    state: Arc<RwLock<Option<State>>>,
    operations: Arc<RwLock<OperationCounts>>,
    fail_saves: Arc<RwLock<bool>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub loads: usize,
    pub saves: usize,
}

impl MockStateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state
    pub fn with_state(state: State) -> Self {
        let storage = Self::new();
        if let Ok(mut slot) = storage.state.write() {
            *slot = Some(state);
        }
        storage
    }

    /// Make every subsequent save fail
    pub fn fail_saves(&self) {
        if let Ok(mut fail) = self.fail_saves.write() {
            *fail = true;
        }
    }

    /// Last saved state, if any
    pub fn saved(&self) -> Option<State> {
        self.state.read().ok().and_then(|s| s.clone())
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    fn record(&self, f: impl FnOnce(&mut OperationCounts)) {
        if let Ok(mut ops) = self.operations.write() {
            f(&mut ops);
        }
    }
}

#[async_trait]
impl StateStorage for MockStateStorage {
    async fn load(&self) -> Result<State> {
        self.record(|ops| ops.loads += 1);
        Ok(self.saved().unwrap_or_default())
    }

    async fn save(&self, state: &State) -> Result<()> {
        self.record(|ops| ops.saves += 1);
        if self.fail_saves.read().map(|f| *f).unwrap_or(false) {
            return Err(StateError::backend("mock", "save rejected").with_hint("failure injected by test"));
        }
        let mut slot = self
            .state
            .write()
            .map_err(|_| StateError::backend("mock", "state lock poisoned"))?;
        *slot = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory state".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_and_failure() {
        let storage = MockStateStorage::new();
        assert!(storage.load().await.unwrap().is_empty());
        storage.save(&State::new()).await.unwrap();
        assert!(storage.saved().is_some());

        storage.fail_saves();
        assert!(storage.save(&State::new()).await.is_err());
        assert_eq!(storage.operation_counts(), OperationCounts { loads: 1, saves: 2 });
    }
}
