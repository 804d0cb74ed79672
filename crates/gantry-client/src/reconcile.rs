//! Apply a manifest set and delete what it no longer contains
//!
//! With state tracking, every successfully applied resource is recorded, and
//! recorded resources missing from the manifest set are deleted (in delete
//! order) and untracked once the delete succeeds. State is saved after each
//! tracked run, even if some deletes failed. Storage failures abort the run.
//! A dry run reads the state to preview removals but never writes it.

use gantry_core::{Catalog, Resource, sort_for_apply, sort_for_delete};
use gantry_state::{StateStorage, Result};
use std::sync::Arc;

use crate::orchestrator::{
    ApplyOptions, ApplyResult, DeleteResult, ResourceHandler, apply_all, delete_all,
};

/// Options of a reconcile run
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub apply: ApplyOptions,
    pub max_parallel: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            apply: ApplyOptions::default(),
            max_parallel: 1,
        }
    }
}

/// Per-resource outcomes of a reconcile run, in execution order
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub applied: Vec<ApplyResult>,
    /// Removed resources that were deleted automatically
    pub deleted: Vec<DeleteResult>,
}

impl ReconcileReport {
    pub fn failure_count(&self) -> usize {
        self.applied.iter().filter(|r| !r.is_success()).count()
            + self.deleted.iter().filter(|r| !r.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Sort, apply, and with `storage` reconcile removed resources
pub async fn reconcile<H>(
    handler: Arc<H>,
    catalog: &Catalog,
    resources: Vec<Resource>,
    storage: Option<&dyn StateStorage>,
    options: ReconcileOptions,
) -> Result<ReconcileReport>
where
    H: ResourceHandler + ?Sized + 'static,
{
    let tracked = match storage {
        Some(storage) => Some((storage, storage.load().await?)),
        None => None,
    };

    let sorted = sort_for_apply(catalog, resources);
    let applied = apply_all(handler.clone(), sorted, options.apply, options.max_parallel).await;

    let Some((storage, mut state)) = tracked else {
        return Ok(ReconcileReport {
            applied,
            deleted: Vec::new(),
        });
    };

    let dry_run = options.apply.dry_run;
    if !dry_run {
        for result in applied.iter().filter(|r| r.is_success()) {
            state.add_managed(&result.resource);
        }
    }

    let manifest: Vec<Resource> = applied.iter().map(|r| r.resource.clone()).collect();
    let removed = state
        .removed_resources(&manifest)
        .iter()
        .map(|record| record.to_resource())
        .collect::<Result<Vec<_>>>()?;

    let deleted = if removed.is_empty() {
        Vec::new()
    } else {
        tracing::debug!(count = removed.len(), dry_run, "deleting resources no longer in manifests");
        delete_all(handler, sort_for_delete(catalog, removed), dry_run, options.max_parallel).await
    };

    if dry_run {
        return Ok(ReconcileReport { applied, deleted });
    }

    for result in deleted.iter().filter(|r| r.is_success()) {
        state.remove_managed(&result.resource);
    }

    storage.save(&state).await?;
    tracing::debug!(location = %storage.describe(), managed = state.len(), "state saved");

    Ok(ReconcileReport { applied, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::UpsertResult;
    use crate::error::{ClientError, Result as ClientResult};
    use crate::orchestrator::ApplyOutcome;
    use async_trait::async_trait;
    use gantry_state::{MockStateStorage, State, StateError};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHandler {
        fail: Vec<String>,
        deleted: Mutex<Vec<String>>,
        dry_deletes: Mutex<Vec<bool>>,
    }

    fn rejected(name: &str) -> ClientError {
        ClientError::Api {
            status: 409,
            method: "PUT".to_string(),
            path: "/x".to_string(),
            message: format!("{} rejected", name),
        }
    }

    #[async_trait]
    impl ResourceHandler for FakeHandler {
        async fn apply(&self, resource: &Resource, _options: ApplyOptions) -> ClientResult<ApplyOutcome> {
            if self.fail.contains(&resource.name) {
                return Err(rejected(&resource.name));
            }
            Ok(ApplyOutcome {
                upsert: UpsertResult::Created,
                diff: None,
            })
        }

        async fn delete(&self, resource: &Resource, dry_run: bool) -> ClientResult<()> {
            self.deleted.lock().unwrap().push(resource.name.clone());
            self.dry_deletes.lock().unwrap().push(dry_run);
            if self.fail.contains(&resource.name) {
                return Err(rejected(&resource.name));
            }
            Ok(())
        }
    }

    fn topic(name: &str) -> Resource {
        Resource::from_value(
            json!({"apiVersion": "v2", "kind": "Topic", "metadata": {"name": name, "cluster": "prod"}}),
            "test",
        )
        .unwrap()
    }

    fn cluster(name: &str) -> Resource {
        Resource::from_value(
            json!({"apiVersion": "v2", "kind": "KafkaCluster", "metadata": {"name": name}}),
            "test",
        )
        .unwrap()
    }

    fn state_with(resources: &[Resource]) -> State {
        let mut state = State::new();
        for r in resources {
            state.add_managed(r);
        }
        state
    }

    #[tokio::test]
    async fn test_removed_resources_are_deleted_and_untracked() {
        let storage = MockStateStorage::with_state(state_with(&[topic("orders"), topic("stale"), cluster("old")]));
        let handler = Arc::new(FakeHandler::default());

        let report = reconcile(
            handler.clone(),
            &Catalog::new(),
            vec![topic("orders"), topic("payments")],
            Some(&storage),
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.applied.len(), 2);
        // Topic (priority 4) is removed before KafkaCluster (priority 2)
        assert_eq!(*handler.deleted.lock().unwrap(), vec!["stale", "old"]);

        let saved = storage.saved().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.is_managed(&topic("orders")));
        assert!(saved.is_managed(&topic("payments")));
        assert!(!saved.is_managed(&topic("stale")));
        assert_eq!(storage.operation_counts().saves, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_tracked_or_untracked() {
        let storage = MockStateStorage::with_state(state_with(&[topic("stale")]));
        let handler = Arc::new(FakeHandler {
            fail: vec!["broken".to_string(), "stale".to_string()],
            ..Default::default()
        });

        let report = reconcile(
            handler,
            &Catalog::new(),
            vec![topic("broken"), topic("orders")],
            Some(&storage),
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.failure_count(), 2);
        let saved = storage.saved().unwrap();
        assert!(!saved.is_managed(&topic("broken")));
        assert!(saved.is_managed(&topic("orders")));
        // failed delete stays tracked for the next run
        assert!(saved.is_managed(&topic("stale")));
    }

    #[tokio::test]
    async fn test_failed_apply_is_not_deleted() {
        let storage = MockStateStorage::with_state(state_with(&[topic("orders")]));
        let handler = Arc::new(FakeHandler {
            fail: vec!["orders".to_string()],
            ..Default::default()
        });

        let report = reconcile(
            handler.clone(),
            &Catalog::new(),
            vec![topic("orders")],
            Some(&storage),
            ReconcileOptions::default(),
        )
        .await
        .unwrap();

        assert!(report.deleted.is_empty());
        assert!(handler.deleted.lock().unwrap().is_empty());
        assert!(storage.saved().unwrap().is_managed(&topic("orders")));
    }

    #[tokio::test]
    async fn test_dry_run_previews_removals_without_saving() {
        let storage = MockStateStorage::with_state(state_with(&[topic("orders"), topic("stale")]));
        let handler = Arc::new(FakeHandler::default());
        let options = ReconcileOptions {
            apply: ApplyOptions { dry_run: true, diff: false },
            max_parallel: 2,
        };

        let report = reconcile(
            handler.clone(),
            &Catalog::new(),
            vec![topic("orders"), topic("payments")],
            Some(&storage),
            options,
        )
        .await
        .unwrap();

        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].resource.name, "stale");
        assert!(report.deleted[0].is_success());
        assert_eq!(*handler.dry_deletes.lock().unwrap(), vec![true]);
        assert_eq!(storage.operation_counts().loads, 1);
        assert_eq!(storage.operation_counts().saves, 0);
        let stored = storage.saved().unwrap();
        assert!(stored.is_managed(&topic("stale")));
        assert!(!stored.is_managed(&topic("payments")));
    }

    #[tokio::test]
    async fn test_without_state_only_applies() {
        let handler = Arc::new(FakeHandler::default());
        let report = reconcile(handler.clone(), &Catalog::new(), vec![topic("a")], None, ReconcileOptions::default())
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(report.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_aborts() {
        let storage = MockStateStorage::new();
        storage.fail_saves();
        let handler = Arc::new(FakeHandler::default());

        let err = reconcile(handler, &Catalog::new(), vec![topic("a")], Some(&storage), ReconcileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Backend { .. }));
    }
}
