//! Apply and delete many resources with bounded parallelism
//!
//! Inputs arrive already sorted. With `max_parallel <= 1` resources are
//! handled one after another in input order. Otherwise resources are grouped
//! by kind (first-seen order), and each group is dispatched before the next;
//! a semaphore permit is taken before each task is spawned, so at most
//! `max_parallel` calls are in flight. Calls of one group may still be running
//! when the next group starts.
//!
//! Every resource is attempted and yields exactly one result, stored at its
//! input index.

use async_trait::async_trait;
use gantry_core::Resource;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::client::UpsertResult;
use crate::error::{ClientError, Result};

/// Per-run apply flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Validate on the backend without persisting
    pub dry_run: bool,
    /// Fetch the remote version and compute a diff before applying
    pub diff: bool,
}

/// Successful apply
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub upsert: UpsertResult,
    pub diff: Option<String>,
}

/// Outcome of applying one resource
#[derive(Debug)]
pub struct ApplyResult {
    pub resource: Resource,
    pub outcome: Result<ApplyOutcome>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Outcome of deleting one resource
#[derive(Debug)]
pub struct DeleteResult {
    pub resource: Resource,
    pub outcome: Result<()>,
}

impl DeleteResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Performs the backend call for a single resource
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn apply(&self, resource: &Resource, options: ApplyOptions) -> Result<ApplyOutcome>;

    async fn delete(&self, resource: &Resource, dry_run: bool) -> Result<()>;
}

/// Apply every resource
pub async fn apply_all<H>(
    handler: Arc<H>,
    resources: Vec<Resource>,
    options: ApplyOptions,
    max_parallel: usize,
) -> Vec<ApplyResult>
where
    H: ResourceHandler + ?Sized + 'static,
{
    let outcomes = run_all(&resources, max_parallel, |resource| {
        let handler = handler.clone();
        async move { handler.apply(&resource, options).await }
    })
    .await;

    resources
        .into_iter()
        .zip(outcomes)
        .map(|(resource, outcome)| ApplyResult { resource, outcome })
        .collect()
}

/// Delete every resource
pub async fn delete_all<H>(
    handler: Arc<H>,
    resources: Vec<Resource>,
    dry_run: bool,
    max_parallel: usize,
) -> Vec<DeleteResult>
where
    H: ResourceHandler + ?Sized + 'static,
{
    let outcomes = run_all(&resources, max_parallel, |resource| {
        let handler = handler.clone();
        async move { handler.delete(&resource, dry_run).await }
    })
    .await;

    resources
        .into_iter()
        .zip(outcomes)
        .map(|(resource, outcome)| DeleteResult { resource, outcome })
        .collect()
}

/// Indices of `resources` grouped by kind, groups in first-seen order
fn group_by_kind(resources: &[Resource]) -> Vec<Vec<usize>> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (index, resource) in resources.iter().enumerate() {
        match groups.iter_mut().find(|(kind, _)| *kind == resource.kind) {
            Some((_, members)) => members.push(index),
            None => groups.push((&resource.kind, vec![index])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

async fn run_all<T, F, Fut>(resources: &[Resource], max_parallel: usize, op: F) -> Vec<Result<T>>
where
    T: Send + 'static,
    F: Fn(Resource) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut slots: Vec<Option<Result<T>>> = resources.iter().map(|_| None).collect();

    if max_parallel <= 1 {
        for (index, resource) in resources.iter().enumerate() {
            slots[index] = Some(op(resource.clone()).await);
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut join_set = JoinSet::new();

        for group in group_by_kind(resources) {
            tracing::debug!(
                kind = %resources[group[0]].kind,
                count = group.len(),
                "dispatching kind group"
            );
            for index in group {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        slots[index] = Some(Err(ClientError::Task(
                            "concurrency semaphore unexpectedly closed".to_string(),
                        )));
                        continue;
                    }
                };
                let task = op(resources[index].clone());
                join_set.spawn(async move {
                    let result = task.await;
                    drop(permit);
                    (index, result)
                });
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "worker task panicked"),
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(ClientError::Task("task ended without a result".to_string()))))
        .collect()
}
