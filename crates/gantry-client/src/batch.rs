//! Server-side batch apply
//!
//! The whole manifest set is submitted in one request and the server runs the
//! job. The client polls the job token with exponential backoff, reports only
//! results it has not reported before, and on cancellation asks the server to
//! stop, then keeps polling until the job is acknowledged as cancelled.

use gantry_core::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

use crate::client::{BackendClient, UpsertResult};
use crate::error::ClientError;

/// Batch job endpoint on the console backend
pub const BATCH_APPLY_PATH: &str = "/public/v1/resources/batch-apply";

/// Largest batch accepted without explicit confirmation
pub const MAX_UNCONFIRMED_RESOURCES: usize = 50;

pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors of a batch apply
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid batch strategy '{0}'\nHint: use fail-fast or continue-on-error")]
    InvalidStrategy(String),

    #[error("refusing to submit {count} resources in one batch (limit {max} without confirmation)\nHint: pass --yes to confirm")]
    TooManyResources { count: usize, max: usize },

    /// The job was cancelled; results completed before that are kept
    #[error("batch apply cancelled with {} completed result(s)", .partial.len())]
    Cancelled { partial: Vec<BatchResultItem> },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// What the server does after a resource fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStrategy {
    #[default]
    FailFast,
    ContinueOnError,
}

impl BatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStrategy::FailFast => "fail-fast",
            BatchStrategy::ContinueOnError => "continue-on-error",
        }
    }
}

impl FromStr for BatchStrategy {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(BatchStrategy::FailFast),
            "continue-on-error" => Ok(BatchStrategy::ContinueOnError),
            other => Err(BatchError::InvalidStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll interval bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
        }
    }
}

/// Doubling delay, capped, reset on progress
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: PollPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
        }
    }

    /// Delay before the next poll
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.policy.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
    }
}

/// Batch apply settings
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub print_diff: bool,
    /// Raw strategy name, validated before anything is sent
    pub strategy: String,
    /// Allow more than [`MAX_UNCONFIRMED_RESOURCES`] resources
    pub confirm_large: bool,
    pub poll: PollPolicy,
    pub cancel_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            print_diff: false,
            strategy: BatchStrategy::default().to_string(),
            confirm_large: false,
            poll: PollPolicy::default(),
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }
}

/// State of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

/// Outcome of one resource inside a batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultItem {
    #[serde(default)]
    pub original_path: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub upsert_result: Option<UpsertResult>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchResultItem {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `Kind/name` when the server reports both
    pub fn label(&self) -> String {
        match (&self.kind, &self.name) {
            (Some(kind), Some(name)) => format!("{}/{}", kind, name),
            (None, Some(name)) => name.clone(),
            _ => self.original_path.clone().unwrap_or_else(|| "<unknown>".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobPayload {
    status: JobStatus,
    #[serde(default)]
    results: Vec<BatchResultItem>,
}

/// Progress callbacks, all optional
pub trait BatchObserver: Send + Sync {
    fn on_submitted(&self, _token: &str) {}

    /// Results completed since the previous call
    fn on_results(&self, _results: &[BatchResultItem]) {}

    fn on_cancel_requested(&self) {}
}

impl BatchObserver for () {}

/// Shared cancellation signal, set once
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }
}

/// Submit `resources` as one job and follow it to the end
///
/// Returns every result on completion. If `cancel` fires while the job runs,
/// returns [`BatchError::Cancelled`] once the server confirms, with the
/// results completed until then. A job that completes despite the cancel
/// request is reported as completed.
pub async fn batch_apply(
    client: &BackendClient,
    resources: &[Resource],
    options: &BatchOptions,
    cancel: &CancelFlag,
    observer: &dyn BatchObserver,
) -> Result<Vec<BatchResultItem>, BatchError> {
    let strategy: BatchStrategy = options.strategy.parse()?;
    if resources.len() > MAX_UNCONFIRMED_RESOURCES && !options.confirm_large {
        return Err(BatchError::TooManyResources {
            count: resources.len(),
            max: MAX_UNCONFIRMED_RESOURCES,
        });
    }
    if resources.is_empty() {
        return Ok(Vec::new());
    }

    let token = submit(client, resources, options, strategy).await?;
    tracing::debug!(%token, count = resources.len(), %strategy, "batch submitted");
    observer.on_submitted(&token);

    let job_path = format!("{}/{}", BATCH_APPLY_PATH, token);
    let mut backoff = Backoff::new(options.poll);
    let mut reported = 0usize;
    let mut cancel_sent = false;

    loop {
        if cancel.is_cancelled() && !cancel_sent {
            cancel_sent = true;
            observer.on_cancel_requested();
            if let Err(e) = client.delete_with_timeout(&job_path, options.cancel_timeout).await {
                tracing::warn!(%token, error = %e, "cancel request failed, waiting for the job anyway");
            }
        }

        let payload = poll(client, &job_path).await?;
        if payload.results.len() > reported {
            observer.on_results(&payload.results[reported..]);
            reported = payload.results.len();
            backoff.reset();
        }

        match payload.status {
            JobStatus::Completed => return Ok(payload.results),
            JobStatus::Cancelled => {
                return Err(BatchError::Cancelled {
                    partial: payload.results,
                });
            }
            JobStatus::Pending | JobStatus::Running => {}
        }

        let delay = backoff.next_delay();
        if cancel_sent {
            tokio::time::sleep(delay).await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

async fn submit(
    client: &BackendClient,
    resources: &[Resource],
    options: &BatchOptions,
    strategy: BatchStrategy,
) -> Result<String, BatchError> {
    let entries: Vec<Value> = resources
        .iter()
        .map(|r| {
            json!({
                "originalPath": r.source.as_ref().map(|p| p.display().to_string()),
                "content": r.document,
            })
        })
        .collect();
    let body = json!({
        "resources": entries,
        "dryRun": options.dry_run,
        "printDiff": options.print_diff,
        "strategy": strategy.as_str(),
    });

    let response = client.post(BATCH_APPLY_PATH, Some(&body)).await?;
    response
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BatchError::Client(ClientError::InvalidResponse {
                path: BATCH_APPLY_PATH.to_string(),
                message: "missing job token".to_string(),
            })
        })
}

async fn poll(client: &BackendClient, job_path: &str) -> Result<JobPayload, BatchError> {
    let value = client.get(job_path).await?;
    serde_json::from_value(value).map_err(|e| {
        BatchError::Client(ClientError::InvalidResponse {
            path: job_path.to_string(),
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use gantry_core::Backend;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JOB: &str = "/public/v1/resources/batch-apply/job-1";

    fn fast_options() -> BatchOptions {
        BatchOptions {
            poll: PollPolicy {
                initial: Duration::from_millis(1),
                max: Duration::from_millis(5),
            },
            cancel_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn topics(count: usize) -> Vec<Resource> {
        (0..count)
            .map(|i| {
                Resource::from_value(
                    json!({"apiVersion": "v2", "kind": "Topic", "metadata": {"name": format!("t{}", i), "cluster": "c"}}),
                    "test",
                )
                .unwrap()
                .with_source(format!("topics/t{}.yaml", i))
            })
            .collect()
    }

    fn item(name: &str) -> Value {
        json!({"kind": "Topic", "name": name, "upsertResult": "Created"})
    }

    fn status(status: &str, names: &[&str]) -> ResponseTemplate {
        let results: Vec<Value> = names.iter().map(|n| item(n)).collect();
        ResponseTemplate::new(200).set_body_json(json!({"status": status, "results": results}))
    }

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(Backend::Console, ClientConfig::new(server.uri())).unwrap()
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(BATCH_APPLY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "job-1"})))
            .mount(server)
            .await;
    }

    /// Records every batch of new results
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<String>>>,
        cancel_on_first: Option<CancelFlag>,
    }

    impl BatchObserver for Recorder {
        fn on_results(&self, results: &[BatchResultItem]) {
            self.batches
                .lock()
                .unwrap()
                .push(results.iter().map(BatchResultItem::label).collect());
            if let Some(flag) = &self.cancel_on_first {
                flag.cancel();
            }
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("fail-fast".parse::<BatchStrategy>().unwrap(), BatchStrategy::FailFast);
        assert_eq!(
            "continue-on-error".parse::<BatchStrategy>().unwrap(),
            BatchStrategy::ContinueOnError
        );
        assert!(matches!(
            "bogus".parse::<BatchStrategy>(),
            Err(BatchError::InvalidStrategy(s)) if s == "bogus"
        ));
        assert_eq!(BatchStrategy::ContinueOnError.to_string(), "continue-on-error");
    }

    #[test]
    fn test_backoff_doubles_caps_and_resets() {
        let mut backoff = Backoff::new(PollPolicy::default());
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 5000, 5000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_bogus_strategy_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let options = BatchOptions {
            strategy: "bogus".to_string(),
            ..fast_options()
        };
        let err = batch_apply(&client(&server), &topics(2), &options, &CancelFlag::new(), &())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidStrategy(_)));
    }

    #[tokio::test]
    async fn test_large_batch_needs_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = batch_apply(&client(&server), &topics(51), &fast_options(), &CancelFlag::new(), &())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::TooManyResources { count: 51, max: 50 }));
    }

    #[tokio::test]
    async fn test_submission_payload_and_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BATCH_APPLY_PATH))
            .and(body_partial_json(json!({
                "dryRun": true,
                "printDiff": false,
                "strategy": "continue-on-error",
                "resources": [{"originalPath": "topics/t0.yaml"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "job-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Completed", &["t0"]))
            .mount(&server)
            .await;

        let options = BatchOptions {
            dry_run: true,
            strategy: "continue-on-error".to_string(),
            ..fast_options()
        };
        let results = batch_apply(&client(&server), &topics(1), &options, &CancelFlag::new(), &())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].upsert_result, Some(UpsertResult::Created));
    }

    #[tokio::test]
    async fn test_results_reported_once() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Running", &["t0"]))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Running", &["t0", "t1"]))
            .up_to_n_times(1)
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Completed", &["t0", "t1", "t2"]))
            .with_priority(3)
            .mount(&server)
            .await;

        let recorder = Recorder::default();
        let results = batch_apply(&client(&server), &topics(3), &fast_options(), &CancelFlag::new(), &recorder)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            *recorder.batches.lock().unwrap(),
            vec![
                vec!["Topic/t0".to_string()],
                vec!["Topic/t1".to_string()],
                vec!["Topic/t2".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_poll_returns_partial_results() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Running", &["t0"]))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Cancelled", &["t0", "t1"]))
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(JOB))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancelFlag::new();
        let recorder = Recorder {
            cancel_on_first: Some(cancel.clone()),
            ..Default::default()
        };
        let err = batch_apply(&client(&server), &topics(3), &fast_options(), &cancel, &recorder)
            .await
            .unwrap_err();

        match err {
            BatchError::Cancelled { partial } => {
                let names: Vec<_> = partial.iter().map(BatchResultItem::label).collect();
                assert_eq!(names, vec!["Topic/t0", "Topic/t1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_completion_wins_over_late_cancel() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path(JOB))
            .respond_with(status("Completed", &["t0"]))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let results = batch_apply(&client(&server), &topics(1), &fast_options(), &cancel, &())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = batch_apply(&client(&server), &topics(1), &fast_options(), &CancelFlag::new(), &())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Client(ClientError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_cancel_flag_wakes_waiters() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::task::yield_now().await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(flag.is_cancelled());
    }
}
