//! Experiment task store.
//!
//! [`TaskStore`] deduplicates experiment computation: identical task
//! configurations are computed at most once within the result durability
//! window and reused afterwards. Persistence is delegated to an
//! [`ExperimentStore`] backend.

pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use annobench_core::{
    CoreError, ExperimentId, ExperimentTask, ExperimentTaskConfiguration, ExperimentTaskResult,
    ExperimentType, Matching, TaskErrorKind, TaskId, TaskState,
};

pub use memory::InMemoryExperimentStore;

/// Task store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Outcome of [`TaskStore::connect_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A cached task answers the key; nothing needs to be computed.
    Reused(TaskId),
    /// A new task was created and has to be computed by the caller.
    Created(TaskId),
}

impl ConnectOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Reused(id) | Self::Created(id) => *id,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, Self::Reused(_))
    }
}

/// Storage contract of the task store.
///
/// `connect_cached_or_create` must be atomic: two concurrent callers with
/// the same configuration observe exactly one created task.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Most recent task for `config` that is not in an error state and not
    /// older than `durability`.
    async fn get_cached_task_id(
        &self,
        config: &ExperimentTaskConfiguration,
        durability: Duration,
    ) -> Option<TaskId>;

    /// Create a pending task for `config` connected to `experiment_id`.
    async fn create_task(
        &self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
    ) -> TaskId;

    async fn connect_existing_task_with_experiment(
        &self,
        task_id: TaskId,
        experiment_id: &ExperimentId,
    ) -> Result<(), StoreError>;

    /// Lookup-or-create as one atomic step.
    async fn connect_cached_or_create(
        &self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
        durability: Duration,
    ) -> ConnectOutcome;

    /// Move every task that is still pending or running into
    /// `Error(ServerStoppedWhileProcessing)`. Returns how many were moved.
    async fn set_running_tasks_to_error(&self) -> usize;

    async fn set_task_state(&self, task_id: TaskId, state: TaskState) -> Result<(), StoreError>;

    /// Store the result of a task and mark it finished.
    async fn set_task_result(
        &self,
        task_id: TaskId,
        result: ExperimentTaskResult,
    ) -> Result<(), StoreError>;

    async fn get_task(&self, task_id: TaskId) -> Option<ExperimentTask>;

    /// Tasks connected to `experiment_id`, ordered by task id.
    async fn get_tasks_of_experiment(&self, experiment_id: &ExperimentId) -> Vec<ExperimentTask>;

    async fn list_tasks(&self) -> Vec<ExperimentTask>;

    /// Known `(annotator, dataset)` pairs for an experiment type and matching.
    async fn annotator_dataset_combinations(
        &self,
        experiment_type: ExperimentType,
        matching: Matching,
    ) -> Vec<(String, String)>;

    /// Most recent finished task of a combination, regardless of its age.
    async fn latest_finished_task(
        &self,
        config: &ExperimentTaskConfiguration,
    ) -> Option<ExperimentTask>;
}

/// Number of tasks per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStateCounts {
    pub pending: usize,
    pub running: usize,
    pub finished: usize,
    pub error: usize,
}

impl TaskStateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.finished + self.error
    }
}

/// Task store facade used by the experiment runner.
pub struct TaskStore {
    backend: Arc<dyn ExperimentStore>,
    durability: Duration,
    warned_uncached: AtomicBool,
}

impl TaskStore {
    /// Open the store on top of `backend`.
    ///
    /// Tasks left pending or running by a previous process are moved to the
    /// error state before the store is handed out, so they can never be
    /// reused.
    pub async fn open(backend: Arc<dyn ExperimentStore>, result_durability_secs: i64) -> Self {
        let swept = backend.set_running_tasks_to_error().await;
        if swept > 0 {
            info!(tasks = swept, "Moved orphaned tasks to error state");
        }
        Self {
            backend,
            durability: Duration::seconds(result_durability_secs),
            warned_uncached: AtomicBool::new(false),
        }
    }

    /// False if results are never reused.
    pub fn caching_enabled(&self) -> bool {
        self.durability > Duration::zero()
    }

    pub fn backend(&self) -> &Arc<dyn ExperimentStore> {
        &self.backend
    }

    /// Reuse a cached task for `config` or create a new one.
    pub async fn connect_or_create(
        &self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
    ) -> ConnectOutcome {
        if !self.caching_enabled() {
            if !self.warned_uncached.swap(true, Ordering::SeqCst) {
                warn!("The durability of results is <= 0. Results won't be cached.");
            }
            let task_id = self.backend.create_task(config, experiment_id).await;
            return ConnectOutcome::Created(task_id);
        }

        let outcome = self
            .backend
            .connect_cached_or_create(config, experiment_id, self.durability)
            .await;
        match outcome {
            ConnectOutcome::Reused(task_id) => {
                debug!(task_id = %task_id, task = %config, "Reusing cached task");
            }
            ConnectOutcome::Created(task_id) => {
                debug!(task_id = %task_id, task = %config, "Created task");
            }
        }
        outcome
    }

    pub async fn start_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.backend.set_task_state(task_id, TaskState::Running).await
    }

    pub async fn set_task_result(
        &self,
        task_id: TaskId,
        result: ExperimentTaskResult,
    ) -> Result<(), StoreError> {
        self.backend.set_task_result(task_id, result).await
    }

    pub async fn fail_task(&self, task_id: TaskId, kind: TaskErrorKind) -> Result<(), StoreError> {
        self.backend
            .set_task_state(task_id, TaskState::Error(kind))
            .await
    }

    pub async fn get_task(&self, task_id: TaskId) -> Option<ExperimentTask> {
        self.backend.get_task(task_id).await
    }

    /// Count tasks by state.
    pub async fn task_state_counts(&self) -> TaskStateCounts {
        let mut counts = TaskStateCounts::default();
        for task in self.backend.list_tasks().await {
            match task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Finished => counts.finished += 1,
                TaskState::Error(_) => counts.error += 1,
            }
        }
        counts
    }

    /// All tasks an experiment is connected to, ordered by task id.
    pub async fn get_results_of_experiment(
        &self,
        experiment_id: &ExperimentId,
    ) -> Vec<ExperimentTask> {
        self.backend.get_tasks_of_experiment(experiment_id).await
    }

    /// Most recent finished result per (annotator, dataset) pair.
    ///
    /// Unlike [`TaskStore::connect_or_create`], this ignores the durability
    /// window.
    #[deprecated(note = "use get_results_of_experiment")]
    pub async fn latest_results(
        &self,
        experiment_type: ExperimentType,
        matching: Matching,
    ) -> Vec<ExperimentTask> {
        let combinations = self
            .backend
            .annotator_dataset_combinations(experiment_type, matching)
            .await;
        let mut results = Vec::with_capacity(combinations.len());
        for (annotator, dataset) in combinations {
            let config =
                ExperimentTaskConfiguration::new(annotator, dataset, experiment_type, matching);
            if let Some(task) = self.backend.latest_finished_task(&config).await {
                results.push(task);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::test_support::CapturedLogs;

    const WEEK: i64 = 7 * 24 * 3600;

    fn config(annotator: &str, dataset: &str) -> ExperimentTaskConfiguration {
        ExperimentTaskConfiguration::new(
            annotator,
            dataset,
            ExperimentType::A2KB,
            Matching::WeakAnnotationMatch,
        )
    }

    fn result(micro_f1: f64) -> ExperimentTaskResult {
        ExperimentTaskResult {
            micro_precision: micro_f1,
            micro_recall: micro_f1,
            micro_f1,
            macro_precision: micro_f1,
            macro_recall: micro_f1,
            macro_f1: micro_f1,
            error_count: 0,
            state: TaskState::Finished,
            timestamp: Utc::now(),
        }
    }

    async fn open_memory(durability_secs: i64) -> TaskStore {
        TaskStore::open(Arc::new(InMemoryExperimentStore::new()), durability_secs).await
    }

    #[tokio::test]
    async fn test_second_request_reuses_task() {
        let store = open_memory(WEEK).await;
        let first = store
            .connect_or_create(&config("a", "d"), &ExperimentId::new("e1"))
            .await;
        let second = store
            .connect_or_create(&config("a", "d"), &ExperimentId::new("e2"))
            .await;
        assert!(!first.is_reused());
        assert_eq!(second, ConnectOutcome::Reused(first.task_id()));

        let task = store.get_task(first.task_id()).await.unwrap();
        assert_eq!(
            task.experiments,
            vec![ExperimentId::new("e1"), ExperimentId::new("e2")]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_create_one_task() {
        let store = Arc::new(open_memory(WEEK).await);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .connect_or_create(&config("a", "d"), &ExperimentId::new(format!("e{i}")))
                    .await
            }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let created: Vec<_> = outcomes.iter().filter(|o| !o.is_reused()).collect();
        assert_eq!(created.len(), 1);
        let task_id = created[0].task_id();
        assert!(outcomes.iter().all(|o| o.task_id() == task_id));
        assert_eq!(store.backend().list_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_durability_always_creates() {
        let store = open_memory(0).await;
        assert!(!store.caching_enabled());
        let exp = ExperimentId::new("e1");
        let first = store.connect_or_create(&config("a", "d"), &exp).await;
        let second = store.connect_or_create(&config("a", "d"), &exp).await;
        assert!(!first.is_reused());
        assert!(!second.is_reused());
        assert_ne!(first.task_id(), second.task_id());

        let store = open_memory(-5).await;
        assert!(!store.connect_or_create(&config("a", "d"), &exp).await.is_reused());
    }

    #[tokio::test]
    async fn test_uncached_warning_is_logged_once() {
        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber(tracing::Level::INFO));

        let store = open_memory(0).await;
        let exp = ExperimentId::new("e1");
        store.connect_or_create(&config("a", "d"), &exp).await;
        store.connect_or_create(&config("b", "d"), &exp).await;

        let warnings = logs.lines_with("Results won't be cached");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("WARN"));

        let other = open_memory(-1).await;
        other.connect_or_create(&config("a", "d"), &exp).await;
        assert_eq!(logs.lines_with("Results won't be cached").len(), 2);
    }

    #[tokio::test]
    async fn test_orphans_are_swept_on_open() {
        let backend = Arc::new(InMemoryExperimentStore::new());
        let exp = ExperimentId::new("e1");
        let task_id = backend.create_task(&config("a", "d"), &exp).await;
        backend
            .set_task_state(task_id, TaskState::Running)
            .await
            .unwrap();

        let store = TaskStore::open(backend, WEEK).await;
        let task = store.get_task(task_id).await.unwrap();
        assert_eq!(
            task.state,
            TaskState::Error(TaskErrorKind::ServerStoppedWhileProcessing)
        );

        let outcome = store
            .connect_or_create(&config("a", "d"), &ExperimentId::new("e2"))
            .await;
        assert!(!outcome.is_reused());
        assert_ne!(outcome.task_id(), task_id);
    }

    #[tokio::test]
    async fn test_failed_task_is_not_reused() {
        let store = open_memory(WEEK).await;
        let exp = ExperimentId::new("e1");
        let first = store.connect_or_create(&config("a", "d"), &exp).await;
        store.start_task(first.task_id()).await.unwrap();
        store
            .fail_task(first.task_id(), TaskErrorKind::TooManyAnnotatorErrors)
            .await
            .unwrap();

        let second = store.connect_or_create(&config("a", "d"), &exp).await;
        assert!(!second.is_reused());
    }

    #[tokio::test]
    async fn test_finished_task_cannot_be_restarted() {
        let store = open_memory(WEEK).await;
        let exp = ExperimentId::new("e1");
        let task_id = store.connect_or_create(&config("a", "d"), &exp).await.task_id();
        store.start_task(task_id).await.unwrap();
        store.set_task_result(task_id, result(0.5)).await.unwrap();

        assert!(matches!(
            store.start_task(task_id).await,
            Err(StoreError::Core(CoreError::InvalidStateTransition { .. }))
        ));
        assert!(matches!(
            store.start_task(TaskId::new(1000)).await,
            Err(StoreError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_task_state_counts() {
        let store = open_memory(WEEK).await;
        let exp = ExperimentId::new("e1");
        let a = store.connect_or_create(&config("a", "d"), &exp).await.task_id();
        let b = store.connect_or_create(&config("b", "d"), &exp).await.task_id();
        let c = store.connect_or_create(&config("c", "d"), &exp).await.task_id();
        store.connect_or_create(&config("d", "d"), &exp).await;
        store.start_task(a).await.unwrap();
        store.set_task_result(a, result(1.0)).await.unwrap();
        store.start_task(b).await.unwrap();
        store
            .fail_task(c, TaskErrorKind::AnnotatorNotSupported)
            .await
            .unwrap();

        let counts = store.task_state_counts().await;
        assert_eq!(
            counts,
            TaskStateCounts {
                pending: 1,
                running: 1,
                finished: 1,
                error: 1,
            }
        );
        assert_eq!(counts.total(), 4);
    }

    #[tokio::test]
    async fn test_results_of_experiment() {
        let store = open_memory(WEEK).await;
        let e1 = ExperimentId::new("e1");
        let e2 = ExperimentId::new("e2");
        let a = store.connect_or_create(&config("a", "d"), &e1).await.task_id();
        let b = store.connect_or_create(&config("b", "d"), &e1).await.task_id();
        store.connect_or_create(&config("a", "d"), &e2).await;

        let ids: Vec<TaskId> = store
            .get_results_of_experiment(&e1)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![a, b]);

        let ids: Vec<TaskId> = store
            .get_results_of_experiment(&e2)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![a]);
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn test_latest_results_ignore_durability() {
        let mut old = ExperimentTask::new(TaskId::new(1), config("a", "d"));
        old.start().unwrap();
        old.finish(result(0.25)).unwrap();
        old.last_changed = Utc::now() - Duration::days(30);

        let mut newer = ExperimentTask::new(TaskId::new(2), config("a", "d"));
        newer.start().unwrap();
        newer.finish(result(0.75)).unwrap();
        newer.last_changed = Utc::now() - Duration::days(20);

        let mut other = ExperimentTask::new(TaskId::new(3), config("b", "d"));
        other.start().unwrap();
        other.fail(TaskErrorKind::UnexpectedFailure).unwrap();

        let backend = Arc::new(InMemoryExperimentStore::with_tasks([old, newer, other]));
        let store = TaskStore::open(backend, WEEK).await;

        let latest = store
            .latest_results(ExperimentType::A2KB, Matching::WeakAnnotationMatch)
            .await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, TaskId::new(2));
        assert_eq!(latest[0].result.as_ref().map(|r| r.micro_f1), Some(0.75));

        assert!(!store
            .connect_or_create(&config("a", "d"), &ExperimentId::new("e"))
            .await
            .is_reused());
    }
}
