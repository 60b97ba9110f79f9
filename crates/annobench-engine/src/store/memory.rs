//! In-memory experiment store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use annobench_core::{
    ExperimentId, ExperimentTask, ExperimentTaskConfiguration, ExperimentTaskResult,
    ExperimentType, Matching, TaskErrorKind, TaskId, TaskState,
};

use super::{ConnectOutcome, ExperimentStore, StoreError};

#[derive(Default)]
struct StoreInner {
    tasks: BTreeMap<TaskId, ExperimentTask>,
    next_id: u64,
}

impl StoreInner {
    fn cached_task_id(
        &self,
        config: &ExperimentTaskConfiguration,
        durability: Duration,
        now: DateTime<Utc>,
    ) -> Option<TaskId> {
        self.tasks
            .values()
            .filter(|task| &task.config == config && !task.state.is_error())
            .max_by_key(|task| (task.last_changed, task.id))
            .filter(|task| task.is_reusable(now, durability))
            .map(|task| task.id)
    }

    fn create(
        &mut self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
    ) -> TaskId {
        self.next_id += 1;
        let id = TaskId::new(self.next_id);
        let task = ExperimentTask::new(id, config.clone()).with_experiment(experiment_id.clone());
        self.tasks.insert(id, task);
        id
    }

    fn task_mut(&mut self, task_id: TaskId) -> Result<&mut ExperimentTask, StoreError> {
        self.tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))
    }
}

/// Experiment store keeping all tasks in process memory.
///
/// Every operation runs under one lock, which makes lookup-or-create a
/// single critical section.
#[derive(Default)]
pub struct InMemoryExperimentStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `tasks`, as if restored from a
    /// previous process.
    pub fn with_tasks(tasks: impl IntoIterator<Item = ExperimentTask>) -> Self {
        let tasks: BTreeMap<TaskId, ExperimentTask> =
            tasks.into_iter().map(|task| (task.id, task)).collect();
        let next_id = tasks.keys().next_back().map_or(0, TaskId::value);
        Self {
            inner: RwLock::new(StoreInner { tasks, next_id }),
        }
    }

    /// Get the number of tasks.
    pub async fn task_count(&self) -> usize {
        self.inner.read().await.tasks.len()
    }
}

#[async_trait]
impl ExperimentStore for InMemoryExperimentStore {
    async fn get_cached_task_id(
        &self,
        config: &ExperimentTaskConfiguration,
        durability: Duration,
    ) -> Option<TaskId> {
        self.inner
            .read()
            .await
            .cached_task_id(config, durability, Utc::now())
    }

    async fn create_task(
        &self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
    ) -> TaskId {
        self.inner.write().await.create(config, experiment_id)
    }

    async fn connect_existing_task_with_experiment(
        &self,
        task_id: TaskId,
        experiment_id: &ExperimentId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.task_mut(task_id)?.connect(experiment_id.clone());
        Ok(())
    }

    async fn connect_cached_or_create(
        &self,
        config: &ExperimentTaskConfiguration,
        experiment_id: &ExperimentId,
        durability: Duration,
    ) -> ConnectOutcome {
        let mut inner = self.inner.write().await;
        match inner.cached_task_id(config, durability, Utc::now()) {
            Some(task_id) => {
                if let Some(task) = inner.tasks.get_mut(&task_id) {
                    task.connect(experiment_id.clone());
                }
                ConnectOutcome::Reused(task_id)
            }
            None => ConnectOutcome::Created(inner.create(config, experiment_id)),
        }
    }

    async fn set_running_tasks_to_error(&self) -> usize {
        let mut inner = self.inner.write().await;
        let mut swept = 0;
        for task in inner.tasks.values_mut() {
            if task.state.is_active()
                && task
                    .fail(TaskErrorKind::ServerStoppedWhileProcessing)
                    .is_ok()
            {
                swept += 1;
            }
        }
        swept
    }

    async fn set_task_state(&self, task_id: TaskId, state: TaskState) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.task_mut(task_id)?.transition(state)?;
        Ok(())
    }

    async fn set_task_result(
        &self,
        task_id: TaskId,
        result: ExperimentTaskResult,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.task_mut(task_id)?.finish(result)?;
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Option<ExperimentTask> {
        self.inner.read().await.tasks.get(&task_id).cloned()
    }

    async fn get_tasks_of_experiment(&self, experiment_id: &ExperimentId) -> Vec<ExperimentTask> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|task| task.experiments.contains(experiment_id))
            .cloned()
            .collect()
    }

    async fn list_tasks(&self) -> Vec<ExperimentTask> {
        self.inner.read().await.tasks.values().cloned().collect()
    }

    async fn annotator_dataset_combinations(
        &self,
        experiment_type: ExperimentType,
        matching: Matching,
    ) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        let combinations: BTreeSet<(String, String)> = inner
            .tasks
            .values()
            .filter(|task| {
                task.config.experiment_type == experiment_type && task.config.matching == matching
            })
            .map(|task| {
                (
                    task.config.annotator_name.clone(),
                    task.config.dataset_name.clone(),
                )
            })
            .collect();
        combinations.into_iter().collect()
    }

    async fn latest_finished_task(
        &self,
        config: &ExperimentTaskConfiguration,
    ) -> Option<ExperimentTask> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|task| &task.config == config && task.state == TaskState::Finished)
            .max_by_key(|task| (task.last_changed, task.id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(annotator: &str) -> ExperimentTaskConfiguration {
        ExperimentTaskConfiguration::new(
            annotator,
            "KORE50",
            ExperimentType::A2KB,
            Matching::WeakAnnotationMatch,
        )
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryExperimentStore::new();
        let exp = ExperimentId::new("e1");
        let first = store.create_task(&config("a"), &exp).await;
        let second = store.create_task(&config("a"), &exp).await;
        assert!(second > first);
        assert_eq!(store.task_count().await, 2);
    }

    #[tokio::test]
    async fn test_cached_lookup_skips_error_tasks() {
        let store = InMemoryExperimentStore::new();
        let exp = ExperimentId::new("e1");
        let id = store.create_task(&config("a"), &exp).await;
        assert_eq!(
            store.get_cached_task_id(&config("a"), Duration::hours(1)).await,
            Some(id)
        );
        store
            .set_task_state(id, TaskState::Error(TaskErrorKind::UnexpectedFailure))
            .await
            .unwrap();
        assert_eq!(
            store.get_cached_task_id(&config("a"), Duration::hours(1)).await,
            None
        );
        assert_eq!(
            store.get_cached_task_id(&config("b"), Duration::hours(1)).await,
            None
        );
    }

    #[tokio::test]
    async fn test_expired_tasks_are_not_cached() {
        let mut old = ExperimentTask::new(TaskId::new(7), config("a"));
        old.state = TaskState::Finished;
        old.last_changed = Utc::now() - Duration::days(2);
        let store = InMemoryExperimentStore::with_tasks([old]);

        assert_eq!(
            store.get_cached_task_id(&config("a"), Duration::days(1)).await,
            None
        );
        assert_eq!(
            store.get_cached_task_id(&config("a"), Duration::days(3)).await,
            Some(TaskId::new(7))
        );

        let exp = ExperimentId::new("e1");
        let outcome = store
            .connect_cached_or_create(&config("a"), &exp, Duration::days(1))
            .await;
        assert_eq!(outcome, ConnectOutcome::Created(TaskId::new(8)));
    }

    #[tokio::test]
    async fn test_connect_unknown_task_fails() {
        let store = InMemoryExperimentStore::new();
        let result = store
            .connect_existing_task_with_experiment(TaskId::new(99), &ExperimentId::new("e"))
            .await;
        assert!(matches!(result, Err(StoreError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_only_touches_active_tasks() {
        let mut running = ExperimentTask::new(TaskId::new(1), config("a"));
        running.start().unwrap();
        let pending = ExperimentTask::new(TaskId::new(2), config("b"));
        let mut finished = ExperimentTask::new(TaskId::new(3), config("c"));
        finished.state = TaskState::Finished;

        let store = InMemoryExperimentStore::with_tasks([running, pending, finished]);
        assert_eq!(store.set_running_tasks_to_error().await, 2);

        let error = TaskState::Error(TaskErrorKind::ServerStoppedWhileProcessing);
        assert_eq!(store.get_task(TaskId::new(1)).await.unwrap().state, error);
        assert_eq!(store.get_task(TaskId::new(2)).await.unwrap().state, error);
        assert_eq!(
            store.get_task(TaskId::new(3)).await.unwrap().state,
            TaskState::Finished
        );
    }

    #[tokio::test]
    async fn test_combinations_are_unique_and_sorted() {
        let store = InMemoryExperimentStore::new();
        let exp = ExperimentId::new("e1");
        store.create_task(&config("b"), &exp).await;
        store.create_task(&config("a"), &exp).await;
        store.create_task(&config("b"), &exp).await;
        let combinations = store
            .annotator_dataset_combinations(ExperimentType::A2KB, Matching::WeakAnnotationMatch)
            .await;
        assert_eq!(
            combinations,
            vec![
                ("a".to_string(), "KORE50".to_string()),
                ("b".to_string(), "KORE50".to_string())
            ]
        );
        assert!(store
            .annotator_dataset_combinations(ExperimentType::C2KB, Matching::WeakAnnotationMatch)
            .await
            .is_empty());
    }
}
