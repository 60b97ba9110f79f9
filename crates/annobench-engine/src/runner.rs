//! Experiment runner - computes experiment tasks.
//!
//! For each task the runner asks the [`TaskStore`] for a reusable task. On a
//! miss it drives an [`InvocationGateway`] over every document of the
//! dataset, scores the predictions with the [`Evaluator`] and stores the
//! result. A hard gateway failure leaves the task in an error state.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use annobench_core::{
    Dataset, ExperimentId, ExperimentTaskConfiguration, ExperimentTaskResult, ExperimentType,
    Marking, Matching, TaskErrorKind, TaskId,
};

use crate::annotator::Annotator;
use crate::config::Config;
use crate::evaluator::Evaluator;
use crate::gateway::{GatewayError, InvocationGateway};
use crate::store::{ConnectOutcome, StoreError, TaskStore};

/// Runner errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Annotator '{0}' does not implement any call kind")]
    AnnotatorNotSupported(String),

    #[error("Runner is shutting down")]
    ShuttingDown,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}

impl RunnerError {
    /// Error kind a task aborted by this error is stored with.
    pub fn task_error_kind(&self) -> TaskErrorKind {
        match self {
            RunnerError::Gateway(err) => err.task_error_kind(),
            RunnerError::AnnotatorNotSupported(_) => TaskErrorKind::AnnotatorNotSupported,
            _ => TaskErrorKind::UnexpectedFailure,
        }
    }
}

/// One task of an experiment: an annotator benchmarked on a dataset.
#[derive(Clone)]
pub struct ExperimentTaskSpec {
    pub annotator: Arc<dyn Annotator>,
    pub dataset: Arc<Dataset>,
    pub experiment_type: ExperimentType,
    pub matching: Matching,
}

impl ExperimentTaskSpec {
    pub fn new(
        annotator: Arc<dyn Annotator>,
        dataset: Arc<Dataset>,
        experiment_type: ExperimentType,
        matching: Matching,
    ) -> Self {
        Self {
            annotator,
            dataset,
            experiment_type,
            matching,
        }
    }

    /// The cache key of this task.
    pub fn configuration(&self) -> ExperimentTaskConfiguration {
        ExperimentTaskConfiguration::new(
            self.annotator.name(),
            self.dataset.name.clone(),
            self.experiment_type,
            self.matching,
        )
    }
}

/// What happened to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// An existing task answers the configuration.
    Reused(TaskId),
    /// The task was computed by this run.
    Completed {
        task_id: TaskId,
        result: ExperimentTaskResult,
    },
}

impl TaskOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskOutcome::Reused(task_id) | TaskOutcome::Completed { task_id, .. } => *task_id,
        }
    }

    pub fn result(&self) -> Option<&ExperimentTaskResult> {
        match self {
            TaskOutcome::Completed { result, .. } => Some(result),
            TaskOutcome::Reused(_) => None,
        }
    }
}

/// Experiment runner.
#[derive(Clone)]
pub struct ExperimentRunner {
    store: Arc<TaskStore>,
    semaphore: Arc<Semaphore>,
}

impl ExperimentRunner {
    /// Create a new ExperimentRunner.
    pub fn new(store: Arc<TaskStore>, config: &Config) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Run every task of an experiment, at most `max_concurrent_tasks` at
    /// a time. Outcomes are returned in the order of `tasks`.
    pub async fn run_experiment(
        &self,
        experiment_id: &ExperimentId,
        tasks: Vec<ExperimentTaskSpec>,
    ) -> Vec<Result<TaskOutcome, RunnerError>> {
        info!(experiment_id = %experiment_id, tasks = tasks.len(), "Running experiment");

        let mut handles = Vec::with_capacity(tasks.len());
        for spec in tasks {
            let runner = self.clone();
            let experiment_id = experiment_id.clone();
            handles.push(tokio::spawn(async move {
                let _permit = runner
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| RunnerError::ShuttingDown)?;
                runner.run_task(&experiment_id, &spec).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(RunnerError::TaskPanicked(err.to_string())),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Reuse or compute a single task.
    pub async fn run_task(
        &self,
        experiment_id: &ExperimentId,
        spec: &ExperimentTaskSpec,
    ) -> Result<TaskOutcome, RunnerError> {
        let config = spec.configuration();
        let task_id = match self.store.connect_or_create(&config, experiment_id).await {
            ConnectOutcome::Reused(task_id) => {
                info!(task_id = %task_id, task = %config, "Task answered by cached result");
                return Ok(TaskOutcome::Reused(task_id));
            }
            ConnectOutcome::Created(task_id) => task_id,
        };

        // A panicking annotator must not leave the task running.
        let computation = {
            let runner = self.clone();
            let spec = spec.clone();
            tokio::spawn(async move { runner.compute(task_id, &spec).await })
        };
        let computed = match computation.await {
            Ok(computed) => computed,
            Err(err) => Err(RunnerError::TaskPanicked(err.to_string())),
        };

        match computed {
            Ok(result) => {
                self.store.set_task_result(task_id, result.clone()).await?;
                info!(
                    task_id = %task_id,
                    task = %config,
                    micro_f1 = result.micro_f1,
                    macro_f1 = result.macro_f1,
                    errors = result.error_count,
                    "Task finished"
                );
                Ok(TaskOutcome::Completed { task_id, result })
            }
            Err(err) => {
                let kind = err.task_error_kind();
                warn!(task_id = %task_id, task = %config, error = %err, "Task failed");
                if let Err(store_err) = self.store.fail_task(task_id, kind).await {
                    warn!(task_id = %task_id, error = %store_err, "Failed to record task error");
                }
                Err(err)
            }
        }
    }

    async fn compute(
        &self,
        task_id: TaskId,
        spec: &ExperimentTaskSpec,
    ) -> Result<ExperimentTaskResult, RunnerError> {
        let kind = spec.experiment_type.call_kind();
        let documents = &spec.dataset.documents;
        let gateway = InvocationGateway::new(spec.annotator.clone(), documents.len())
            .ok_or_else(|| RunnerError::AnnotatorNotSupported(spec.annotator.name().to_string()))?;
        if !gateway.capabilities().contains(kind) {
            return Err(GatewayError::Unsupported {
                annotator: gateway.name().to_string(),
                kind,
            }
            .into());
        }

        self.store.start_task(task_id).await?;
        debug!(
            task_id = %task_id,
            kind = %kind,
            documents = documents.len(),
            max_errors = gateway.max_errors(),
            "Task started"
        );

        let mut predictions: Vec<Vec<Marking>> = Vec::with_capacity(documents.len());
        for document in documents {
            let mentions = document.mentions();
            predictions.push(gateway.invoke(kind, &document.text, &mentions).await?);
        }

        let scores = Evaluator::new(spec.matching).evaluate(
            predictions
                .iter()
                .zip(documents)
                .map(|(predicted, document)| (predicted.as_slice(), document.gold.as_slice())),
        );
        Ok(scores.into_result(gateway.error_count()))
    }
}
