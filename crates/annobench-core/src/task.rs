//! Experiment tasks and their results.

use crate::{CoreError, ExperimentId, ExperimentTaskConfiguration, TaskErrorKind, TaskId, TaskState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Scores of a finished experiment task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentTaskResult {
    pub micro_precision: f64,
    pub micro_recall: f64,
    pub micro_f1: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,

    /// Number of annotator calls that failed and were absorbed.
    pub error_count: usize,

    /// State the task ended in.
    pub state: TaskState,

    /// When the result was computed.
    pub timestamp: DateTime<Utc>,
}

impl ExperimentTaskResult {
    /// Result vector in the order downstream consumers expect:
    /// `[microP, microR, microF1, macroP, macroR, macroF1, errorCount]`.
    pub fn to_vector(&self) -> [f64; 7] {
        [
            self.micro_precision,
            self.micro_recall,
            self.micro_f1,
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.error_count as f64,
        ]
    }
}

/// A cached experiment task as kept by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentTask {
    /// Unique task identifier.
    pub id: TaskId,

    /// The key this task answers.
    pub config: ExperimentTaskConfiguration,

    /// Current task state.
    pub state: TaskState,

    /// Result, present once the task finished.
    pub result: Option<ExperimentTaskResult>,

    /// Experiments that use this task, in connection order.
    pub experiments: Vec<ExperimentId>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the state or result last changed.
    pub last_changed: DateTime<Utc>,
}

impl ExperimentTask {
    /// Create a new pending task.
    pub fn new(id: TaskId, config: ExperimentTaskConfiguration) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            state: TaskState::Pending,
            result: None,
            experiments: Vec::new(),
            created_at: now,
            last_changed: now,
        }
    }

    /// Builder method to connect an experiment.
    pub fn with_experiment(mut self, experiment_id: ExperimentId) -> Self {
        self.connect(experiment_id);
        self
    }

    /// Connect an experiment to this task.
    pub fn connect(&mut self, experiment_id: ExperimentId) {
        if !self.experiments.contains(&experiment_id) {
            self.experiments.push(experiment_id);
        }
    }

    /// True if the task is older than `durability`.
    pub fn is_expired(&self, now: DateTime<Utc>, durability: Duration) -> bool {
        now - self.last_changed > durability
    }

    /// True if the task may answer a lookup for its key.
    pub fn is_reusable(&self, now: DateTime<Utc>, durability: Duration) -> bool {
        !self.state.is_error() && !self.is_expired(now, durability)
    }

    /// Mark the task as running.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(TaskState::Running)
    }

    /// Store the result and mark the task finished.
    pub fn finish(&mut self, mut result: ExperimentTaskResult) -> Result<(), CoreError> {
        self.transition(TaskState::Finished)?;
        result.state = TaskState::Finished;
        self.result = Some(result);
        Ok(())
    }

    /// Mark the task as failed.
    pub fn fail(&mut self, kind: TaskErrorKind) -> Result<(), CoreError> {
        self.transition(TaskState::Error(kind))
    }

    /// Move to `next`, refusing to leave a terminal state.
    pub fn transition(&mut self, next: TaskState) -> Result<(), CoreError> {
        let allowed = match (self.state, next) {
            (TaskState::Pending, _) => next != TaskState::Pending,
            (TaskState::Running, TaskState::Finished | TaskState::Error(_)) => true,
            _ => false,
        };
        if !allowed {
            return Err(CoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.last_changed = Utc::now();
        Ok(())
    }
}
