//! Status of experiment tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a task ended in the error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskErrorKind {
    /// The task was running when the process stopped.
    ServerStoppedWhileProcessing,
    /// The annotator failed on more calls than tolerated.
    TooManyAnnotatorErrors,
    /// The annotator implements none of the call kinds.
    AnnotatorNotSupported,
    /// Anything else that aborted the task.
    UnexpectedFailure,
}

impl TaskErrorKind {
    /// Human-readable description, stored alongside the task.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ServerStoppedWhileProcessing => "server stopped while processing",
            Self::TooManyAnnotatorErrors => "the annotator caused too many errors",
            Self::AnnotatorNotSupported => "the annotator does not support any known call kind",
            Self::UnexpectedFailure => "unexpected failure",
        }
    }
}

/// State of an experiment task in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task row created, computation not started yet.
    #[default]
    Pending,
    /// Computation in progress.
    Running,
    /// Result computed and stored.
    Finished,
    /// Task abandoned.
    Error(TaskErrorKind),
}

impl TaskState {
    /// Returns true if the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error(_))
    }

    /// Returns true if the task is still being worked on.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(kind) => write!(f, "error ({})", kind.description()),
            other => f.write_str(other.label()),
        }
    }
}
