//! annobench engine
//!
//! Runs entity-annotation benchmarks: wraps annotation services in an
//! error-tolerant invocation gateway, deduplicates experiment tasks through
//! a task store and scores predictions against gold datasets.

pub mod annotator;
pub mod config;
pub mod evaluator;
pub mod gateway;
pub mod matching;
pub mod metrics;
pub mod replay;
pub mod runner;
pub mod store;

#[cfg(test)]
mod test_support;

pub use annotator::{Annotator, AnnotatorError};
pub use config::Config;
pub use evaluator::{EvaluationScores, Evaluator, MatchCounts, Prf};
pub use gateway::{GatewayError, InvocationGateway};
pub use replay::{RecordedAnnotator, ReplayAnnotator, ReplayFixture};
pub use runner::{ExperimentRunner, ExperimentTaskSpec, RunnerError, TaskOutcome};
pub use store::{
    ConnectOutcome, ExperimentStore, InMemoryExperimentStore, StoreError, TaskStateCounts,
    TaskStore,
};
