//! annobench Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network clients of annotation services
//! - Storage engines
//! - Runtime specifics
//!
//! All types here describe what an entity-annotation benchmark is made of:
//! markings, documents, call kinds, experiment keys and task results.

pub mod capability;
pub mod document;
pub mod error;
pub mod experiment;
pub mod ids;
pub mod marking;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use capability::{reduce, AnnotatorCapabilities, CallKind};
pub use document::{Dataset, Document};
pub use error::CoreError;
pub use experiment::{ExperimentTaskConfiguration, ExperimentType, Matching};
pub use ids::{ExperimentId, TaskId};
pub use marking::{Marking, Mention, Span};
pub use status::{TaskErrorKind, TaskState};
pub use task::{ExperimentTask, ExperimentTaskResult};
