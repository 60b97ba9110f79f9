//! Replay annotator - answers from recorded service output.
//!
//! A [`ReplayFixture`] bundles a gold dataset with the recorded output of
//! one or more annotators, keyed by document URI. This allows benchmarking
//! service output offline and drives the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use annobench_core::{AnnotatorCapabilities, Dataset, ExperimentType, Marking, Matching, Mention};

use crate::annotator::{Annotator, AnnotatorError};
use crate::runner::ExperimentTaskSpec;

/// Annotator returning pre-recorded markings for known texts.
///
/// Unknown texts yield an empty result. Texts marked as failing raise an
/// [`AnnotatorError::Service`] error.
pub struct ReplayAnnotator {
    name: String,
    capabilities: AnnotatorCapabilities,
    responses: HashMap<String, Vec<Marking>>,
    failing: HashSet<String>,
    fail_all: bool,
    calls: AtomicUsize,
    last_call: Mutex<Option<Duration>>,
}

impl ReplayAnnotator {
    pub fn new(name: impl Into<String>, capabilities: AnnotatorCapabilities) -> Self {
        Self {
            name: name.into(),
            capabilities,
            responses: HashMap::new(),
            failing: HashSet::new(),
            fail_all: false,
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        }
    }

    /// Build an annotator from a recording. URIs are resolved against the
    /// documents of `dataset`.
    pub fn from_recording(recording: &RecordedAnnotator, dataset: &Dataset) -> Self {
        let texts: HashMap<&str, &str> = dataset
            .documents
            .iter()
            .map(|d| (d.uri.as_str(), d.text.as_str()))
            .collect();

        let mut annotator = Self::new(recording.name.clone(), recording.capabilities);
        annotator.fail_all = recording.fail_all;
        for (uri, markings) in &recording.responses {
            match texts.get(uri.as_str()) {
                Some(text) => annotator = annotator.with_response(*text, markings.clone()),
                None => warn!(
                    annotator = %recording.name,
                    uri = %uri,
                    "Recorded response for unknown document"
                ),
            }
        }
        for uri in &recording.failing_documents {
            match texts.get(uri.as_str()) {
                Some(text) => annotator = annotator.failing_on(*text),
                None => warn!(
                    annotator = %recording.name,
                    uri = %uri,
                    "Failing document is not part of the dataset"
                ),
            }
        }
        annotator
    }

    /// Builder method to record the answer for `text`.
    pub fn with_response(mut self, text: impl Into<String>, markings: Vec<Marking>) -> Self {
        self.responses.insert(text.into(), markings);
        self
    }

    /// Builder method to fail every call for `text`.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.failing.insert(text.into());
        self
    }

    /// Builder method to fail every call.
    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = if self.fail_all || self.failing.contains(text) {
            Err(AnnotatorError::Service(format!(
                "recorded failure of '{}'",
                self.name
            )))
        } else {
            Ok(self.responses.get(text).cloned().unwrap_or_default())
        };
        if let Ok(mut last_call) = self.last_call.lock() {
            *last_call = Some(started.elapsed());
        }
        response
    }
}

#[async_trait]
impl Annotator for ReplayAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> AnnotatorCapabilities {
        self.capabilities
    }

    fn last_annotation_time(&self) -> Option<Duration> {
        self.last_call.lock().ok().and_then(|last_call| *last_call)
    }

    async fn classify(&self, text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        self.respond(text)
    }

    async fn disambiguate(
        &self,
        text: &str,
        _mentions: &[Mention],
    ) -> Result<Vec<Marking>, AnnotatorError> {
        self.respond(text)
    }

    async fn annotate(&self, text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        self.respond(text)
    }

    async fn score_concepts(&self, text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        self.respond(text)
    }

    async fn score_annotate(&self, text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        self.respond(text)
    }
}

/// Recorded output of one annotator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedAnnotator {
    pub name: String,

    /// Natively implemented call kinds, e.g. `["Sa2W"]`.
    pub capabilities: AnnotatorCapabilities,

    /// Markings per document URI.
    #[serde(default)]
    pub responses: HashMap<String, Vec<Marking>>,

    /// URIs of documents the annotator failed on.
    #[serde(default)]
    pub failing_documents: Vec<String>,

    #[serde(default)]
    pub fail_all: bool,
}

/// A dataset with recorded annotator output, as read by `annobench run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFixture {
    pub experiment_type: ExperimentType,

    #[serde(default)]
    pub matching: Matching,

    pub dataset: Dataset,

    pub annotators: Vec<RecordedAnnotator>,
}

impl ReplayFixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// One experiment task per recorded annotator.
    pub fn task_specs(&self) -> Vec<ExperimentTaskSpec> {
        let dataset = Arc::new(self.dataset.clone());
        self.annotators
            .iter()
            .map(|recording| {
                ExperimentTaskSpec::new(
                    Arc::new(ReplayAnnotator::from_recording(recording, &dataset)),
                    dataset.clone(),
                    self.experiment_type,
                    self.matching,
                )
            })
            .collect()
    }
}
