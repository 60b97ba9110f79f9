//! Error-tolerant invocation gateway around an annotation service.
//!
//! A gateway absorbs failed calls: the failing document contributes no
//! predicted markings and the error is counted. Once more than
//! `ceil(0.25 * expected_calls)` calls have failed, the gateway is exhausted
//! and every call fails hard with [`GatewayError::TooManyErrors`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, Level};

use annobench_core::{reduce, AnnotatorCapabilities, CallKind, Marking, Mention, TaskErrorKind};

use crate::annotator::{dispatch, Annotator, AnnotatorError};

/// Share of expected calls that may fail before a task is abandoned.
pub const TOLERATED_ERROR_RATIO: f64 = 0.25;

/// Maximum number of absorbed errors for `expected_calls` calls.
pub fn max_errors_for(expected_calls: usize) -> usize {
    (TOLERATED_ERROR_RATIO * expected_calls as f64).ceil() as usize
}

/// Hard gateway failures. These abort the whole task.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Saw too many errors (maximum was set to {max_errors})")]
    TooManyErrors { max_errors: usize },

    #[error("Annotator '{annotator}' cannot answer {kind} calls")]
    Unsupported { annotator: String, kind: CallKind },
}

impl GatewayError {
    /// Error kind a task aborted by this failure is stored with.
    pub fn task_error_kind(&self) -> TaskErrorKind {
        match self {
            Self::TooManyErrors { .. } => TaskErrorKind::TooManyAnnotatorErrors,
            Self::Unsupported { .. } => TaskErrorKind::AnnotatorNotSupported,
        }
    }
}

/// Gateway wrapping one annotation service for one task.
pub struct InvocationGateway {
    annotator: Arc<dyn Annotator>,
    native: AnnotatorCapabilities,
    supported: AnnotatorCapabilities,
    max_errors: usize,
    errors: AtomicUsize,
}

impl InvocationGateway {
    /// Wrap `annotator`, expecting `expected_calls` calls.
    ///
    /// Returns `None` if the annotator implements none of the call kinds.
    pub fn new(annotator: Arc<dyn Annotator>, expected_calls: usize) -> Option<Self> {
        let native = annotator.capabilities();
        if native.is_empty() {
            return None;
        }
        Some(Self {
            supported: native.closure(),
            native,
            annotator,
            max_errors: max_errors_for(expected_calls),
            errors: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        self.annotator.name()
    }

    pub fn last_annotation_time(&self) -> Option<Duration> {
        self.annotator.last_annotation_time()
    }

    /// Call kinds this gateway answers, natively or by reduction.
    pub fn capabilities(&self) -> AnnotatorCapabilities {
        self.supported
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Number of failed calls seen so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    /// True once the error budget is spent. There is no way back.
    pub fn is_exhausted(&self) -> bool {
        self.error_count() > self.max_errors
    }

    pub async fn classify(&self, text: &str) -> Result<Vec<Marking>, GatewayError> {
        self.invoke(CallKind::C2W, text, &[]).await
    }

    pub async fn disambiguate(
        &self,
        text: &str,
        mentions: &[Mention],
    ) -> Result<Vec<Marking>, GatewayError> {
        self.invoke(CallKind::D2W, text, mentions).await
    }

    pub async fn annotate(&self, text: &str) -> Result<Vec<Marking>, GatewayError> {
        self.invoke(CallKind::A2W, text, &[]).await
    }

    pub async fn score_concepts(&self, text: &str) -> Result<Vec<Marking>, GatewayError> {
        self.invoke(CallKind::Sc2W, text, &[]).await
    }

    pub async fn score_annotate(&self, text: &str) -> Result<Vec<Marking>, GatewayError> {
        self.invoke(CallKind::Sa2W, text, &[]).await
    }

    /// Answer a `kind` call, reducing the output of a wider native kind
    /// when `kind` is not implemented natively.
    pub async fn invoke(
        &self,
        kind: CallKind,
        text: &str,
        mentions: &[Mention],
    ) -> Result<Vec<Marking>, GatewayError> {
        if self.is_exhausted() {
            return Err(GatewayError::TooManyErrors {
                max_errors: self.max_errors,
            });
        }
        let source = self
            .native
            .source_for(kind)
            .ok_or_else(|| GatewayError::Unsupported {
                annotator: self.name().to_string(),
                kind,
            })?;

        match dispatch(self.annotator.as_ref(), source, text, mentions).await {
            Ok(markings) => {
                let markings = reduce(kind, markings, mentions);
                self.trace_result(kind, source, &markings);
                Ok(markings)
            }
            Err(err) => self.absorb(err),
        }
    }

    fn absorb(&self, err: AnnotatorError) -> Result<Vec<Marking>, GatewayError> {
        let previous = self.errors.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            error!(annotator = %self.name(), error = ?err, "Got an error from the annotator");
        } else {
            error!(annotator = %self.name(), error = %err, "Got an error from the annotator");
        }
        if previous + 1 > self.max_errors {
            return Err(GatewayError::TooManyErrors {
                max_errors: self.max_errors,
            });
        }
        Ok(Vec::new())
    }

    fn trace_result(&self, kind: CallKind, source: CallKind, markings: &[Marking]) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        let rendered: Vec<String> = markings.iter().map(ToString::to_string).collect();
        debug!(
            annotator = %self.name(),
            kind = %kind,
            source = %source,
            result = %format!("[{}]", rendered.join(",")),
            "Annotator result"
        );
    }
}
