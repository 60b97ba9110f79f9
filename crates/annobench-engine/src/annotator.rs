//! The annotation service seam.
//!
//! Clients of concrete annotation providers implement [`Annotator`]. Every
//! call kind has a default implementation reporting it as unsupported, so an
//! implementation only overrides the kinds it declares in
//! [`Annotator::capabilities`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use annobench_core::{AnnotatorCapabilities, CallKind, Marking, Mention};

/// Errors raised by an annotation service for a single call.
///
/// All of them are soft failures from the gateway's point of view.
#[derive(Debug, Error)]
pub enum AnnotatorError {
    /// The service could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with something that could not be understood.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// An external deadline expired before the service answered.
    #[error("Timeout waiting for the annotator")]
    Timeout,

    /// The call was cancelled by the caller.
    #[error("Call cancelled")]
    Cancelled,

    /// The service does not implement this call kind.
    #[error("Call kind {0} is not supported")]
    Unsupported(CallKind),

    /// Any other service-side failure.
    #[error("Annotator error: {0}")]
    Service(String),
}

/// An entity-annotation service.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Name the service is benchmarked under.
    fn name(&self) -> &str;

    /// Call kinds implemented natively.
    fn capabilities(&self) -> AnnotatorCapabilities;

    /// Duration of the most recent call, if the service tracks it.
    fn last_annotation_time(&self) -> Option<Duration> {
        None
    }

    /// C2W: classify a text to a set of concepts.
    async fn classify(&self, _text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        Err(AnnotatorError::Unsupported(CallKind::C2W))
    }

    /// D2W: link each given mention to a concept.
    async fn disambiguate(
        &self,
        _text: &str,
        _mentions: &[Mention],
    ) -> Result<Vec<Marking>, AnnotatorError> {
        Err(AnnotatorError::Unsupported(CallKind::D2W))
    }

    /// A2W: find mentions and link them to concepts.
    async fn annotate(&self, _text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        Err(AnnotatorError::Unsupported(CallKind::A2W))
    }

    /// Sc2W: classify a text to a set of scored concepts.
    async fn score_concepts(&self, _text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        Err(AnnotatorError::Unsupported(CallKind::Sc2W))
    }

    /// Sa2W: find mentions and link them to scored concepts.
    async fn score_annotate(&self, _text: &str) -> Result<Vec<Marking>, AnnotatorError> {
        Err(AnnotatorError::Unsupported(CallKind::Sa2W))
    }
}

/// Invoke the native operation of `annotator` for `kind`.
pub async fn dispatch(
    annotator: &dyn Annotator,
    kind: CallKind,
    text: &str,
    mentions: &[Mention],
) -> Result<Vec<Marking>, AnnotatorError> {
    match kind {
        CallKind::C2W => annotator.classify(text).await,
        CallKind::D2W => annotator.disambiguate(text, mentions).await,
        CallKind::A2W => annotator.annotate(text).await,
        CallKind::Sc2W => annotator.score_concepts(text).await,
        CallKind::Sa2W => annotator.score_annotate(text).await,
    }
}
