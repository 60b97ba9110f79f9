//! Markings produced by annotation services and found in gold standards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A character span inside a document text.
///
/// `position` and `length` are zero-based character offsets; the span covers
/// the half-open interval `[position, position + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub position: usize,
    pub length: usize,
}

impl Span {
    pub fn new(position: usize, length: usize) -> Self {
        Self { position, length }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    /// True if the half-open intervals of both spans intersect.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.position < other.end() && other.position < self.end()
    }
}

/// A mention handed to a disambiguation call: a span without a concept.
pub type Mention = Span;

/// A unit of extracted information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marking {
    /// A concept identified somewhere in the document.
    Tag { concept: String },

    /// A concept with a confidence score.
    ScoredTag { concept: String, score: f64 },

    /// A concept anchored to a span of the text.
    Annotation {
        position: usize,
        length: usize,
        concept: String,
    },

    /// A span-anchored concept with a confidence score.
    ScoredAnnotation {
        position: usize,
        length: usize,
        concept: String,
        score: f64,
    },
}

impl Marking {
    pub fn tag(concept: impl Into<String>) -> Self {
        Self::Tag {
            concept: concept.into(),
        }
    }

    pub fn scored_tag(concept: impl Into<String>, score: f64) -> Self {
        Self::ScoredTag {
            concept: concept.into(),
            score,
        }
    }

    pub fn annotation(position: usize, length: usize, concept: impl Into<String>) -> Self {
        Self::Annotation {
            position,
            length,
            concept: concept.into(),
        }
    }

    pub fn scored_annotation(
        position: usize,
        length: usize,
        concept: impl Into<String>,
        score: f64,
    ) -> Self {
        Self::ScoredAnnotation {
            position,
            length,
            concept: concept.into(),
            score,
        }
    }

    /// The knowledge-base identifier this marking points to.
    pub fn concept(&self) -> &str {
        match self {
            Self::Tag { concept }
            | Self::ScoredTag { concept, .. }
            | Self::Annotation { concept, .. }
            | Self::ScoredAnnotation { concept, .. } => concept,
        }
    }

    /// The span of the marking, if it is anchored to the text.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Annotation {
                position, length, ..
            }
            | Self::ScoredAnnotation {
                position, length, ..
            } => Some(Span::new(*position, *length)),
            Self::Tag { .. } | Self::ScoredTag { .. } => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Self::ScoredTag { score, .. } | Self::ScoredAnnotation { score, .. } => Some(*score),
            Self::Tag { .. } | Self::Annotation { .. } => None,
        }
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag { concept } => write!(f, "Tag(concept={concept})"),
            Self::ScoredTag { concept, score } => {
                write!(f, "ScoredTag(concept={concept},score={score})")
            }
            Self::Annotation {
                position,
                length,
                concept,
            } => write!(f, "Annotation(pos={position},len={length},concept={concept})"),
            Self::ScoredAnnotation {
                position,
                length,
                concept,
                score,
            } => write!(
                f,
                "ScoredAnnotation(pos={position},len={length},concept={concept},score={score})"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap_is_half_open() {
        let a = Span::new(0, 5);
        assert!(a.overlaps(&Span::new(4, 3)));
        assert!(!a.overlaps(&Span::new(5, 3)));
        assert!(Span::new(2, 1).overlaps(&a));
    }

    #[test]
    fn test_accessors() {
        let m = Marking::scored_annotation(3, 4, "dbr:Leipzig", 0.7);
        assert_eq!(m.concept(), "dbr:Leipzig");
        assert_eq!(m.span(), Some(Span::new(3, 4)));
        assert_eq!(m.score(), Some(0.7));
        assert_eq!(Marking::tag("dbr:Leipzig").span(), None);
    }

    #[test]
    fn test_display() {
        let m = Marking::annotation(0, 20, "dbr:Florence_May_Harding");
        assert_eq!(
            m.to_string(),
            "Annotation(pos=0,len=20,concept=dbr:Florence_May_Harding)"
        );
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&Marking::tag("x")).unwrap();
        assert_eq!(json, r#"{"type":"tag","concept":"x"}"#);
        let back: Marking =
            serde_json::from_str(r#"{"type":"annotation","position":1,"length":2,"concept":"c"}"#)
                .unwrap();
        assert_eq!(back, Marking::annotation(1, 2, "c"));
    }
}
