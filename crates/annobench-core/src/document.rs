//! Documents and datasets.

use crate::marking::{Marking, Mention};
use serde::{Deserialize, Serialize};

/// A document of a gold-standard dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document URI.
    pub uri: String,

    /// Source text the markings point into.
    pub text: String,

    /// Gold-standard markings. Their order carries no meaning.
    #[serde(default)]
    pub gold: Vec<Marking>,
}

impl Document {
    pub fn new(uri: impl Into<String>, text: impl Into<String>, gold: Vec<Marking>) -> Self {
        Self {
            uri: uri.into(),
            text: text.into(),
            gold,
        }
    }

    /// Spans of all span-anchored gold markings, used as input for
    /// disambiguation calls.
    pub fn mentions(&self) -> Vec<Mention> {
        let mut mentions: Vec<Mention> = self.gold.iter().filter_map(Marking::span).collect();
        mentions.sort();
        mentions.dedup();
        mentions
    }
}

/// An ordered, named sequence of documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub documents: Vec<Document>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marking::Span;

    #[test]
    fn test_mentions_are_sorted_and_unique() {
        let doc = Document::new(
            "doc-1",
            "Leipzig and Berlin",
            vec![
                Marking::annotation(12, 6, "dbr:Berlin"),
                Marking::annotation(0, 7, "dbr:Leipzig"),
                Marking::annotation(0, 7, "dbr:Leipzig_(band)"),
                Marking::tag("dbr:Germany"),
            ],
        );
        assert_eq!(doc.mentions(), vec![Span::new(0, 7), Span::new(12, 6)]);
    }
}
