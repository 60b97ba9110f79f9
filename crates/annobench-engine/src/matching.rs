//! Matching predicates between a predicted and a gold marking.
//!
//! ```text
//! Gold:     [====New York====]
//! Strong:   [====New York====]        same span, same concept
//! Weak:         [==York City==]       overlapping span, same concept
//! ```
//!
//! Markings without a span (tags) only need equal concepts under every
//! policy.

use annobench_core::{Marking, Matching};

/// True if `predicted` matches `gold` under `matching`.
pub fn matches(matching: Matching, predicted: &Marking, gold: &Marking) -> bool {
    match matching {
        Matching::StrongAnnotationMatch => strong_match(predicted, gold),
        Matching::WeakAnnotationMatch => weak_match(predicted, gold),
    }
}

/// Same concept and, if both are anchored, exactly the same span.
pub fn strong_match(predicted: &Marking, gold: &Marking) -> bool {
    if predicted.concept() != gold.concept() {
        return false;
    }
    match (predicted.span(), gold.span()) {
        (Some(p), Some(g)) => p == g,
        _ => true,
    }
}

/// Same concept and, if both are anchored, overlapping or identical spans.
///
/// Identical empty spans do not overlap but still match.
pub fn weak_match(predicted: &Marking, gold: &Marking) -> bool {
    if predicted.concept() != gold.concept() {
        return false;
    }
    match (predicted.span(), gold.span()) {
        (Some(p), Some(g)) => p == g || p.overlaps(&g),
        _ => true,
    }
}
