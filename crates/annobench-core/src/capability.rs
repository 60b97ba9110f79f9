//! Call kinds, capability sets and capability reduction.
//!
//! The five call kinds form a lattice: a service that can answer a wider
//! kind can answer every narrower kind by mechanically reducing its output.
//!
//! ```text
//!            Sa2W
//!           /    \
//!        Sc2W    A2W
//!           \   /   \
//!            C2W    D2W
//! ```

use crate::error::CoreError;
use crate::marking::{Marking, Mention};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One kind of call an annotation service can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CallKind {
    /// Classify a text to a set of concepts.
    C2W,
    /// Disambiguate a set of given mentions.
    D2W,
    /// Annotate a text with span-anchored concepts.
    A2W,
    /// Classify a text to a set of scored concepts.
    Sc2W,
    /// Annotate a text with scored span-anchored concepts.
    Sa2W,
}

impl CallKind {
    /// All call kinds, widest first.
    pub const ALL: [CallKind; 5] = [
        CallKind::Sa2W,
        CallKind::A2W,
        CallKind::Sc2W,
        CallKind::D2W,
        CallKind::C2W,
    ];

    fn bit(self) -> u8 {
        match self {
            CallKind::C2W => 1,
            CallKind::D2W => 1 << 1,
            CallKind::A2W => 1 << 2,
            CallKind::Sc2W => 1 << 3,
            CallKind::Sa2W => 1 << 4,
        }
    }

    /// Call kinds whose output can be reduced to this one's, widest first.
    pub fn reducible_from(self) -> &'static [CallKind] {
        match self {
            CallKind::Sa2W => &[],
            CallKind::A2W | CallKind::Sc2W => &[CallKind::Sa2W],
            CallKind::D2W => &[CallKind::Sa2W, CallKind::A2W],
            CallKind::C2W => &[CallKind::Sa2W, CallKind::A2W, CallKind::Sc2W],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallKind::C2W => "C2W",
            CallKind::D2W => "D2W",
            CallKind::A2W => "A2W",
            CallKind::Sc2W => "Sc2W",
            CallKind::Sa2W => "Sa2W",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CallKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownCallKind(s.to_string()))
    }
}

/// The set of call kinds an annotation service implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AnnotatorCapabilities(u8);

impl AnnotatorCapabilities {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(kinds: &[CallKind]) -> Self {
        kinds.iter().fold(Self::empty(), |caps, kind| caps.with(*kind))
    }

    /// Builder method to add a call kind.
    pub fn with(self, kind: CallKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn contains(&self, kind: CallKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Every call kind answerable natively or by reduction.
    pub fn closure(&self) -> Self {
        CallKind::ALL
            .into_iter()
            .filter(|kind| self.source_for(*kind).is_some())
            .fold(Self::empty(), |caps, kind| caps.with(kind))
    }

    /// The native call kind to invoke when `requested` is asked for.
    ///
    /// A natively supported kind is invoked directly; otherwise the widest
    /// supported kind that reduces to `requested` is chosen.
    pub fn source_for(&self, requested: CallKind) -> Option<CallKind> {
        if self.contains(requested) {
            return Some(requested);
        }
        requested
            .reducible_from()
            .iter()
            .copied()
            .find(|kind| self.contains(*kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = CallKind> + '_ {
        CallKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl fmt::Display for AnnotatorCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|k| k.name()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

impl Serialize for AnnotatorCapabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for AnnotatorCapabilities {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<CallKind>::deserialize(deserializer)?;
        Ok(Self::of(&kinds))
    }
}

/// Reduce markings produced by a wider call kind to the shape of `target`.
///
/// Markings that lack the fields `target` needs are dropped. The output
/// keeps the order in which concepts or spans first appear.
///
/// - `Sa2W`: only scored annotations survive.
/// - `Sc2W`: one scored tag per concept, carrying the highest score seen.
/// - `A2W`: scores are dropped from annotations.
/// - `D2W`: one annotation per mention whose span equals the mention,
///   preferring the highest-scored candidate.
/// - `C2W`: one tag per concept.
pub fn reduce(target: CallKind, markings: Vec<Marking>, mentions: &[Mention]) -> Vec<Marking> {
    match target {
        CallKind::Sa2W => markings
            .into_iter()
            .filter(|m| matches!(m, Marking::ScoredAnnotation { .. }))
            .collect(),
        CallKind::Sc2W => to_scored_tags(markings),
        CallKind::A2W => markings.into_iter().filter_map(to_annotation).collect(),
        CallKind::D2W => to_disambiguation(markings, mentions),
        CallKind::C2W => to_tags(markings),
    }
}

fn to_annotation(marking: Marking) -> Option<Marking> {
    match marking {
        Marking::Annotation { .. } => Some(marking),
        Marking::ScoredAnnotation {
            position,
            length,
            concept,
            ..
        } => Some(Marking::Annotation {
            position,
            length,
            concept,
        }),
        Marking::Tag { .. } | Marking::ScoredTag { .. } => None,
    }
}

fn to_tags(markings: Vec<Marking>) -> Vec<Marking> {
    let mut seen = std::collections::HashSet::new();
    markings
        .into_iter()
        .filter_map(|m| {
            let concept = m.concept().to_string();
            seen.insert(concept.clone()).then(|| Marking::Tag { concept })
        })
        .collect()
}

fn to_scored_tags(markings: Vec<Marking>) -> Vec<Marking> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, f64> = HashMap::new();
    for marking in markings {
        let Some(score) = marking.score() else {
            continue;
        };
        let concept = marking.concept().to_string();
        match best.get_mut(&concept) {
            Some(current) => {
                if score > *current {
                    *current = score;
                }
            }
            None => {
                order.push(concept.clone());
                best.insert(concept, score);
            }
        }
    }
    order
        .into_iter()
        .map(|concept| {
            let score = best.get(&concept).copied().unwrap_or_default();
            Marking::ScoredTag { concept, score }
        })
        .collect()
}

fn to_disambiguation(markings: Vec<Marking>, mentions: &[Mention]) -> Vec<Marking> {
    let mut chosen: Vec<(Mention, f64, Marking)> = Vec::new();
    for marking in markings {
        let Some(span) = marking.span() else {
            continue;
        };
        if !mentions.contains(&span) {
            continue;
        }
        let score = marking.score().unwrap_or(f64::NEG_INFINITY);
        let Some(annotation) = to_annotation(marking) else {
            continue;
        };
        match chosen.iter_mut().find(|(mention, _, _)| *mention == span) {
            Some(entry) => {
                if score > entry.1 {
                    entry.1 = score;
                    entry.2 = annotation;
                }
            }
            None => chosen.push((span, score, annotation)),
        }
    }
    chosen.into_iter().map(|(_, _, annotation)| annotation).collect()
}
