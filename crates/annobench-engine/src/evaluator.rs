//! Scoring of predicted markings against gold markings.
//!
//! Per document, predicted and gold markings are paired one-to-one with a
//! maximum assignment over all pairs the matching policy accepts. Paired
//! markings are true positives; unpaired predictions are false positives and
//! unpaired gold markings are false negatives.
//!
//! Across documents two aggregates are reported:
//! - micro: counts are summed first, then scored.
//! - macro: every document is scored, then scores are averaged. Documents
//!   without any gold or predicted marking are left out.
//!
//! Every ratio with a zero denominator is 0.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use annobench_core::{ExperimentTaskResult, Marking, Matching, TaskState};

use crate::matching::matches;

/// True positive, false positive and false negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl MatchCounts {
    pub fn add(&mut self, other: MatchCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }

    /// True if neither gold nor predicted markings were involved.
    pub fn is_empty(&self) -> bool {
        self.true_positives + self.false_positives + self.false_negatives == 0
    }
}

/// Precision, recall and F1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Prf {
    pub fn from_counts(counts: &MatchCounts) -> Self {
        let tp = counts.true_positives as f64;
        let precision = ratio(tp, tp + counts.false_positives as f64);
        let recall = ratio(tp, tp + counts.false_negatives as f64);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Aggregated scores of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub micro: Prf,
    pub macro_avg: Prf,
    /// Counts summed over all documents.
    pub counts: MatchCounts,
    /// Documents that entered the macro average.
    pub macro_documents: usize,
}

impl EvaluationScores {
    /// Turn the scores into a task result.
    pub fn into_result(self, error_count: usize) -> ExperimentTaskResult {
        ExperimentTaskResult {
            micro_precision: self.micro.precision,
            micro_recall: self.micro.recall,
            micro_f1: self.micro.f1,
            macro_precision: self.macro_avg.precision,
            macro_recall: self.macro_avg.recall,
            macro_f1: self.macro_avg.f1,
            error_count,
            state: TaskState::Finished,
            timestamp: Utc::now(),
        }
    }
}

/// Evaluator for one matching policy.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    matching: Matching,
}

impl Evaluator {
    pub fn new(matching: Matching) -> Self {
        Self { matching }
    }

    pub fn matching(&self) -> Matching {
        self.matching
    }

    /// Count matches of a single document.
    pub fn evaluate_document(&self, predicted: &[Marking], gold: &[Marking]) -> MatchCounts {
        let true_positives = assign(predicted, gold, self.matching).len();
        MatchCounts {
            true_positives,
            false_positives: predicted.len() - true_positives,
            false_negatives: gold.len() - true_positives,
        }
    }

    /// Score a dataset given as `(predicted, gold)` pairs per document.
    pub fn evaluate<'a, I>(&self, documents: I) -> EvaluationScores
    where
        I: IntoIterator<Item = (&'a [Marking], &'a [Marking])>,
    {
        let mut total = MatchCounts::default();
        let mut macro_sum = Prf::default();
        let mut macro_documents = 0usize;

        for (predicted, gold) in documents {
            let counts = self.evaluate_document(predicted, gold);
            total.add(counts);
            if counts.is_empty() {
                continue;
            }
            let scores = Prf::from_counts(&counts);
            macro_sum.precision += scores.precision;
            macro_sum.recall += scores.recall;
            macro_sum.f1 += scores.f1;
            macro_documents += 1;
        }

        let macro_avg = if macro_documents > 0 {
            let n = macro_documents as f64;
            Prf {
                precision: macro_sum.precision / n,
                recall: macro_sum.recall / n,
                f1: macro_sum.f1 / n,
            }
        } else {
            Prf::default()
        };

        EvaluationScores {
            micro: Prf::from_counts(&total),
            macro_avg,
            counts: total,
            macro_documents,
        }
    }
}

/// Preference order of a candidate pair: smallest offset difference, then
/// earliest gold marking, then smallest concept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PairKey<'a> {
    offset_difference: usize,
    gold_position: usize,
    concept: &'a str,
    gold_index: usize,
}

fn pair_key<'a>(predicted: &Marking, gold: &'a Marking, gold_index: usize) -> PairKey<'a> {
    let (offset_difference, gold_position) = match (predicted.span(), gold.span()) {
        (Some(p), Some(g)) => (p.position.abs_diff(g.position), g.position),
        (None, Some(g)) => (0, g.position),
        _ => (0, 0),
    };
    PairKey {
        offset_difference,
        gold_position,
        concept: gold.concept(),
        gold_index,
    }
}

/// Maximum one-to-one assignment of predicted to gold markings.
///
/// Returns `(predicted_index, gold_index)` pairs sorted by predicted index.
/// The result only depends on the order of the inputs, never on hashing.
pub fn assign(predicted: &[Marking], gold: &[Marking], matching: Matching) -> Vec<(usize, usize)> {
    let candidates: Vec<Vec<(PairKey<'_>, usize)>> = predicted
        .iter()
        .map(|p| {
            let mut eligible: Vec<(PairKey<'_>, usize)> = gold
                .iter()
                .enumerate()
                .filter(|(_, g)| matches(matching, p, g))
                .map(|(gi, g)| (pair_key(p, g, gi), gi))
                .collect();
            eligible.sort();
            eligible
        })
        .collect();

    let mut order: Vec<usize> = (0..predicted.len())
        .filter(|&pi| !candidates[pi].is_empty())
        .collect();
    order.sort_by(|&a, &b| candidates[a][0].0.cmp(&candidates[b][0].0).then(a.cmp(&b)));

    let adjacency: Vec<Vec<usize>> = candidates
        .iter()
        .map(|eligible| eligible.iter().map(|(_, gi)| *gi).collect())
        .collect();

    let mut owner: Vec<Option<usize>> = vec![None; gold.len()];
    for pi in order {
        let mut visited = vec![false; gold.len()];
        augment(pi, &adjacency, &mut owner, &mut visited);
    }

    let mut pairs: Vec<(usize, usize)> = owner
        .iter()
        .enumerate()
        .filter_map(|(gi, pi)| pi.map(|pi| (pi, gi)))
        .collect();
    pairs.sort_unstable();
    pairs
}

// Kuhn's augmenting path search. The most preferred free gold marking is
// taken before any assigned one is reclaimed.
fn augment(
    pi: usize,
    adjacency: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    if let Some(&gi) = adjacency[pi]
        .iter()
        .find(|&&gi| !visited[gi] && owner[gi].is_none())
    {
        visited[gi] = true;
        owner[gi] = Some(pi);
        return true;
    }
    for &gi in &adjacency[pi] {
        if visited[gi] {
            continue;
        }
        visited[gi] = true;
        let free = match owner[gi] {
            None => true,
            Some(other) => augment(other, adjacency, owner, visited),
        };
        if free {
            owner[gi] = Some(pi);
            return true;
        }
    }
    false
}
