// ============================================================
// Layer 5 - Evaluator
// ============================================================
// Two halves:
//
//   run_pass          pulls a fixed number of batches from a
//                     bounded feed, scores each one and keeps
//                     the scores (and labels) in stream order
//
//   reduce_to_recall  cuts that stream into ranking groups and
//                     turns it into Recall@1 / @2 / @5
//
// Ranking groups are contiguous runs of `group_size` examples
// holding one true response and group_size - 1 distractors.
// That layout is produced by whoever wrote the record files; it
// is trusted here, not re-derived.
//
// Ties are broken by stream order: an earlier example with the
// same score as the positive outranks it. The scorer is only
// ever read, so a pass can run at any point during training.

use anyhow::{bail, Result};
use std::fmt;

use crate::domain::traits::{BatchSource, Pull, Scorer};

/// The k values reported, in order.
pub const RECALL_AT: [usize; 3] = [1, 2, 5];

/// Index into `RecallReport::recall` of the value used for model selection.
const SELECTION_INDEX: usize = 2;

/// Everything collected during one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub scores:  Vec<f32>,
    pub labels:  Vec<i64>,
    pub batches: usize,
}

/// Score up to `expected_batches` batches from `feed`.
///
/// The caller resets the feed beforehand. If the feed runs dry
/// early the pass simply ends there.
pub fn run_pass<F, S>(
    feed:             &mut F,
    scorer:           &S,
    expected_batches: usize,
    log_every:        usize,
) -> Result<PassOutput>
where
    F: BatchSource + ?Sized,
    S: Scorer + ?Sized,
{
    let mut output = PassOutput::default();

    for b in 0..expected_batches {
        let batch = match feed.next_batch()? {
            Pull::Batch(batch) => batch,
            Pull::Exhausted => {
                tracing::warn!(
                    "Evaluation feed ended after {} of {} batches",
                    b,
                    expected_batches
                );
                break;
            }
        };

        let scores = scorer.score(&batch)?;
        if scores.len() != batch.len() {
            bail!(
                "scorer returned {} scores for a batch of {}",
                scores.len(),
                batch.len()
            );
        }
        output.scores.extend(scores);
        output.labels.extend(batch.labels());
        output.batches += 1;

        if log_every > 0 && b % log_every == 0 {
            tracing::info!("Valid step: {}", b);
        }
    }

    Ok(output)
}

// ─── RecallReport ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct RecallReport {
    /// Recall at each k in `RECALL_AT`
    pub recall:      [f64; 3],
    /// Per evaluated group, the in-group index of the top-scored example
    pub predictions: Vec<usize>,
    /// Number of groups that contributed to the recall values
    pub groups:      usize,
}

impl RecallReport {
    /// The scalar handed to the checkpoint policy (Recall@5).
    pub fn selection_metric(&self) -> f64 {
        self.recall[SELECTION_INDEX]
    }
}

impl fmt::Display for RecallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R@1={:.4} R@2={:.4} R@5={:.4} over {} groups",
            self.recall[0], self.recall[1], self.recall[2], self.groups
        )
    }
}

/// Turn stream-ordered scores and labels into Recall@k.
///
/// A trailing run shorter than `group_size` is ignored. Groups with no
/// positive label are skipped and do not count towards the denominator.
pub fn reduce_to_recall(scores: &[f32], labels: &[i64], group_size: usize) -> RecallReport {
    let mut hits        = [0usize; 3];
    let mut predictions = Vec::new();
    let mut skipped     = 0usize;

    if group_size > 0 {
        let usable = scores.len().min(labels.len());
        let groups = scores[..usable]
            .chunks_exact(group_size)
            .zip(labels[..usable].chunks_exact(group_size));

        for (group_scores, group_labels) in groups {
            let Some(positive) = group_labels.iter().position(|&l| l == 1) else {
                skipped += 1;
                continue;
            };

            let rank = rank_of(group_scores, positive);
            for (hit, k) in hits.iter_mut().zip(RECALL_AT) {
                if rank <= k {
                    *hit += 1;
                }
            }
            predictions.push(top_index(group_scores));
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} ranking groups without a positive example", skipped);
    }

    let groups = predictions.len();
    let recall = hits.map(|h| if groups == 0 { 0.0 } else { h as f64 / groups as f64 });
    RecallReport { recall, predictions, groups }
}

/// 1-based rank of `scores[target]` within `scores`, earlier ties first.
fn rank_of(scores: &[f32], target: usize) -> usize {
    let score = scores[target];
    let above = scores
        .iter()
        .enumerate()
        .filter(|&(i, &s)| s > score || (s == score && i < target))
        .count();
    above + 1
}

/// Index of the highest score, first occurrence on ties.
fn top_index(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best
}
