// ============================================================
// Layer 3 - Example and Batch Domain Types
// ============================================================
// One Example is a (context, candidate utterance) pair that has
// already been tokenised and padded to a fixed length upstream.
// The label says whether the utterance is the true response (1)
// or a sampled distractor (0).
//
// Examples are immutable once read. A Batch is just an ordered
// run of Examples as they came off the feed; the order matters
// because evaluation groups are contiguous in stream order.

use serde::{Deserialize, Serialize};

/// A single labelled (context, utterance) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Context token ids, padded to the configured max length
    pub context: Vec<i64>,

    /// Candidate utterance token ids, padded to the same length
    pub utterance: Vec<i64>,

    /// Number of real (non-padding) tokens in `context`
    pub context_len: i64,

    /// Number of real (non-padding) tokens in `utterance`
    pub utterance_len: i64,

    /// 1 = true response, 0 = distractor
    pub label: i64,
}

impl Example {
    pub fn is_positive(&self) -> bool {
        self.label == 1
    }

    /// Context length clamped into `0..=max_len`.
    pub fn context_len_clamped(&self, max_len: usize) -> usize {
        clamp_len(self.context_len, max_len)
    }

    /// Utterance length clamped into `0..=max_len`.
    pub fn utterance_len_clamped(&self, max_len: usize) -> usize {
        clamp_len(self.utterance_len, max_len)
    }
}

fn clamp_len(len: i64, max_len: usize) -> usize {
    (len.max(0) as usize).min(max_len)
}

/// An ordered run of examples pulled from a feed in one go.
///
/// Usually `batch_size` long; the last batch of a pass may be short
/// unless the feed was opened with `drop_remainder`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub examples: Vec<Example>,
}

impl Batch {
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Labels in stream order, one per example.
    pub fn labels(&self) -> Vec<i64> {
        self.examples.iter().map(|e| e.label).collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn example(len: i64, label: i64) -> Example {
        Example {
            context:       vec![1, 2, 0, 0],
            utterance:     vec![3, 0, 0, 0],
            context_len:   len,
            utterance_len: 1,
            label,
        }
    }

    #[test]
    fn test_length_is_clamped_to_max_len() {
        assert_eq!(example(9, 0).context_len_clamped(4), 4);
        assert_eq!(example(-3, 0).context_len_clamped(4), 0);
        assert_eq!(example(2, 0).context_len_clamped(4), 2);
    }

    #[test]
    fn test_batch_labels_keep_stream_order() {
        let batch = Batch::new(vec![example(2, 1), example(2, 0), example(2, 0)]);
        assert_eq!(batch.labels(), vec![1, 0, 0]);
        assert!(batch.examples[0].is_positive());
        assert_eq!(batch.len(), 3);
    }
}
