// ============================================================
// Layer 4 - Data Feed
// ============================================================
// Turns a RecordReader into a pull-based stream of batches.
//
// Two flavours are used by the application layer:
//
//   training    -> shuffled through a bounded buffer of
//                  4 x batch_size examples, repeating forever
//                  (or for an explicit number of passes)
//   evaluation  -> source order, exactly one pass
//
// The shuffle buffer only bounds randomness: an example can
// move at most a few batches away from its position in the
// files, it is not a full permutation of the record set.
//
// A pass ends when the reader runs dry. Whatever is left over
// at that point is emitted as one short batch unless the feed
// was opened with `drop_remainder`. When the configured number
// of passes is used up the feed answers `Pull::Exhausted`.

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::loader::RecordReader;
use crate::domain::example::{Batch, Example};
use crate::domain::traits::{BatchSource, Pull};

/// How many full batches `total` examples make.
///
/// A short remainder never counts. Both the training epoch length
/// and the evaluation pass length are estimated with this, so a
/// trailing partial batch is deliberately never requested.
pub fn full_batches(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total / batch_size
}

// ─── FeedOptions ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    pub batch_size:     usize,
    /// Number of passes over the record set; `None` repeats forever
    pub epochs:         Option<usize>,
    /// Capacity of the shuffle buffer; `None` keeps source order
    pub shuffle_buffer: Option<usize>,
    /// Drop the short batch at the end of each pass
    pub drop_remainder: bool,
    pub seed:           u64,
}

impl FeedOptions {
    /// Shuffled feed with a 4 x batch_size buffer.
    pub fn training(batch_size: usize, epochs: Option<usize>, seed: u64) -> Self {
        Self {
            batch_size,
            epochs,
            shuffle_buffer: Some(4 * batch_size),
            drop_remainder: false,
            seed,
        }
    }

    /// Unshuffled single-pass feed.
    pub fn evaluation(batch_size: usize) -> Self {
        Self {
            batch_size,
            epochs:         Some(1),
            shuffle_buffer: None,
            drop_remainder: false,
            seed:           0,
        }
    }
}

// ─── DataFeed ─────────────────────────────────────────────────────────────────
pub struct DataFeed {
    reader:       RecordReader,
    options:      FeedOptions,
    rng:          StdRng,
    buffer:       Vec<Example>,
    /// The reader has run dry for the current pass
    reader_done:  bool,
    /// At least one batch has been emitted in the current pass
    pass_emitted: bool,
    passes_done:  usize,
    finished:     bool,
}

impl DataFeed {
    pub fn open(reader: RecordReader, options: FeedOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            reader,
            options,
            rng,
            buffer:       Vec::new(),
            reader_done:  false,
            pass_emitted: false,
            passes_done:  0,
            finished:     false,
        }
    }

    /// Completed passes over the record set.
    pub fn passes_done(&self) -> usize {
        self.passes_done
    }

    /// Next example of the current pass, through the shuffle buffer if any.
    fn next_in_pass(&mut self) -> Result<Option<Example>> {
        let Some(capacity) = self.options.shuffle_buffer else {
            return self.reader.next_example();
        };

        while !self.reader_done && self.buffer.len() < capacity.max(1) {
            match self.reader.next_example()? {
                Some(example) => self.buffer.push(example),
                None          => self.reader_done = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }
        let pick = self.rng.gen_range(0..self.buffer.len());
        Ok(Some(self.buffer.swap_remove(pick)))
    }

    /// Close the current pass and either rewind or finish.
    ///
    /// A pass that emitted nothing also finishes the feed, otherwise an
    /// empty record set would spin forever on an unbounded feed.
    fn end_pass(&mut self, emitted: bool) {
        self.passes_done += 1;
        self.pass_emitted = false;
        self.reader_done  = false;

        let limit_reached = matches!(self.options.epochs, Some(n) if self.passes_done >= n);
        if limit_reached || !emitted {
            self.finished = true;
        } else {
            self.reader.rewind();
        }
    }
}

impl BatchSource for DataFeed {
    fn next_batch(&mut self) -> Result<Pull> {
        let batch_size = self.options.batch_size.max(1);

        loop {
            if self.finished {
                return Ok(Pull::Exhausted);
            }

            let mut examples = Vec::with_capacity(batch_size);
            while examples.len() < batch_size {
                match self.next_in_pass()? {
                    Some(example) => examples.push(example),
                    None          => break,
                }
            }

            if examples.len() == batch_size {
                self.pass_emitted = true;
                return Ok(Pull::Batch(Batch::new(examples)));
            }

            // The reader ran dry part way through this batch
            let emit_partial = !examples.is_empty() && !self.options.drop_remainder;
            let emitted = self.pass_emitted || emit_partial;
            self.end_pass(emitted);

            if emit_partial {
                return Ok(Pull::Batch(Batch::new(examples)));
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.reader.rewind();
        self.rng          = StdRng::seed_from_u64(self.options.seed);
        self.buffer.clear();
        self.reader_done  = false;
        self.pass_emitted = false;
        self.passes_done  = 0;
        self.finished     = false;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, io::Write, path::PathBuf};

    fn record_file(dir: &std::path::Path, count: i64) -> PathBuf {
        let path = dir.join("records.jsonl");
        let mut f = File::create(&path).unwrap();
        for id in 0..count {
            writeln!(
                f,
                r#"{{"context":[{id},0],"utterance":[{id},0],"context_len":1,"utterance_len":1,"label":0}}"#
            )
            .unwrap();
        }
        path
    }

    fn feed(count: i64, options: FeedOptions) -> (tempfile::TempDir, DataFeed) {
        let dir    = tempfile::tempdir().unwrap();
        let path   = record_file(dir.path(), count);
        let reader = RecordReader::new(vec![path], 2);
        (dir, DataFeed::open(reader, options))
    }

    fn ids(batch: &Batch) -> Vec<i64> {
        batch.examples.iter().map(|e| e.context[0]).collect()
    }

    fn drain(feed: &mut DataFeed) -> Vec<Vec<i64>> {
        let mut out = Vec::new();
        while let Pull::Batch(batch) = feed.next_batch().unwrap() {
            out.push(ids(&batch));
        }
        out
    }

    #[test]
    fn test_full_batches_drops_the_remainder() {
        assert_eq!(full_batches(10, 2), 5);
        assert_eq!(full_batches(11, 2), 5);
        assert_eq!(full_batches(1, 2), 0);
        assert_eq!(full_batches(5, 0), 0);
    }

    #[test]
    fn test_evaluation_feed_keeps_source_order_and_ends() {
        let (_dir, mut feed) = feed(5, FeedOptions::evaluation(2));
        assert_eq!(drain(&mut feed), vec![vec![0, 1], vec![2, 3], vec![4]]);
        // Stays exhausted until reset
        assert_eq!(feed.next_batch().unwrap(), Pull::Exhausted);
        assert_eq!(feed.passes_done(), 1);
    }

    #[test]
    fn test_drop_remainder_skips_the_short_batch() {
        let mut options = FeedOptions::evaluation(2);
        options.drop_remainder = true;
        let (_dir, mut feed) = feed(5, options);
        assert_eq!(drain(&mut feed), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_reset_replays_the_same_pass() {
        let (_dir, mut feed) = feed(4, FeedOptions::evaluation(2));
        let first = drain(&mut feed);
        feed.reset().unwrap();
        assert_eq!(drain(&mut feed), first);
    }

    #[test]
    fn test_bounded_training_feed_runs_requested_passes() {
        let (_dir, mut feed) = feed(4, FeedOptions::training(2, Some(3), 7));
        let batches = drain(&mut feed);
        assert_eq!(batches.len(), 6);

        // Every pass is a permutation of the record set
        for pass in batches.chunks(2) {
            let mut seen: Vec<i64> = pass.iter().flatten().copied().collect();
            seen.sort_unstable();
            assert_eq!(seen, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_unbounded_training_feed_keeps_cycling() {
        let (_dir, mut feed) = feed(3, FeedOptions::training(2, None, 1));
        for _ in 0..50 {
            assert!(matches!(feed.next_batch().unwrap(), Pull::Batch(_)));
        }
        assert!(feed.passes_done() > 10);
    }

    #[test]
    fn test_shuffle_is_reproducible_for_a_seed() {
        let (_d1, mut a) = feed(12, FeedOptions::training(3, Some(1), 42));
        let (_d2, mut b) = feed(12, FeedOptions::training(3, Some(1), 42));
        assert_eq!(drain(&mut a), drain(&mut b));
    }

    #[test]
    fn test_shuffle_buffer_bounds_displacement() {
        // With a buffer of 4 examples, example i can't be emitted before
        // position i - 3.
        let (_dir, mut feed) = feed(40, FeedOptions::training(1, Some(1), 3));
        let order: Vec<i64> = drain(&mut feed).into_iter().flatten().collect();
        for (pos, id) in order.iter().enumerate() {
            assert!(*id <= pos as i64 + 3, "id {id} emitted at position {pos}");
        }
    }

    #[test]
    fn test_empty_record_set_is_exhausted_even_when_unbounded() {
        let (_dir, mut feed) = feed(0, FeedOptions::training(2, None, 0));
        assert_eq!(feed.next_batch().unwrap(), Pull::Exhausted);
    }
}
