// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The control loop never talks to burn or to the filesystem
// directly. It only sees these seams:
//
//   BatchSource     -> anything that hands out batches on demand
//   Scorer          -> anything that turns a batch into scores
//   TrainableModel  -> a Scorer that can also learn and persist
//
// Keeping the loop behind traits means it can be driven by a
// scripted scorer in tests and by the burn bi-encoder in the
// real binary without a single line of the loop changing.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use anyhow::Result;

use crate::domain::example::Batch;

// ─── Pull ─────────────────────────────────────────────────────────────────────
/// Result of asking a feed for its next batch.
///
/// Running out of data is an ordinary value here, not an error:
/// bounded feeds end every pass this way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Batch(Batch),
    Exhausted,
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A restartable, pull-based sequence of batches.
pub trait BatchSource {
    /// Pull the next batch, or `Pull::Exhausted` once the configured
    /// number of passes has been delivered.
    fn next_batch(&mut self) -> Result<Pull>;

    /// Rewind to the start of the first pass.
    fn reset(&mut self) -> Result<()>;
}

// ─── Scorer ───────────────────────────────────────────────────────────────────
/// Read-only scoring transform used during evaluation.
pub trait Scorer {
    /// One compatibility score per example, in batch order.
    /// Must not change any weights.
    fn score(&self, batch: &Batch) -> Result<Vec<f32>>;
}

// ─── TrainableModel ───────────────────────────────────────────────────────────
/// A scorer the training loop can update and snapshot.
pub trait TrainableModel: Scorer {
    /// Compute the loss on `batch`, apply exactly one optimizer
    /// update and return the loss value observed before the update.
    fn train_step(&mut self, batch: &Batch) -> Result<f64>;

    /// Write weights and optimizer state into `dir`, which already exists.
    fn save_state(&self, dir: &Path) -> Result<()>;
}
