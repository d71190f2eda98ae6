// ============================================================
// Layer 5 - Checkpoint Policy
// ============================================================
// Decides, after every evaluation, whether the model is worth
// persisting and whether training should go on.
//
//   metric >  best  → SAVE + CONTINUE, patience counter back to 0
//   metric <= best  → SKIP, patience counter + 1
//                     counter > patience → STOP
//
// Only a strict improvement counts. A plateau is not progress,
// and neither is matching the initial floor of 0.0, so a model
// that never gets a single positive into the top k is never
// saved.
//
// With the default patience of 4 the run stops on the 5th
// consecutive evaluation that fails to beat the best score.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PATIENCE: usize = 4;

/// Identity of a checkpoint: the epoch and the step inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId {
    pub epoch: usize,
    pub step:  usize,
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {} step {}", self.epoch, self.step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    Save,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub save: SaveDecision,
    pub run:  RunDecision,
}

/// Monotonic best-score tracker with a bounded patience counter.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    patience:         usize,
    best_metric:      f64,
    best:             Option<CheckpointId>,
    patience_counter: usize,
}

impl CheckpointPolicy {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_metric:      0.0,
            best:             None,
            patience_counter: 0,
        }
    }

    pub fn on_evaluation(&mut self, metric: f64, epoch: usize, step: usize) -> Decision {
        if metric > self.best_metric {
            self.best_metric      = metric;
            self.best             = Some(CheckpointId { epoch, step });
            self.patience_counter = 0;
            return Decision { save: SaveDecision::Save, run: RunDecision::Continue };
        }

        self.patience_counter += 1;
        let run = if self.patience_counter > self.patience {
            RunDecision::Stop
        } else {
            RunDecision::Continue
        };
        Decision { save: SaveDecision::Skip, run }
    }

    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    pub fn best(&self) -> Option<CheckpointId> {
        self.best
    }

    pub fn patience_counter(&self) -> usize {
        self.patience_counter
    }
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PATIENCE)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const SAVE: Decision = Decision { save: SaveDecision::Save, run: RunDecision::Continue };
    const SKIP: Decision = Decision { save: SaveDecision::Skip, run: RunDecision::Continue };
    const STOP: Decision = Decision { save: SaveDecision::Skip, run: RunDecision::Stop };

    #[test]
    fn test_improvement_saves_and_resets_patience() {
        let mut policy = CheckpointPolicy::default();
        assert_eq!(policy.on_evaluation(0.3, 0, 10), SAVE);
        assert_eq!(policy.on_evaluation(0.2, 0, 20), SKIP);
        assert_eq!(policy.patience_counter(), 1);

        assert_eq!(policy.on_evaluation(0.4, 0, 30), SAVE);
        assert_eq!(policy.patience_counter(), 0);
        assert_eq!(policy.best(), Some(CheckpointId { epoch: 0, step: 30 }));
        assert_eq!(policy.best_metric(), 0.4);
    }

    #[test]
    fn test_fifth_non_improving_evaluation_stops() {
        let mut policy = CheckpointPolicy::default();
        policy.on_evaluation(0.5, 1, 4);
        for _ in 0..4 {
            assert_eq!(policy.on_evaluation(0.5, 1, 8), SKIP);
        }
        assert_eq!(policy.on_evaluation(0.1, 2, 4), STOP);
        assert_eq!(policy.best(), Some(CheckpointId { epoch: 1, step: 4 }));
    }

    #[test]
    fn test_plateau_is_not_an_improvement() {
        let mut policy = CheckpointPolicy::default();
        policy.on_evaluation(0.7, 0, 1);
        assert_eq!(policy.on_evaluation(0.7, 0, 2).save, SaveDecision::Skip);
    }

    #[test]
    fn test_zero_metric_against_initial_floor_does_not_save() {
        let mut policy = CheckpointPolicy::default();
        assert_eq!(policy.on_evaluation(0.0, 0, 1), SKIP);
        assert_eq!(policy.best(), None);
        assert_eq!(policy.patience_counter(), 1);
    }

    #[test]
    fn test_nan_never_counts_as_improvement() {
        let mut policy = CheckpointPolicy::default();
        policy.on_evaluation(0.2, 0, 1);
        assert_eq!(policy.on_evaluation(f64::NAN, 0, 2), SKIP);
        assert_eq!(policy.best_metric(), 0.2);
    }

    #[test]
    fn test_best_metric_never_decreases() {
        let mut policy = CheckpointPolicy::new(100);
        let metrics = [0.1, 0.05, 0.3, 0.3, 0.2, 0.6, 0.0, 0.59];
        let mut last = 0.0;
        for (step, m) in metrics.iter().enumerate() {
            policy.on_evaluation(*m, 0, step);
            assert!(policy.best_metric() >= last);
            last = policy.best_metric();
        }
        assert_eq!(last, 0.6);
    }

    #[test]
    fn test_custom_patience() {
        let mut policy = CheckpointPolicy::new(0);
        policy.on_evaluation(0.5, 0, 1);
        assert_eq!(policy.on_evaluation(0.4, 0, 2), STOP);
    }
}
