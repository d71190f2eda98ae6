// ============================================================
// Layer 5 - ML / Model Layer
// ============================================================
// Two halves live here.
//
// The control half knows nothing about burn. It talks to the
// model only through the Scorer / TrainableModel traits:
//
//   policy.rs     - best-score tracker and patience counter
//   evaluator.rs  - validation pass and Recall@k reduction
//   trainer.rs    - the training loop state machine
//
// The burn half is the concrete model behind those traits:
//
//   model.rs      - the bi-encoder network and its loss
//   learner.rs    - model + Adam on an autodiff backend
//   inferencer.rs - restores a checkpoint for the test pass
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Lowe et al. (2015) The Ubuntu Dialogue Corpus

/// Bi-encoder architecture
pub mod model;

/// Trainable model: bi-encoder plus optimizer
pub mod learner;

/// Checkpoint restore for evaluation
pub mod inferencer;

/// Save / stop decisions after each evaluation
pub mod policy;

/// Evaluation pass and ranking metrics
pub mod evaluator;

/// Training loop orchestration
pub mod trainer;
