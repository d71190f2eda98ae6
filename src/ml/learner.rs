// ============================================================
// Layer 5 - Learner
// ============================================================
// The burn side of the TrainableModel seam. Owns:
//
//   - the bi-encoder on an autodiff backend (Autodiff<Wgpu> in
//     the binary, Autodiff<NdArray> in tests)
//   - the Adam optimizer and its moment estimates
//   - two batchers over the same shared embedding table: one for
//     the autodiff backend, one for the inner backend that
//     model.valid() lives on
//
// Training step:
//   loss = mean logistic loss on the batch
//   grads = loss.backward()
//   model = adam.step(lr, model, grads)
//
// Scoring goes through model.valid(), so evaluation never
// records a graph and never touches the optimizer.
//
// Reference: Burn Book §5 (Training), Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use std::{path::Path, sync::Arc};

use crate::data::batcher::PairBatcher;
use crate::domain::example::Batch;
use crate::domain::traits::{Scorer, TrainableModel};
use crate::infra::checkpoint::{write_json, MODEL_CONFIG, MODEL_RECORD, OPTIMIZER_RECORD};
use crate::infra::embedding_store::EmbeddingTable;
use crate::ml::model::{BiEncoder, BiEncoderConfig};

pub struct BiEncoderLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BiEncoder<B>, B>,
{
    model:         BiEncoder<B>,
    optim:         O,
    config:        BiEncoderConfig,
    batcher:       PairBatcher<B>,
    valid_batcher: PairBatcher<B::InnerBackend>,
    learning_rate: f64,
}

/// Build a freshly initialised bi-encoder with an Adam optimizer.
///
/// The embedding table is passed in, never looked up, so every
/// model built in one process shares the same vectors.
pub fn build_learner<B: AutodiffBackend>(
    config:        BiEncoderConfig,
    table:         Arc<EmbeddingTable>,
    learning_rate: f64,
    device:        &B::Device,
) -> Result<BiEncoderLearner<B, impl Optimizer<BiEncoder<B>, B>>> {
    anyhow::ensure!(
        table.dim() == config.embed_dim,
        "embedding table has {} dimensions but the model expects {}",
        table.dim(),
        config.embed_dim
    );

    let model: BiEncoder<B> = config.init(device);
    // θ = θ - lr * m / (√v + ε)
    let optim = AdamConfig::new().with_epsilon(1e-8).init();

    tracing::info!(
        "Bi-encoder ready: embed_dim={} hidden_dim={} max_len={} lr={}",
        config.embed_dim,
        config.hidden_dim,
        config.max_len,
        learning_rate
    );

    Ok(BiEncoderLearner {
        batcher:       PairBatcher::new(table.clone(), config.max_len, device.clone()),
        valid_batcher: PairBatcher::new(table, config.max_len, device.clone()),
        model,
        optim,
        config,
        learning_rate,
    })
}

impl<B, O> Scorer for BiEncoderLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BiEncoder<B>, B>,
{
    fn score(&self, batch: &Batch) -> Result<Vec<f32>> {
        let tensors = self.valid_batcher.batch(batch)?;
        let probs   = self.model.valid().probabilities(&tensors);
        Ok(probs.into_data().iter::<f32>().collect())
    }
}

impl<B, O> TrainableModel for BiEncoderLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BiEncoder<B>, B>,
{
    fn train_step(&mut self, batch: &Batch) -> Result<f64> {
        let tensors = self.batcher.batch(batch)?;
        let loss    = self.model.forward_loss(&tensors);
        let value   = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);
        Ok(value)
    }

    fn save_state(&self, dir: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();

        let model_path = dir.join(MODEL_RECORD);
        recorder
            .record(self.model.clone().into_record(), model_path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", model_path.display()))?;

        let optim_path = dir.join(OPTIMIZER_RECORD);
        recorder
            .record(self.optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        write_json(&dir.join(MODEL_CONFIG), &self.config)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Example;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn table() -> Arc<EmbeddingTable> {
        // 4 tokens x 2 dims
        Arc::new(
            EmbeddingTable::from_rows(2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.5, 0.5]).unwrap(),
        )
    }

    fn batch() -> Batch {
        let example = |context: Vec<i64>, utterance: Vec<i64>, label: i64| Example {
            context,
            utterance,
            context_len:   2,
            utterance_len: 2,
            label,
        };
        Batch::new(vec![
            example(vec![1, 2, 0], vec![1, 2, 0], 1),
            example(vec![1, 2, 0], vec![3, 3, 0], 0),
            example(vec![2, 3, 0], vec![2, 3, 0], 1),
            example(vec![2, 3, 0], vec![1, 1, 0], 0),
        ])
    }

    fn learner() -> BiEncoderLearner<TestBackend, impl Optimizer<BiEncoder<TestBackend>, TestBackend>> {
        let device = Default::default();
        build_learner::<TestBackend>(BiEncoderConfig::new(2, 4, 3), table(), 0.05, &device).unwrap()
    }

    #[test]
    fn test_rejects_mismatched_embedding_dimension() {
        let device = Default::default();
        let result =
            build_learner::<TestBackend>(BiEncoderConfig::new(3, 4, 3), table(), 0.01, &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_scoring_does_not_change_weights() {
        let learner = learner();
        let first   = learner.score(&batch()).unwrap();
        let second  = learner.score(&batch()).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn test_train_steps_reduce_the_loss() {
        let mut learner = learner();
        let first = learner.train_step(&batch()).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = learner.train_step(&batch()).unwrap();
        }
        assert!(first.is_finite());
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_train_step_changes_scores() {
        let mut learner = learner();
        let before = learner.score(&batch()).unwrap();
        learner.train_step(&batch()).unwrap();
        let after = learner.score(&batch()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_save_state_writes_config_and_records() {
        let dir     = tempfile::tempdir().unwrap();
        let learner = learner();
        learner.save_state(dir.path()).unwrap();

        let saved: BiEncoderConfig =
            crate::infra::checkpoint::read_json(&dir.path().join(MODEL_CONFIG)).unwrap();
        assert_eq!(saved.hidden_dim, 4);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with(MODEL_RECORD)));
        assert!(names.iter().any(|n| n.starts_with(OPTIMIZER_RECORD)));
    }
}
