// ============================================================
// Layer 5 - Inferencer
// ============================================================
// Restores a checkpoint for the `test` command.
//
// The model is rebuilt through the same construction path as in
// training (BiEncoderConfig::init with the shared embedding
// table), then the saved record is loaded into it. Any mismatch
// is fatal: a test run against the wrong weights is worse than
// no test run.
use anyhow::{ensure, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::batcher::PairBatcher;
use crate::domain::example::Batch;
use crate::domain::traits::Scorer;
use crate::infra::checkpoint::{read_json, MODEL_CONFIG, MODEL_RECORD};
use crate::infra::embedding_store::EmbeddingTable;
use crate::ml::model::{BiEncoder, BiEncoderConfig};

pub struct Inferencer<B: Backend> {
    model:   BiEncoder<B>,
    config:  BiEncoderConfig,
    batcher: PairBatcher<B>,
}

impl<B: Backend> Inferencer<B> {
    pub fn from_checkpoint(
        checkpoint: &Path,
        table:      Arc<EmbeddingTable>,
        device:     &B::Device,
    ) -> Result<Self> {
        ensure!(
            checkpoint.is_dir(),
            "Checkpoint '{}' not found. Have you run 'train' first?",
            checkpoint.display()
        );

        let config: BiEncoderConfig = read_json(&checkpoint.join(MODEL_CONFIG))?;
        ensure!(
            table.dim() == config.embed_dim,
            "checkpoint expects {}-dimensional embeddings, table has {}",
            config.embed_dim,
            table.dim()
        );

        let path: PathBuf = checkpoint.join(MODEL_RECORD);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        let model = config.init::<B>(device).load_record(record);

        tracing::info!("Model loaded from '{}'", checkpoint.display());
        Ok(Self {
            batcher: PairBatcher::new(table, config.max_len, device.clone()),
            model,
            config,
        })
    }

    pub fn config(&self) -> &BiEncoderConfig {
        &self.config
    }
}

impl<B: Backend> Scorer for Inferencer<B> {
    fn score(&self, batch: &Batch) -> Result<Vec<f32>> {
        let tensors = self.batcher.batch(batch)?;
        Ok(self.model.probabilities(&tensors).into_data().iter::<f32>().collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Example;
    use crate::domain::traits::TrainableModel;
    use crate::ml::learner::build_learner;
    use burn::backend::{Autodiff, NdArray};

    fn table() -> Arc<EmbeddingTable> {
        Arc::new(EmbeddingTable::from_rows(2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap())
    }

    fn batch() -> Batch {
        let example = |utterance: Vec<i64>, label: i64| Example {
            context: vec![1, 2],
            utterance,
            context_len: 2,
            utterance_len: 1,
            label,
        };
        Batch::new(vec![example(vec![1, 0], 1), example(vec![2, 0], 0)])
    }

    #[test]
    fn test_restored_model_scores_like_the_trained_one() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();

        let mut learner = build_learner::<Autodiff<NdArray>>(
            BiEncoderConfig::new(2, 3, 2),
            table(),
            0.01,
            &device,
        )
        .unwrap();
        learner.train_step(&batch()).unwrap();
        learner.save_state(dir.path()).unwrap();
        let expected = learner.score(&batch()).unwrap();

        let restored = Inferencer::<NdArray>::from_checkpoint(dir.path(), table(), &device).unwrap();
        let actual   = restored.score(&batch()).unwrap();

        assert_eq!(restored.config().hidden_dim, 3);
        for (a, e) in actual.iter().zip(&expected) {
            // CompactRecorder stores half precision
            assert!((a - e).abs() < 1e-2, "{a} vs {e}");
        }
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let result = Inferencer::<NdArray>::from_checkpoint(&dir.path().join("nope"), table(), &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_checkpoint_without_weights_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        crate::infra::checkpoint::write_json(
            &dir.path().join(MODEL_CONFIG),
            &BiEncoderConfig::new(2, 3, 2),
        )
        .unwrap();
        let device = Default::default();
        assert!(Inferencer::<NdArray>::from_checkpoint(dir.path(), table(), &device).is_err());
    }
}
