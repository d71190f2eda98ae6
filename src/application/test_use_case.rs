// ============================================================
// Layer 2 - TestUseCase
// ============================================================
// Scores a held-out split with a saved checkpoint:
//
//   Step 1: Build the embedding table      (Layer 6 - infra)
//   Step 2: Restore the checkpoint         (Layer 5 - ml)
//           failure here ends the command
//   Step 3: One pass over the test files   (Layer 5 - ml)
//   Step 4: Recall@k + per-group winners   (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};

use crate::application::train_use_case::{example_count, RunConfig};
use crate::data::{
    feed::{full_batches, DataFeed, FeedOptions},
    loader::RecordReader,
};
use crate::infra::checkpoint::read_state;
use crate::ml::{
    evaluator::{reduce_to_recall, run_pass, RecallReport},
    inferencer::Inferencer,
};

type TestBackend = burn::backend::Wgpu;

pub struct TestUseCase {
    config:     RunConfig,
    checkpoint: PathBuf,
}

impl TestUseCase {
    pub fn new(config: RunConfig, checkpoint: impl Into<PathBuf>) -> Self {
        Self { config, checkpoint: checkpoint.into() }
    }

    pub fn execute(&self) -> Result<RecallReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TestBackend>(&device)
    }

    pub fn execute_on<B: Backend>(&self, device: &B::Device) -> Result<RecallReport> {
        let cfg = &self.config;
        if cfg.test_files.is_empty() {
            bail!("no test files configured");
        }
        if cfg.test_batch_size == 0 || cfg.group_size == 0 {
            bail!("test_batch_size and group_size must be at least 1");
        }

        // ── Step 1: Embedding table ──────────────────────────────────────────
        let table = cfg.load_embeddings()?;

        // ── Step 2: Restore ──────────────────────────────────────────────────
        let scorer = Inferencer::<B>::from_checkpoint(&self.checkpoint, table, device)
            .with_context(|| format!("Cannot restore '{}'", self.checkpoint.display()))?;

        let state = read_state(&self.checkpoint)?;
        tracing::info!(
            "Checkpoint from epoch {} step {} (validation R@5 = {:.4})",
            state.epoch,
            state.step,
            state.metric
        );

        // The record length comes from the checkpoint, not the run config
        let max_len = scorer.config().max_len;

        // ── Step 3: Test pass ────────────────────────────────────────────────
        let num_test = example_count(cfg.num_test_examples, &cfg.test_files, "test")?;
        let batches  = full_batches(num_test, cfg.test_batch_size);
        if batches == 0 {
            bail!(
                "{} test examples do not fill a single batch of {}",
                num_test,
                cfg.test_batch_size
            );
        }

        let mut feed = DataFeed::open(
            RecordReader::new(cfg.test_files.clone(), max_len),
            FeedOptions::evaluation(cfg.test_batch_size),
        );
        let pass = run_pass(&mut feed, &scorer, batches, cfg.log_every)?;

        // ── Step 4: Report ───────────────────────────────────────────────────
        let report = reduce_to_recall(&pass.scores, &pass.labels, cfg.group_size);
        tracing::info!("Evaluation_Metric = {}", report);
        tracing::info!("Model prediction on examples: {:?}", report.predictions);

        Ok(report)
    }

    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }
}
