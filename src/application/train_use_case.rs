// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Wires every layer together for one training run:
//
//   Step 1: Validate the configuration     (before any work)
//   Step 2: Open the checkpoint directory  (Layer 6 - infra)
//   Step 3: Build the embedding table once (Layer 6 - infra)
//   Step 4: Count examples if needed       (Layer 4 - data)
//   Step 5: Derive the step schedule       (Layer 5 - ml)
//   Step 6: Open training + validation feeds (Layer 4 - data)
//   Step 7: Build the model and optimizer  (Layer 5 - ml)
//   Step 8: Run the training loop          (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::{
    feed::{DataFeed, FeedOptions},
    loader::{count_records, RecordReader},
};
use crate::infra::{
    checkpoint::CheckpointStore,
    embedding_store::EmbeddingTable,
    metrics::MetricsLogger,
};
use crate::ml::{
    learner::build_learner,
    model::BiEncoderConfig,
    policy::{CheckpointPolicy, DEFAULT_PATIENCE},
    trainer::{Schedule, StopReason, TrainingLoop, TrainingOutcome},
};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── Run Configuration ────────────────────────────────────────────────────────
// Every tunable of a run. Missing keys in the JSON file fall back
// to the defaults below, so a config file only has to name what
// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub train_files:      Vec<PathBuf>,
    pub validation_files: Vec<PathBuf>,
    pub test_files:       Vec<PathBuf>,
    pub vocabulary:       PathBuf,
    pub embeddings:       PathBuf,
    pub checkpoint_dir:   PathBuf,

    pub max_len:    usize,
    pub embed_dim:  usize,
    pub hidden_dim: usize,

    pub train_batch_size:      usize,
    pub validation_batch_size: usize,
    pub test_batch_size:       usize,

    /// Counted from the record files when absent
    pub num_train_examples:      Option<usize>,
    pub num_validation_examples: Option<usize>,
    pub num_test_examples:       Option<usize>,

    pub learning_rate: f64,
    /// Evaluate every eval_fraction x steps_per_epoch steps
    pub eval_fraction: f64,
    pub patience:      usize,
    pub log_every:     usize,
    /// Candidates per ranking group in the evaluation files
    pub group_size:    usize,
    pub seed:          u64,
    /// Passes over the training files; `None` trains until early stop
    pub epochs:        Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_files:      vec![PathBuf::from("data/train.jsonl")],
            validation_files: vec![PathBuf::from("data/valid.jsonl")],
            test_files:       vec![PathBuf::from("data/test.jsonl")],
            vocabulary:       PathBuf::from("data/vocabulary.json"),
            embeddings:       PathBuf::from("data/embeddings.txt"),
            checkpoint_dir:   PathBuf::from("checkpoints"),

            max_len:    160,
            embed_dim:  300,
            hidden_dim: 256,

            train_batch_size:      64,
            validation_batch_size: 50,
            test_batch_size:       50,

            num_train_examples:      None,
            num_validation_examples: None,
            num_test_examples:       None,

            learning_rate: 1e-3,
            eval_fraction: 0.25,
            patience:      DEFAULT_PATIENCE,
            log_every:     100,
            group_size:    10,
            seed:          42,
            epochs:        None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse config '{}'", path.display()))
    }

    /// Reject configurations that could never train, before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.train_files.is_empty() {
            bail!("no training files configured");
        }
        if self.validation_files.is_empty() {
            bail!("no validation files configured");
        }
        for (name, value) in [
            ("max_len", self.max_len),
            ("embed_dim", self.embed_dim),
            ("hidden_dim", self.hidden_dim),
            ("train_batch_size", self.train_batch_size),
            ("validation_batch_size", self.validation_batch_size),
            ("test_batch_size", self.test_batch_size),
            ("group_size", self.group_size),
        ] {
            if value == 0 {
                bail!("{} must be at least 1", name);
            }
        }
        if !(self.eval_fraction > 0.0 && self.eval_fraction <= 1.0) {
            bail!("eval_fraction must be in (0, 1], got {}", self.eval_fraction);
        }
        if !(self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.epochs == Some(0) {
            bail!("epochs must be at least 1 when set");
        }
        Ok(())
    }

    pub fn model_config(&self) -> BiEncoderConfig {
        BiEncoderConfig::new(self.embed_dim, self.hidden_dim, self.max_len)
    }

    /// Build the shared embedding table from the configured files.
    pub fn load_embeddings(&self) -> Result<Arc<EmbeddingTable>> {
        let table = EmbeddingTable::load(&self.vocabulary, &self.embeddings, self.embed_dim, self.seed)?;
        Ok(Arc::new(table))
    }
}

/// The configured example count, or the number of records in `files`.
pub fn example_count(configured: Option<usize>, files: &[PathBuf], split: &str) -> Result<usize> {
    match configured {
        Some(n) => Ok(n),
        None => {
            let n = count_records(files)
                .with_context(|| format!("Cannot count {} examples", split))?;
            tracing::info!("Counted {} {} examples", n, split);
            Ok(n)
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Train on the default GPU device.
    pub fn execute(&self) -> Result<TrainingOutcome> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(&device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainingOutcome> {
        let cfg = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Checkpoint directory ─────────────────────────────────────
        let store = CheckpointStore::new(&cfg.checkpoint_dir)?;
        store.save_run_config(cfg)?;
        let history = MetricsLogger::new(store.dir())?;
        tracing::info!("Evaluation history: '{}'", history.csv_path().display());

        // ── Step 3: Embedding table, built once ──────────────────────────────
        let table = cfg.load_embeddings()?;

        // ── Step 4: Example counts ───────────────────────────────────────────
        let num_train = example_count(cfg.num_train_examples, &cfg.train_files, "training")?;
        let num_valid =
            example_count(cfg.num_validation_examples, &cfg.validation_files, "validation")?;

        // ── Step 5: Schedule ─────────────────────────────────────────────────
        let schedule = Schedule::new(
            num_train,
            cfg.train_batch_size,
            num_valid,
            cfg.validation_batch_size,
            cfg.eval_fraction,
            cfg.log_every,
            cfg.epochs,
        )?;

        // ── Step 6: Feeds ────────────────────────────────────────────────────
        let mut train = DataFeed::open(
            RecordReader::new(cfg.train_files.clone(), cfg.max_len),
            FeedOptions::training(cfg.train_batch_size, cfg.epochs, cfg.seed),
        );
        let mut valid = DataFeed::open(
            RecordReader::new(cfg.validation_files.clone(), cfg.max_len),
            FeedOptions::evaluation(cfg.validation_batch_size),
        );

        // ── Step 7: Model ────────────────────────────────────────────────────
        let mut learner = build_learner::<B>(cfg.model_config(), table, cfg.learning_rate, device)?;

        // ── Step 8: Train ────────────────────────────────────────────────────
        let outcome = TrainingLoop::new(
            schedule,
            CheckpointPolicy::new(cfg.patience),
            cfg.group_size,
            &store,
        )
        .with_history(&history)
        .run(&mut learner, &mut train, &mut valid)?;

        match outcome.reason {
            StopReason::EarlyStopped => tracing::info!("Stopped early after {} evaluations", outcome.state.evaluations),
            StopReason::OutOfData    => tracing::info!("Training files exhausted after {} passes", train.passes_done()),
            StopReason::FeedEnded    => tracing::warn!("Training ended because the feed ran dry"),
        }
        if let Some(path) = outcome.best_checkpoint(&store) {
            tracing::info!("Best checkpoint: '{}' (R@5 = {:.4})", path.display(), outcome.best_metric);
        }

        Ok(outcome)
    }
}
