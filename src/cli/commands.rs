// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `test`, and the few
// flags that override the run configuration file.
//
// Everything else lives in the JSON config: the command line
// only carries what changes from one invocation to the next.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::RunConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the bi-encoder, evaluating and checkpointing as it goes
    Train(TrainArgs),

    /// Score the test split with a saved checkpoint
    Test(TestArgs),
}

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Directory for checkpoints, run config and metrics.csv
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Stop after this many passes over the training files
    /// instead of training until early stopping
    #[arg(long)]
    pub epochs: Option<usize>,
}

impl TrainArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(dir) = self.checkpoint_dir {
            config.checkpoint_dir = dir;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = Some(epochs);
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Checkpoint directory to restore, e.g. checkpoints/model_2_400.ckpt
    pub checkpoint_path: PathBuf,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = TrainArgs {
            checkpoint_dir: Some(PathBuf::from("/tmp/run")),
            epochs:         Some(3),
        };
        let cfg = args.apply(RunConfig::default());
        assert_eq!(cfg.checkpoint_dir, PathBuf::from("/tmp/run"));
        assert_eq!(cfg.epochs, Some(3));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let base = RunConfig { epochs: Some(7), ..RunConfig::default() };
        let cfg  = TrainArgs::default().apply(base.clone());
        assert_eq!(cfg, base);
    }
}
