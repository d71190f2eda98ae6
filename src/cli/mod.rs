// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to Layer 2.
//
//   train              - train until early stopping (or --epochs)
//   test <checkpoint>  - score the test split with a checkpoint
//
// The run configuration comes from `--config` (default
// config.json). When the default file does not exist the
// built-in defaults are used; an explicitly named file must
// exist.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::application::train_use_case::RunConfig;
use commands::{Commands, TestArgs, TrainArgs};

const DEFAULT_CONFIG: &str = "config.json";

#[derive(Parser, Debug)]
#[command(
    name = "dual-encoder-ranker",
    version,
    about = "Train and evaluate a dual-encoder response ranker with early stopping."
)]
pub struct Cli {
    /// Run configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        match self.command {
            Commands::Train(args) => run_train(config, args),
            Commands::Test(args)  => run_test(config, args),
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<RunConfig> {
    match explicit {
        Some(path) => RunConfig::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => RunConfig::load(Path::new(DEFAULT_CONFIG)),
        None => {
            tracing::info!("No {} found, using built-in defaults", DEFAULT_CONFIG);
            Ok(RunConfig::default())
        }
    }
}

fn run_train(config: RunConfig, args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.apply(config);
    tracing::info!("Checkpoints go to '{}'", config.checkpoint_dir.display());

    let outcome = TrainUseCase::new(config).execute()?;
    println!(
        "Training stopped ({:?}) after {} steps; best R@5 = {:.4}",
        outcome.reason, outcome.state.total_steps, outcome.best_metric
    );
    Ok(())
}

fn run_test(config: RunConfig, args: TestArgs) -> Result<()> {
    use crate::application::test_use_case::TestUseCase;

    let use_case = TestUseCase::new(config, args.checkpoint_path);
    tracing::info!("Testing checkpoint '{}'", use_case.checkpoint().display());

    let report = use_case.execute()?;
    println!("\n{}", report);
    Ok(())
}
